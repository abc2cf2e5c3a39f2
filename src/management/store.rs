//! SQLite-backed persistent store.
//!
//! The store is the only component that mutates the monitor and ledger tables.
//! Every write is tagged with the id of the currently open transaction; the
//! transaction row is created lazily by [`SqliteStore::begin_transaction`] and
//! the matching SQL transaction stays open until [`SqliteStore::commit`], so a
//! crash mid-run leaves the database untouched. Deleting a transaction row
//! cascades to every row tagged with it, which is how rollback works.
//!
//! All queries are scoped to the active profile.

use std::{
    collections::HashSet,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, warn};

use super::schema::{BASE_DB_VERSION, VERSIONED_SCHEMAS};
use crate::{
    error::StoreError,
    types::{
        ArtistRecord, Bitrate, EntityKind, EntityOverrides, MonitoredArtist, MonitoredPlaylist,
        PlaylistRecord, Profile, RecordType, RecordTypeFilter, ReleaseRecord, SeenPlaylistTrack,
        SeenRelease, TrackRecord, Transaction, TransactionSummary,
    },
    utils,
};

pub const DEFAULT_PROFILE_ID: i64 = 1;
const DEFAULT_PROFILE_NAME: &str = "default";
const ACTIVE_PROFILE_KEY: &str = "active_profile";

type StoreResult<T> = Result<T, StoreError>;

/// Entities selected for the next refresh.
#[derive(Debug, Clone, Default)]
pub struct DueForRefresh {
    pub artists: Vec<MonitoredArtist>,
    pub playlists: Vec<MonitoredPlaylist>,
    /// `true` when nothing was pending and every monitored entity was selected.
    pub full_refresh: bool,
}

impl DueForRefresh {
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.playlists.is_empty()
    }
}

/// A release to insert into the seen ledger.
#[derive(Debug, Clone)]
pub struct ReleaseEntry {
    pub release: ReleaseRecord,
    pub future: bool,
}

/// Rows removed by one rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub transaction_id: i64,
    pub artists: usize,
    pub playlists: usize,
    pub releases: usize,
    pub tracks: usize,
}

struct Inner {
    conn: Connection,
    profile_id: i64,
    open_tid: Option<i64>,
}

pub struct SqliteStore {
    inner: Mutex<Inner>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::migrate_if_needed(&conn)?;
        Self::ensure_default_profile(&conn)?;

        let profile_id = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![ACTIVE_PROFILE_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_PROFILE_ID);

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                profile_id,
                open_tid: None,
            }),
        })
    }

    fn migrate_if_needed(conn: &Connection) -> StoreResult<()> {
        let latest = &VERSIONED_SCHEMAS[VERSIONED_SCHEMAS.len() - 1];

        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )?;
        if table_count == 0 {
            info!("Creating monitor db schema at version {}", latest.version);
            return latest.create(conn);
        }

        let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        match VERSIONED_SCHEMAS
            .iter()
            .find(|s| BASE_DB_VERSION + s.version == db_version)
        {
            Some(schema) => schema.validate(conn),
            None => Err(StoreError::UnknownVersion(db_version)),
        }
    }

    fn ensure_default_profile(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO profiles (id, name) VALUES (?1, ?2)",
            params![DEFAULT_PROFILE_ID, DEFAULT_PROFILE_NAME],
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- transactions --------------------------------------------------------

    /// Opens the run transaction if none is open and returns its id.
    pub fn begin_transaction(&self) -> StoreResult<i64> {
        let mut inner = self.lock();
        if let Some(tid) = inner.open_tid {
            return Ok(tid);
        }

        inner.conn.execute_batch("BEGIN IMMEDIATE;")?;
        let inserted = inner.conn.execute(
            "INSERT INTO transactions (timestamp, profile_id) VALUES (?1, ?2)",
            params![utils::now_timestamp(), inner.profile_id],
        );
        if let Err(e) = inserted {
            if let Err(rollback_err) = inner.conn.execute_batch("ROLLBACK;") {
                warn!("Cannot roll back failed transaction start: {}", rollback_err);
            }
            return Err(e.into());
        }

        let tid = inner.conn.last_insert_rowid();
        inner.open_tid = Some(tid);
        debug!("Opened transaction {}", tid);
        Ok(tid)
    }

    pub fn open_transaction(&self) -> Option<i64> {
        self.lock().open_tid
    }

    /// Commits the open transaction. No-op when none is open.
    pub fn commit(&self) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(tid) = inner.open_tid {
            inner.conn.execute_batch("COMMIT;")?;
            inner.open_tid = None;
            debug!("Committed transaction {}", tid);
        }
        Ok(())
    }

    /// Discards every write of the open transaction. No-op when none is open.
    pub fn abort(&self) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(tid) = inner.open_tid.take() {
            inner.conn.execute_batch("ROLLBACK;")?;
            warn!("Aborted transaction {}", tid);
        }
        Ok(())
    }

    fn require_tid(inner: &Inner) -> StoreResult<i64> {
        inner.open_tid.ok_or(StoreError::NoOpenTransaction)
    }

    /// Deletes a committed transaction and every row tagged with it.
    ///
    /// Artists and playlists that lost their monitor row or any ledger row
    /// are flagged pending so the next refresh picks them up again.
    pub fn rollback(&self, transaction_id: i64) -> StoreResult<RollbackReport> {
        let inner = self.lock();
        let conn = &inner.conn;
        let profile_id = inner.profile_id;

        let exists = conn
            .query_row(
                "SELECT 1 FROM transactions WHERE id = ?1 AND profile_id = ?2",
                params![transaction_id, profile_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownTransaction(transaction_id));
        }

        let tx = conn.unchecked_transaction()?;
        let artist_ids = collect_ids(
            &tx,
            "SELECT artist_id FROM monitor WHERE trans_id = ?1 OR refreshed_trans_id = ?1
             UNION SELECT artist_id FROM releases WHERE trans_id = ?1",
            transaction_id,
        )?;
        let playlist_ids = collect_ids(
            &tx,
            "SELECT id FROM playlists WHERE trans_id = ?1 OR refreshed_trans_id = ?1
             UNION SELECT playlist_id FROM playlist_tracks WHERE trans_id = ?1",
            transaction_id,
        )?;

        let report = RollbackReport {
            transaction_id,
            artists: count_tagged(&tx, "monitor", transaction_id)?,
            playlists: count_tagged(&tx, "playlists", transaction_id)?,
            releases: count_tagged(&tx, "releases", transaction_id)?,
            tracks: count_tagged(&tx, "playlist_tracks", transaction_id)?,
        };

        tx.execute("DELETE FROM transactions WHERE id = ?1", params![transaction_id])?;

        for id in &artist_ids {
            mark_pending_with(&tx, profile_id, EntityKind::Artist, *id)?;
        }
        for id in &playlist_ids {
            mark_pending_with(&tx, profile_id, EntityKind::Playlist, *id)?;
        }
        tx.commit()?;

        info!(
            "Rolled back transaction {}: {} artists, {} playlists, {} releases, {} tracks",
            transaction_id, report.artists, report.playlists, report.releases, report.tracks
        );
        Ok(report)
    }

    /// Rolls back the `count` most recent transactions, newest first.
    pub fn rollback_last(&self, count: usize) -> StoreResult<Vec<RollbackReport>> {
        let ids: Vec<i64> = self
            .recent_transactions(count)?
            .into_iter()
            .map(|s| s.transaction.id)
            .collect();

        ids.into_iter().map(|id| self.rollback(id)).collect()
    }

    pub fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<TransactionSummary>> {
        let inner = self.lock();
        let conn = &inner.conn;
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, profile_id FROM transactions
             WHERE profile_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let transactions: Vec<Transaction> = stmt
            .query_map(params![inner.profile_id, limit as i64], |row| {
                Ok(Transaction {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    profile_id: row.get(2)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        transactions
            .into_iter()
            .map(|transaction| {
                Ok(TransactionSummary {
                    artists: count_tagged(conn, "monitor", transaction.id)?,
                    playlists: count_tagged(conn, "playlists", transaction.id)?,
                    releases: count_tagged(conn, "releases", transaction.id)?,
                    tracks: count_tagged(conn, "playlist_tracks", transaction.id)?,
                    transaction,
                })
            })
            .collect()
    }

    // -- profiles ------------------------------------------------------------

    pub fn active_profile_id(&self) -> i64 {
        self.lock().profile_id
    }

    pub fn active_profile(&self) -> StoreResult<Profile> {
        let id = self.active_profile_id();
        match self.get_profile(id)? {
            Some(profile) => Ok(profile),
            None => {
                warn!("Active profile {} vanished, falling back to default", id);
                self.set_active_profile(DEFAULT_PROFILE_ID)?;
                self.get_profile(DEFAULT_PROFILE_ID)?
                    .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
            }
        }
    }

    pub fn set_active_profile(&self, profile_id: i64) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![ACTIVE_PROFILE_KEY, profile_id.to_string()],
        )?;
        inner.profile_id = profile_id;
        Ok(())
    }

    pub fn get_profile(&self, profile_id: i64) -> StoreResult<Option<Profile>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!("{PROFILE_SELECT} WHERE id = ?1"))?;
        Ok(stmt.query_row(params![profile_id], profile_from_row).optional()?)
    }

    pub fn get_profile_by_name(&self, name: &str) -> StoreResult<Option<Profile>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare_cached(&format!("{PROFILE_SELECT} WHERE name = ?1 COLLATE NOCASE"))?;
        Ok(stmt.query_row(params![name], profile_from_row).optional()?)
    }

    pub fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!("{PROFILE_SELECT} ORDER BY id"))?;
        let profiles = stmt
            .query_map([], profile_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(profiles)
    }

    /// Creates a profile and returns its id. `profile.id` is ignored.
    pub fn create_profile(&self, profile: &Profile) -> StoreResult<i64> {
        if self.get_profile_by_name(&profile.name)?.is_some() {
            return Err(StoreError::DuplicateProfile(profile.name.clone()));
        }
        let inner = self.lock();
        inner.conn.execute(
            "INSERT INTO profiles (name, email, alerts, bitrate, record_type, download_path, plex_base_url, plex_token, plex_library)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                profile.name,
                profile.email,
                profile.alerts,
                profile.bitrate.map(|b| b.code()),
                profile.record_type.as_ref().map(|r| r.to_string()),
                profile.download_path,
                profile.plex_base_url,
                profile.plex_token,
                profile.plex_library,
            ],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    pub fn update_profile(&self, profile: &Profile) -> StoreResult<bool> {
        let inner = self.lock();
        let updated = inner.conn.execute(
            "UPDATE profiles SET name = ?2, email = ?3, alerts = ?4, bitrate = ?5, record_type = ?6,
             download_path = ?7, plex_base_url = ?8, plex_token = ?9, plex_library = ?10 WHERE id = ?1",
            params![
                profile.id,
                profile.name,
                profile.email,
                profile.alerts,
                profile.bitrate.map(|b| b.code()),
                profile.record_type.as_ref().map(|r| r.to_string()),
                profile.download_path,
                profile.plex_base_url,
                profile.plex_token,
                profile.plex_library,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Deletes a profile and, through the cascade, all of its data.
    pub fn delete_profile(&self, profile_id: i64) -> StoreResult<bool> {
        if profile_id == DEFAULT_PROFILE_ID {
            return Err(StoreError::DefaultProfile);
        }
        let was_active = self.active_profile_id() == profile_id;
        let deleted = {
            let inner = self.lock();
            let tx = inner.conn.unchecked_transaction()?;
            for table in ["monitor", "playlists", "releases", "playlist_tracks"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE profile_id = ?1"),
                    params![profile_id],
                )?;
            }
            let deleted = tx.execute("DELETE FROM profiles WHERE id = ?1", params![profile_id])?;
            tx.commit()?;
            deleted
        };
        if was_active {
            self.set_active_profile(DEFAULT_PROFILE_ID)?;
        }
        Ok(deleted > 0)
    }

    /// Removes every monitored entity, ledger row, pending flag and
    /// transaction of the active profile.
    pub fn reset_profile(&self) -> StoreResult<()> {
        let inner = self.lock();
        let tx = inner.conn.unchecked_transaction()?;
        for table in [
            "monitor",
            "playlists",
            "releases",
            "playlist_tracks",
            "pending_refresh",
            "transactions",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE profile_id = ?1"),
                params![inner.profile_id],
            )?;
        }
        tx.commit()?;
        info!("Reset profile {}", inner.profile_id);
        Ok(())
    }

    // -- monitored artists ---------------------------------------------------

    /// Starts monitoring an artist and flags it pending.
    /// Returns `false` when the artist is already monitored.
    pub fn add_artist(&self, artist: &ArtistRecord, overrides: &EntityOverrides) -> StoreResult<bool> {
        let inner = self.lock();
        let tid = Self::require_tid(&inner)?;
        let inserted = inner.conn.execute(
            "INSERT OR IGNORE INTO monitor (artist_id, artist_name, bitrate, record_type, alerts, download_path, profile_id, trans_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                artist.id,
                artist.name,
                overrides.bitrate.map(|b| b.code()),
                overrides.record_type.as_ref().map(|r| r.to_string()),
                overrides.alerts,
                overrides.download_path,
                inner.profile_id,
                tid,
            ],
        )?;
        if inserted > 0 {
            mark_pending_with(&inner.conn, inner.profile_id, EntityKind::Artist, artist.id)?;
        }
        Ok(inserted > 0)
    }

    /// Stops monitoring an artist and forgets its releases.
    pub fn remove_artist(&self, artist_id: i64) -> StoreResult<bool> {
        let inner = self.lock();
        let tx = inner.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM monitor WHERE profile_id = ?1 AND artist_id = ?2",
            params![inner.profile_id, artist_id],
        )?;
        tx.execute(
            "DELETE FROM releases WHERE profile_id = ?1 AND artist_id = ?2",
            params![inner.profile_id, artist_id],
        )?;
        tx.execute(
            "DELETE FROM pending_refresh WHERE profile_id = ?1 AND kind = ?2 AND entity_id = ?3",
            params![inner.profile_id, EntityKind::Artist.as_str(), artist_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn update_artist_config(&self, artist_id: i64, overrides: &EntityOverrides) -> StoreResult<bool> {
        let Some(mut artist) = self.get_artist(artist_id)? else {
            return Ok(false);
        };
        if overrides.bitrate.is_some() {
            artist.bitrate = overrides.bitrate;
        }
        if overrides.record_type.is_some() {
            artist.record_type = overrides.record_type.clone();
        }
        if overrides.alerts.is_some() {
            artist.alerts = overrides.alerts;
        }
        if overrides.download_path.is_some() {
            artist.download_path = overrides.download_path.clone();
        }

        let inner = self.lock();
        inner.conn.execute(
            "UPDATE monitor SET bitrate = ?3, record_type = ?4, alerts = ?5, download_path = ?6
             WHERE profile_id = ?1 AND artist_id = ?2",
            params![
                inner.profile_id,
                artist_id,
                artist.bitrate.map(|b| b.code()),
                artist.record_type.as_ref().map(|r| r.to_string()),
                artist.alerts,
                artist.download_path,
            ],
        )?;
        Ok(true)
    }

    pub fn get_artist(&self, artist_id: i64) -> StoreResult<Option<MonitoredArtist>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare_cached(&format!("{ARTIST_SELECT} WHERE profile_id = ?1 AND artist_id = ?2"))?;
        Ok(stmt
            .query_row(params![inner.profile_id, artist_id], artist_from_row)
            .optional()?)
    }

    pub fn get_artists(&self) -> StoreResult<Vec<MonitoredArtist>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "{ARTIST_SELECT} WHERE profile_id = ?1 ORDER BY artist_name COLLATE NOCASE"
        ))?;
        let artists = stmt
            .query_map(params![inner.profile_id], artist_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(artists)
    }

    pub fn find_artists_by_name(&self, name: &str) -> StoreResult<Vec<MonitoredArtist>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "{ARTIST_SELECT} WHERE profile_id = ?1 AND artist_name = ?2 COLLATE NOCASE"
        ))?;
        let artists = stmt
            .query_map(params![inner.profile_id, name.trim()], artist_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(artists)
    }

    // -- monitored playlists -------------------------------------------------

    pub fn add_playlist(&self, playlist: &PlaylistRecord, overrides: &EntityOverrides) -> StoreResult<bool> {
        let inner = self.lock();
        let tid = Self::require_tid(&inner)?;
        let inserted = inner.conn.execute(
            "INSERT OR IGNORE INTO playlists (id, title, url, bitrate, alerts, download_path, profile_id, trans_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                playlist.id,
                playlist.title,
                playlist.link,
                overrides.bitrate.map(|b| b.code()),
                overrides.alerts,
                overrides.download_path,
                inner.profile_id,
                tid,
            ],
        )?;
        if inserted > 0 {
            mark_pending_with(&inner.conn, inner.profile_id, EntityKind::Playlist, playlist.id)?;
        }
        Ok(inserted > 0)
    }

    pub fn remove_playlist(&self, playlist_id: i64) -> StoreResult<bool> {
        let inner = self.lock();
        let tx = inner.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM playlists WHERE profile_id = ?1 AND id = ?2",
            params![inner.profile_id, playlist_id],
        )?;
        tx.execute(
            "DELETE FROM playlist_tracks WHERE profile_id = ?1 AND playlist_id = ?2",
            params![inner.profile_id, playlist_id],
        )?;
        tx.execute(
            "DELETE FROM pending_refresh WHERE profile_id = ?1 AND kind = ?2 AND entity_id = ?3",
            params![inner.profile_id, EntityKind::Playlist.as_str(), playlist_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn update_playlist_config(&self, playlist_id: i64, overrides: &EntityOverrides) -> StoreResult<bool> {
        let Some(mut playlist) = self.get_playlist(playlist_id)? else {
            return Ok(false);
        };
        if overrides.bitrate.is_some() {
            playlist.bitrate = overrides.bitrate;
        }
        if overrides.alerts.is_some() {
            playlist.alerts = overrides.alerts;
        }
        if overrides.download_path.is_some() {
            playlist.download_path = overrides.download_path.clone();
        }

        let inner = self.lock();
        inner.conn.execute(
            "UPDATE playlists SET bitrate = ?3, alerts = ?4, download_path = ?5
             WHERE profile_id = ?1 AND id = ?2",
            params![
                inner.profile_id,
                playlist_id,
                playlist.bitrate.map(|b| b.code()),
                playlist.alerts,
                playlist.download_path,
            ],
        )?;
        Ok(true)
    }

    pub fn get_playlist(&self, playlist_id: i64) -> StoreResult<Option<MonitoredPlaylist>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare_cached(&format!("{PLAYLIST_SELECT} WHERE profile_id = ?1 AND id = ?2"))?;
        Ok(stmt
            .query_row(params![inner.profile_id, playlist_id], playlist_from_row)
            .optional()?)
    }

    pub fn get_playlists(&self) -> StoreResult<Vec<MonitoredPlaylist>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "{PLAYLIST_SELECT} WHERE profile_id = ?1 ORDER BY title COLLATE NOCASE"
        ))?;
        let playlists = stmt
            .query_map(params![inner.profile_id], playlist_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(playlists)
    }

    pub fn find_playlists_by_title(&self, title: &str) -> StoreResult<Vec<MonitoredPlaylist>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "{PLAYLIST_SELECT} WHERE profile_id = ?1 AND title = ?2 COLLATE NOCASE"
        ))?;
        let playlists = stmt
            .query_map(params![inner.profile_id, title.trim()], playlist_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(playlists)
    }

    // -- pending refresh -----------------------------------------------------

    pub fn mark_pending(&self, kind: EntityKind, entity_id: i64) -> StoreResult<()> {
        let inner = self.lock();
        mark_pending_with(&inner.conn, inner.profile_id, kind, entity_id)
    }

    pub fn is_pending(&self, kind: EntityKind, entity_id: i64) -> StoreResult<bool> {
        let inner = self.lock();
        Ok(inner
            .conn
            .query_row(
                "SELECT 1 FROM pending_refresh WHERE profile_id = ?1 AND kind = ?2 AND entity_id = ?3",
                params![inner.profile_id, kind.as_str(), entity_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    pub fn clear_pending(&self, kind: EntityKind, entity_ids: &[i64]) -> StoreResult<()> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(
            "DELETE FROM pending_refresh WHERE profile_id = ?1 AND kind = ?2 AND entity_id = ?3",
        )?;
        for id in entity_ids {
            stmt.execute(params![inner.profile_id, kind.as_str(), id])?;
        }
        Ok(())
    }

    /// `true` once a refresh of the entity has been committed and not rolled
    /// back.
    pub fn has_been_refreshed(&self, kind: EntityKind, entity_id: i64) -> StoreResult<bool> {
        let inner = self.lock();
        let sql = match kind {
            EntityKind::Artist => {
                "SELECT refreshed_trans_id FROM monitor WHERE profile_id = ?1 AND artist_id = ?2"
            }
            EntityKind::Playlist => {
                "SELECT refreshed_trans_id FROM playlists WHERE profile_id = ?1 AND id = ?2"
            }
        };
        let tid: Option<Option<i64>> = inner
            .conn
            .query_row(sql, params![inner.profile_id, entity_id], |row| row.get(0))
            .optional()?;
        Ok(tid.flatten().is_some())
    }

    /// Tags entities refreshed for the first time with the open transaction.
    /// Rolling that transaction back makes them new again. Returns the number
    /// of entities tagged.
    pub fn mark_refreshed(&self, kind: EntityKind, entity_ids: &[i64]) -> StoreResult<usize> {
        let inner = self.lock();
        let tid = Self::require_tid(&inner)?;
        let sql = match kind {
            EntityKind::Artist => {
                "UPDATE monitor SET refreshed_trans_id = ?3
                 WHERE profile_id = ?1 AND artist_id = ?2 AND refreshed_trans_id IS NULL"
            }
            EntityKind::Playlist => {
                "UPDATE playlists SET refreshed_trans_id = ?3
                 WHERE profile_id = ?1 AND id = ?2 AND refreshed_trans_id IS NULL"
            }
        };
        let mut stmt = inner.conn.prepare_cached(sql)?;
        let mut tagged = 0;
        for id in entity_ids {
            tagged += stmt.execute(params![inner.profile_id, id, tid])?;
        }
        Ok(tagged)
    }

    /// Entities flagged pending, or every monitored entity when none is.
    pub fn get_due_for_refresh(&self) -> StoreResult<DueForRefresh> {
        let (artists, playlists) = {
            let inner = self.lock();
            let mut stmt = inner.conn.prepare_cached(&format!(
                "{ARTIST_SELECT} WHERE profile_id = ?1 AND artist_id IN
                 (SELECT entity_id FROM pending_refresh WHERE profile_id = ?1 AND kind = ?2)
                 ORDER BY artist_name COLLATE NOCASE"
            ))?;
            let artists: Vec<MonitoredArtist> = stmt
                .query_map(
                    params![inner.profile_id, EntityKind::Artist.as_str()],
                    artist_from_row,
                )?
                .collect::<Result<_, _>>()?;

            let mut stmt = inner.conn.prepare_cached(&format!(
                "{PLAYLIST_SELECT} WHERE profile_id = ?1 AND id IN
                 (SELECT entity_id FROM pending_refresh WHERE profile_id = ?1 AND kind = ?2)
                 ORDER BY title COLLATE NOCASE"
            ))?;
            let playlists: Vec<MonitoredPlaylist> = stmt
                .query_map(
                    params![inner.profile_id, EntityKind::Playlist.as_str()],
                    playlist_from_row,
                )?
                .collect::<Result<_, _>>()?;
            (artists, playlists)
        };

        if !artists.is_empty() || !playlists.is_empty() {
            return Ok(DueForRefresh {
                artists,
                playlists,
                full_refresh: false,
            });
        }

        Ok(DueForRefresh {
            artists: self.get_artists()?,
            playlists: self.get_playlists()?,
            full_refresh: true,
        })
    }

    // -- seen ledger ---------------------------------------------------------

    pub fn get_seen_release_ids(&self, artist_id: i64) -> StoreResult<HashSet<i64>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(
            "SELECT album_id FROM releases WHERE profile_id = ?1 AND artist_id = ?2",
        )?;
        let ids = stmt
            .query_map(params![inner.profile_id, artist_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    /// Every album id in the seen ledger of the active profile, whichever
    /// artist it is filed under.
    pub fn get_profile_release_ids(&self) -> StoreResult<HashSet<i64>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare_cached("SELECT album_id FROM releases WHERE profile_id = ?1")?;
        let ids = stmt
            .query_map(params![inner.profile_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    pub fn get_profile_future_ids(&self) -> StoreResult<HashSet<i64>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare_cached("SELECT album_id FROM releases WHERE profile_id = ?1 AND future_release = 1")?;
        let ids = stmt
            .query_map(params![inner.profile_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    pub fn get_future_release_ids(&self, artist_id: i64) -> StoreResult<HashSet<i64>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(
            "SELECT album_id FROM releases WHERE profile_id = ?1 AND artist_id = ?2 AND future_release = 1",
        )?;
        let ids = stmt
            .query_map(params![inner.profile_id, artist_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    pub fn get_seen_track_ids(&self, playlist_id: i64) -> StoreResult<HashSet<i64>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(
            "SELECT track_id FROM playlist_tracks WHERE profile_id = ?1 AND playlist_id = ?2",
        )?;
        let ids = stmt
            .query_map(params![inner.profile_id, playlist_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    /// Inserts releases into the seen ledger. Already-seen album ids are
    /// ignored. Returns the number of inserted rows.
    pub fn record_releases(&self, entries: &[ReleaseEntry]) -> StoreResult<usize> {
        let inner = self.lock();
        let tid = Self::require_tid(&inner)?;
        let now = utils::now_timestamp();
        let mut stmt = inner.conn.prepare_cached(
            "INSERT OR IGNORE INTO releases
             (artist_id, artist_name, album_id, album_name, album_release, album_added, explicit, record_type, future_release, profile_id, trans_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;

        let mut inserted = 0;
        for entry in entries {
            let r = &entry.release;
            inserted += stmt.execute(params![
                r.artist_id,
                r.artist_name,
                r.id,
                r.title,
                r.release_date,
                now,
                r.explicit,
                r.record_type.as_str(),
                entry.future,
                inner.profile_id,
                tid,
            ])?;
        }
        Ok(inserted)
    }

    /// Inserts playlist tracks into the seen ledger, ignoring known ones.
    pub fn record_playlist_tracks(&self, playlist_id: i64, tracks: &[TrackRecord]) -> StoreResult<usize> {
        let inner = self.lock();
        let tid = Self::require_tid(&inner)?;
        let now = utils::now_timestamp();
        let mut stmt = inner.conn.prepare_cached(
            "INSERT OR IGNORE INTO playlist_tracks
             (track_id, playlist_id, artist_id, artist_name, track_name, track_added, profile_id, trans_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        let mut inserted = 0;
        for track in tracks {
            inserted += stmt.execute(params![
                track.id,
                playlist_id,
                track.artist_id,
                track.artist_name,
                track.title,
                now,
                inner.profile_id,
                tid,
            ])?;
        }
        Ok(inserted)
    }

    /// Turns a future release into a normal one. The row is re-tagged with the
    /// open transaction so rolling that run back forgets the release entirely.
    pub fn clear_future_flag(&self, album_id: i64, release_date: &str) -> StoreResult<bool> {
        let inner = self.lock();
        let tid = Self::require_tid(&inner)?;
        let updated = inner.conn.execute(
            "UPDATE releases SET future_release = 0, album_release = ?3, trans_id = ?4
             WHERE profile_id = ?1 AND album_id = ?2 AND future_release = 1",
            params![inner.profile_id, album_id, release_date, tid],
        )?;
        Ok(updated > 0)
    }

    /// Forgets releases of the given artists dated after `date`.
    pub fn discard_releases_after(&self, artist_ids: &[i64], date: NaiveDate) -> StoreResult<usize> {
        let inner = self.lock();
        Self::require_tid(&inner)?;
        let cutoff = date.format(utils::DATE_FORMAT).to_string();
        let mut stmt = inner.conn.prepare_cached(
            "DELETE FROM releases WHERE profile_id = ?1 AND artist_id = ?2 AND album_release > ?3",
        )?;
        let mut removed = 0;
        for artist_id in artist_ids {
            removed += stmt.execute(params![inner.profile_id, artist_id, cutoff])?;
        }
        Ok(removed)
    }

    pub fn get_seen_releases(&self, artist_id: i64) -> StoreResult<Vec<SeenRelease>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "{RELEASE_SELECT} WHERE profile_id = ?1 AND artist_id = ?2 ORDER BY album_release DESC"
        ))?;
        let releases = stmt
            .query_map(params![inner.profile_id, artist_id], release_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(releases)
    }

    /// Seen releases dated on or after `since` (all when `None`), newest first.
    pub fn recent_releases(&self, since: Option<NaiveDate>, future_only: bool) -> StoreResult<Vec<SeenRelease>> {
        let inner = self.lock();
        let since = since
            .map(|d| d.format(utils::DATE_FORMAT).to_string())
            .unwrap_or_default();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "{RELEASE_SELECT} WHERE profile_id = ?1 AND album_release >= ?2 AND (?3 = 0 OR future_release = 1)
             ORDER BY album_release DESC, artist_name COLLATE NOCASE"
        ))?;
        let releases = stmt
            .query_map(params![inner.profile_id, since, future_only], release_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(releases)
    }

    pub fn get_seen_tracks(&self, playlist_id: i64) -> StoreResult<Vec<SeenPlaylistTrack>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare_cached(
            "SELECT playlist_id, track_id, artist_id, artist_name, track_name, track_added, trans_id
             FROM playlist_tracks WHERE profile_id = ?1 AND playlist_id = ?2 ORDER BY track_added DESC",
        )?;
        let tracks = stmt
            .query_map(params![inner.profile_id, playlist_id], |row| {
                Ok(SeenPlaylistTrack {
                    playlist_id: row.get(0)?,
                    track_id: row.get(1)?,
                    artist_id: row.get(2)?,
                    artist_name: row.get(3)?,
                    track_name: row.get(4)?,
                    added: row.get(5)?,
                    trans_id: row.get(6)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(tracks)
    }
}

const PROFILE_SELECT: &str = "SELECT id, name, email, alerts, bitrate, record_type, download_path, plex_base_url, plex_token, plex_library FROM profiles";
const ARTIST_SELECT: &str = "SELECT artist_id, artist_name, bitrate, record_type, alerts, download_path, profile_id, trans_id FROM monitor";
const PLAYLIST_SELECT: &str = "SELECT id, title, url, bitrate, alerts, download_path, profile_id, trans_id FROM playlists";
const RELEASE_SELECT: &str = "SELECT artist_id, artist_name, album_id, album_name, album_release, explicit, record_type, album_added, future_release, trans_id FROM releases";

fn mark_pending_with(conn: &Connection, profile_id: i64, kind: EntityKind, entity_id: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO pending_refresh (kind, entity_id, profile_id) VALUES (?1, ?2, ?3)",
        params![kind.as_str(), entity_id, profile_id],
    )?;
    Ok(())
}

fn collect_ids(conn: &Connection, sql: &str, transaction_id: i64) -> StoreResult<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params![transaction_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(ids)
}

fn count_tagged(conn: &Connection, table: &str, transaction_id: i64) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE trans_id = ?1"),
        params![transaction_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn bitrate_column(code: Option<i64>) -> Option<Bitrate> {
    code.and_then(|c| u8::try_from(c).ok())
        .and_then(Bitrate::from_code)
}

fn record_type_column(value: Option<String>) -> Option<RecordTypeFilter> {
    value.and_then(|v| match v.parse() {
        Ok(filter) => Some(filter),
        Err(e) => {
            warn!("Ignoring malformed record type override '{}': {}", v, e);
            None
        }
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        alerts: row.get(3)?,
        bitrate: bitrate_column(row.get(4)?),
        record_type: record_type_column(row.get(5)?),
        download_path: row.get(6)?,
        plex_base_url: row.get(7)?,
        plex_token: row.get(8)?,
        plex_library: row.get(9)?,
    })
}

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<MonitoredArtist> {
    Ok(MonitoredArtist {
        id: row.get(0)?,
        name: row.get(1)?,
        bitrate: bitrate_column(row.get(2)?),
        record_type: record_type_column(row.get(3)?),
        alerts: row.get(4)?,
        download_path: row.get(5)?,
        profile_id: row.get(6)?,
        trans_id: row.get(7)?,
    })
}

fn playlist_from_row(row: &Row<'_>) -> rusqlite::Result<MonitoredPlaylist> {
    Ok(MonitoredPlaylist {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        bitrate: bitrate_column(row.get(3)?),
        alerts: row.get(4)?,
        download_path: row.get(5)?,
        profile_id: row.get(6)?,
        trans_id: row.get(7)?,
    })
}

fn release_from_row(row: &Row<'_>) -> rusqlite::Result<SeenRelease> {
    let record_type: String = row.get(6)?;
    Ok(SeenRelease {
        artist_id: row.get(0)?,
        artist_name: row.get(1)?,
        album_id: row.get(2)?,
        title: row.get(3)?,
        release_date: row.get(4)?,
        explicit: row.get(5)?,
        record_type: record_type.parse().unwrap_or(RecordType::Album),
        added: row.get(7)?,
        future: row.get(8)?,
        trans_id: row.get(9)?,
    })
}
