//! Versioned SQLite schema of the monitor database.

use rusqlite::Connection;

use crate::error::StoreError;

/// Offset added to the schema version stored in `PRAGMA user_version`, so a
/// foreign SQLite file (version 0) is never mistaken for one of ours.
pub const BASE_DB_VERSION: i64 = 300;

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub schema: &'static str,
    pub indices: &'static [&'static str],
}

const PROFILES_TABLE_V_1: Table = Table {
    name: "profiles",
    columns: &[
        "id",
        "name",
        "email",
        "alerts",
        "bitrate",
        "record_type",
        "download_path",
        "plex_base_url",
        "plex_token",
        "plex_library",
    ],
    schema: "CREATE TABLE profiles (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, email TEXT, alerts INTEGER, bitrate INTEGER, record_type TEXT, download_path TEXT, plex_base_url TEXT, plex_token TEXT, plex_library TEXT);",
    indices: &[],
};

const SETTINGS_TABLE_V_1: Table = Table {
    name: "settings",
    columns: &["key", "value"],
    schema: "CREATE TABLE settings (key TEXT NOT NULL PRIMARY KEY, value TEXT NOT NULL);",
    indices: &[],
};

const TRANSACTIONS_TABLE_V_1: Table = Table {
    name: "transactions",
    columns: &["id", "timestamp", "profile_id"],
    schema: "CREATE TABLE transactions (id INTEGER PRIMARY KEY AUTOINCREMENT, timestamp INTEGER NOT NULL, profile_id INTEGER NOT NULL, CONSTRAINT profile_id FOREIGN KEY (profile_id) REFERENCES profiles (id) ON DELETE CASCADE);",
    indices: &["CREATE INDEX transactions_profile_index ON transactions (profile_id);"],
};

const MONITOR_TABLE_V_1: Table = Table {
    name: "monitor",
    columns: &[
        "artist_id",
        "artist_name",
        "bitrate",
        "record_type",
        "alerts",
        "download_path",
        "profile_id",
        "trans_id",
        "refreshed_trans_id",
    ],
    schema: "CREATE TABLE monitor (artist_id INTEGER NOT NULL, artist_name TEXT NOT NULL, bitrate INTEGER, record_type TEXT, alerts INTEGER, download_path TEXT, profile_id INTEGER NOT NULL, trans_id INTEGER NOT NULL, refreshed_trans_id INTEGER, UNIQUE (profile_id, artist_id), CONSTRAINT trans_id FOREIGN KEY (trans_id) REFERENCES transactions (id) ON DELETE CASCADE, CONSTRAINT refreshed_trans_id FOREIGN KEY (refreshed_trans_id) REFERENCES transactions (id) ON DELETE SET NULL);",
    indices: &["CREATE INDEX monitor_name_index ON monitor (profile_id, artist_name COLLATE NOCASE);"],
};

const PLAYLISTS_TABLE_V_1: Table = Table {
    name: "playlists",
    columns: &[
        "id",
        "title",
        "url",
        "bitrate",
        "alerts",
        "download_path",
        "profile_id",
        "trans_id",
        "refreshed_trans_id",
    ],
    schema: "CREATE TABLE playlists (id INTEGER NOT NULL, title TEXT NOT NULL, url TEXT NOT NULL, bitrate INTEGER, alerts INTEGER, download_path TEXT, profile_id INTEGER NOT NULL, trans_id INTEGER NOT NULL, refreshed_trans_id INTEGER, UNIQUE (profile_id, id), CONSTRAINT trans_id FOREIGN KEY (trans_id) REFERENCES transactions (id) ON DELETE CASCADE, CONSTRAINT refreshed_trans_id FOREIGN KEY (refreshed_trans_id) REFERENCES transactions (id) ON DELETE SET NULL);",
    indices: &[],
};

const RELEASES_TABLE_V_1: Table = Table {
    name: "releases",
    columns: &[
        "artist_id",
        "artist_name",
        "album_id",
        "album_name",
        "album_release",
        "album_added",
        "explicit",
        "record_type",
        "future_release",
        "profile_id",
        "trans_id",
    ],
    schema: "CREATE TABLE releases (artist_id INTEGER NOT NULL, artist_name TEXT NOT NULL, album_id INTEGER NOT NULL, album_name TEXT NOT NULL, album_release TEXT NOT NULL, album_added INTEGER NOT NULL, explicit INTEGER NOT NULL DEFAULT 0, record_type TEXT NOT NULL, future_release INTEGER NOT NULL DEFAULT 0, profile_id INTEGER NOT NULL, trans_id INTEGER NOT NULL, UNIQUE (profile_id, album_id), CONSTRAINT trans_id FOREIGN KEY (trans_id) REFERENCES transactions (id) ON DELETE CASCADE);",
    indices: &[
        "CREATE INDEX releases_artist_index ON releases (profile_id, artist_id);",
        "CREATE INDEX releases_date_index ON releases (profile_id, album_release);",
    ],
};

const PLAYLIST_TRACKS_TABLE_V_1: Table = Table {
    name: "playlist_tracks",
    columns: &[
        "track_id",
        "playlist_id",
        "artist_id",
        "artist_name",
        "track_name",
        "track_added",
        "profile_id",
        "trans_id",
    ],
    schema: "CREATE TABLE playlist_tracks (track_id INTEGER NOT NULL, playlist_id INTEGER NOT NULL, artist_id INTEGER NOT NULL, artist_name TEXT NOT NULL, track_name TEXT NOT NULL, track_added INTEGER NOT NULL, profile_id INTEGER NOT NULL, trans_id INTEGER NOT NULL, UNIQUE (profile_id, playlist_id, track_id), CONSTRAINT trans_id FOREIGN KEY (trans_id) REFERENCES transactions (id) ON DELETE CASCADE);",
    indices: &[],
};

const PENDING_REFRESH_TABLE_V_1: Table = Table {
    name: "pending_refresh",
    columns: &["kind", "entity_id", "profile_id"],
    schema: "CREATE TABLE pending_refresh (kind TEXT NOT NULL, entity_id INTEGER NOT NULL, profile_id INTEGER NOT NULL, UNIQUE (profile_id, kind, entity_id), CONSTRAINT profile_id FOREIGN KEY (profile_id) REFERENCES profiles (id) ON DELETE CASCADE);",
    indices: &[],
};

pub struct VersionedSchema {
    pub version: i64,
    pub tables: &'static [Table],
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<(), StoreError> {
        for table in self.tables {
            conn.execute(table.schema, [])?;
            for index in table.indices {
                conn.execute(index, [])?;
            }
        }
        conn.pragma_update(None, "user_version", BASE_DB_VERSION + self.version)?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<(), StoreError> {
        for table in self.tables {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
            let columns: Vec<String> = stmt
                .query_map([], |row| row.get(1))?
                .collect::<Result<_, _>>()?;

            if columns != table.columns {
                return Err(StoreError::SchemaMismatch {
                    table: table.name.to_string(),
                    found: columns,
                });
            }
        }
        Ok(())
    }
}

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        PROFILES_TABLE_V_1,
        SETTINGS_TABLE_V_1,
        TRANSACTIONS_TABLE_V_1,
        MONITOR_TABLE_V_1,
        PLAYLISTS_TABLE_V_1,
        RELEASES_TABLE_V_1,
        PLAYLIST_TRACKS_TABLE_V_1,
        PENDING_REFRESH_TABLE_V_1,
    ],
}];
