//! Refresh engine.
//!
//! One run walks Select → Fetch → Diff → Filter → Queue/Digest → Persist.
//! Fetches run concurrently on a bounded pool and all of them finish before
//! the first diff. Every write of the run lands in a single store transaction
//! that is opened only when there is something to write, so a run that finds
//! nothing new leaves the database untouched. Handing the queue to a download
//! sink and the digest to a notifier is left to [`crate::download::dispatch`]
//! and [`crate::notify`].

pub mod filter;
pub mod queue;

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use self::{
    filter::{Disposition, FilterContext},
    queue::{Digest, QueueItem},
};
use crate::{
    Res,
    catalog::{CatalogClient, CatalogError},
    config::Config,
    management::{ReleaseEntry, SqliteStore},
    types::{
        EntityKind, MonitoredArtist, MonitoredPlaylist, PlaylistRecord, Profile, ReleaseRecord,
        TrackRecord,
    },
    utils,
};

/// Which entities a run looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RefreshTarget {
    /// Pending entities, or every monitored entity when none is pending.
    #[default]
    Due,
    /// Exactly these monitored entities.
    Explicit {
        artist_ids: Vec<i64>,
        playlist_ids: Vec<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub target: RefreshTarget,
    /// Simulated "now". Releases recorded after this date are forgotten first.
    pub time_machine: Option<NaiveDate>,
    /// Bulk catch-up: queue everything that is neither future nor a clean
    /// duplicate of an explicit release.
    pub ignore_filters: bool,
    /// Wall clock date, injectable for tests.
    pub today: NaiveDate,
    pub show_progress: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            target: RefreshTarget::Due,
            time_machine: None,
            ignore_filters: false,
            today: utils::today(),
            show_progress: false,
        }
    }
}

impl RefreshOptions {
    /// The refresh clock: the time-machine date if set, else today.
    pub fn clock(&self) -> NaiveDate {
        self.time_machine.unwrap_or(self.today)
    }
}

/// An entity whose fetch failed. It stays pending and adds nothing this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: EntityKind,
    pub id: i64,
    pub name: String,
    pub error: CatalogError,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    /// `None` when nothing was selected.
    pub selected: Option<Selection>,
    pub queue: Vec<QueueItem>,
    pub digest: Digest,
    pub failures: Vec<FetchFailure>,
    pub releases_recorded: usize,
    pub futures_recorded: usize,
    pub futures_matured: usize,
    pub tracks_recorded: usize,
    pub releases_discarded: usize,
    /// Transaction that carries this run's writes, if any were made.
    pub transaction_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub artists: usize,
    pub playlists: usize,
    pub full_refresh: bool,
}

/// Writes collected during Diff/Filter, applied in one go.
#[derive(Default)]
struct PendingWrites {
    releases: Vec<ReleaseEntry>,
    tracks: Vec<(i64, Vec<TrackRecord>)>,
    matured: Vec<(i64, String)>,
    refreshed_artists: Vec<i64>,
    refreshed_playlists: Vec<i64>,
    first_artists: Vec<i64>,
    first_playlists: Vec<i64>,
}

impl PendingWrites {
    fn has_ledger_writes(&self) -> bool {
        !self.releases.is_empty()
            || !self.matured.is_empty()
            || !self.first_artists.is_empty()
            || !self.first_playlists.is_empty()
            || self.tracks.iter().any(|(_, t)| !t.is_empty())
    }
}

/// Release ledger of the whole profile, loaded once per run after any
/// time-machine discard.
struct RunLedger {
    seen: HashSet<i64>,
    futures: HashSet<i64>,
    /// Album ids already diffed this run, by any artist.
    handled: HashSet<i64>,
}

pub struct RefreshEngine<'a> {
    store: &'a SqliteStore,
    catalog: Arc<dyn CatalogClient>,
    config: &'a Config,
    profile: Profile,
}

impl<'a> RefreshEngine<'a> {
    pub fn new(store: &'a SqliteStore, catalog: Arc<dyn CatalogClient>, config: &'a Config, profile: Profile) -> Self {
        Self {
            store,
            catalog,
            config,
            profile,
        }
    }

    pub async fn run(&self, options: &RefreshOptions) -> Res<RefreshOutcome> {
        match self.run_inner(options).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(abort_err) = self.store.abort() {
                    warn!("Cannot abort refresh transaction: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn run_inner(&self, options: &RefreshOptions) -> Res<RefreshOutcome> {
        let mut outcome = RefreshOutcome::default();

        let (artists, playlists, full_refresh) = self.select(&options.target)?;
        if artists.is_empty() && playlists.is_empty() {
            info!("Nothing to refresh");
            return Ok(outcome);
        }
        outcome.selected = Some(Selection {
            artists: artists.len(),
            playlists: playlists.len(),
            full_refresh,
        });
        info!(
            "Refreshing {} artists and {} playlists{}",
            artists.len(),
            playlists.len(),
            if full_refresh { " (full refresh)" } else { "" }
        );

        let (artist_results, playlist_results) = self
            .fetch_all(&artists, &playlists, options.show_progress)
            .await;

        if let Some(date) = options.time_machine {
            outcome.releases_discarded = self.discard_after(&artists, date)?;
        }

        let mut writes = PendingWrites::default();
        let mut ledger = RunLedger {
            seen: self.store.get_profile_release_ids()?,
            futures: self.store.get_profile_future_ids()?,
            handled: HashSet::new(),
        };

        for (artist, result) in artists.iter().zip(artist_results) {
            match result {
                Ok(releases) => {
                    self.diff_artist(artist, releases, options, &mut ledger, &mut writes, &mut outcome)?
                }
                Err(error) => {
                    warn!("Cannot fetch releases of {} ({}): {}", artist.name, artist.id, error);
                    outcome.failures.push(FetchFailure {
                        kind: EntityKind::Artist,
                        id: artist.id,
                        name: artist.name.clone(),
                        error,
                    });
                }
            }
        }

        for (playlist, result) in playlists.iter().zip(playlist_results) {
            match result {
                Ok(record) => self.diff_playlist(playlist, record, options, &mut writes, &mut outcome)?,
                Err(error) => {
                    warn!("Cannot fetch playlist {} ({}): {}", playlist.title, playlist.id, error);
                    outcome.failures.push(FetchFailure {
                        kind: EntityKind::Playlist,
                        id: playlist.id,
                        name: playlist.title.clone(),
                        error,
                    });
                }
            }
        }

        self.persist(writes, &mut outcome)?;
        Ok(outcome)
    }

    fn select(&self, target: &RefreshTarget) -> Res<(Vec<MonitoredArtist>, Vec<MonitoredPlaylist>, bool)> {
        match target {
            RefreshTarget::Due => {
                let due = self.store.get_due_for_refresh()?;
                Ok((due.artists, due.playlists, due.full_refresh))
            }
            RefreshTarget::Explicit {
                artist_ids,
                playlist_ids,
            } => {
                let mut artists = Vec::with_capacity(artist_ids.len());
                for id in artist_ids {
                    match self.store.get_artist(*id)? {
                        Some(artist) => artists.push(artist),
                        None => warn!("Artist {} is not monitored, skipping", id),
                    }
                }
                let mut playlists = Vec::with_capacity(playlist_ids.len());
                for id in playlist_ids {
                    match self.store.get_playlist(*id)? {
                        Some(playlist) => playlists.push(playlist),
                        None => warn!("Playlist {} is not monitored, skipping", id),
                    }
                }
                Ok((artists, playlists, false))
            }
        }
    }

    async fn fetch_all(
        &self,
        artists: &[MonitoredArtist],
        playlists: &[MonitoredPlaylist],
        show_progress: bool,
    ) -> (
        Vec<Result<Vec<ReleaseRecord>, CatalogError>>,
        Vec<Result<PlaylistRecord, CatalogError>>,
    ) {
        let pool_size = self.config.fetch_pool_size();
        debug!("Fetching with a pool of {} workers", pool_size);
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let pb = progress_bar((artists.len() + playlists.len()) as u64, show_progress);

        let artist_handles: Vec<_> = artists
            .iter()
            .map(|artist| {
                let catalog = Arc::clone(&self.catalog);
                let semaphore = Arc::clone(&semaphore);
                let artist_id = artist.id;
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    catalog.get_releases(artist_id).await
                })
            })
            .collect();

        let playlist_handles: Vec<_> = playlists
            .iter()
            .map(|playlist| {
                let catalog = Arc::clone(&self.catalog);
                let semaphore = Arc::clone(&semaphore);
                let playlist_id = playlist.id;
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    catalog.get_playlist(playlist_id).await
                })
            })
            .collect();

        let mut artist_results = Vec::with_capacity(artist_handles.len());
        for (artist, handle) in artists.iter().zip(artist_handles) {
            pb.set_message(artist.name.clone());
            artist_results.push(
                handle
                    .await
                    .unwrap_or_else(|e| Err(CatalogError::Network(e.to_string()))),
            );
            pb.inc(1);
        }

        let mut playlist_results = Vec::with_capacity(playlist_handles.len());
        for (playlist, handle) in playlists.iter().zip(playlist_handles) {
            pb.set_message(playlist.title.clone());
            playlist_results.push(
                handle
                    .await
                    .unwrap_or_else(|e| Err(CatalogError::Network(e.to_string()))),
            );
            pb.inc(1);
        }

        pb.finish_and_clear();
        (artist_results, playlist_results)
    }

    /// Forgets releases of the selected artists dated after the simulated date.
    fn discard_after(&self, artists: &[MonitoredArtist], date: NaiveDate) -> Res<usize> {
        let mut affected = Vec::new();
        for artist in artists {
            let newer = self
                .store
                .get_seen_releases(artist.id)?
                .iter()
                .any(|r| utils::parse_release_date(&r.release_date).is_some_and(|d| d > date));
            if newer {
                affected.push(artist.id);
            }
        }
        if affected.is_empty() {
            return Ok(0);
        }

        self.store.begin_transaction()?;
        let removed = self.store.discard_releases_after(&affected, date)?;
        info!("Time machine: forgot {} releases after {}", removed, date);
        Ok(removed)
    }

    /// An entity is new until its first refresh is committed, unless its
    /// ledger already holds rows filed under it.
    fn is_new_entity(&self, kind: EntityKind, id: i64, writes: &mut PendingWrites) -> Res<bool> {
        if self.store.has_been_refreshed(kind, id)? {
            return Ok(false);
        }
        let ledger_empty = match kind {
            EntityKind::Artist => {
                writes.first_artists.push(id);
                self.store.get_seen_release_ids(id)?.is_empty()
            }
            EntityKind::Playlist => {
                writes.first_playlists.push(id);
                self.store.get_seen_track_ids(id)?.is_empty()
            }
        };
        Ok(ledger_empty)
    }

    fn diff_artist(
        &self,
        artist: &MonitoredArtist,
        mut releases: Vec<ReleaseRecord>,
        options: &RefreshOptions,
        ledger: &mut RunLedger,
        writes: &mut PendingWrites,
        outcome: &mut RefreshOutcome,
    ) -> Res<()> {
        writes.refreshed_artists.push(artist.id);
        let new_entity = self.is_new_entity(EntityKind::Artist, artist.id, writes)?;
        if releases.is_empty() {
            debug!("{} has no releases", artist.name);
            return Ok(());
        }
        utils::remove_duplicate_releases(&mut releases);

        let effective = self.config.resolve_artist(&self.profile, artist);
        let explicit_titles = filter::explicit_titles(&releases);
        let clock = options.clock();

        let ctx = FilterContext {
            clock,
            time_machine: options.time_machine.is_some(),
            ignore_filters: options.ignore_filters,
            record_types: &effective.record_types,
            release_max_age: self.config.release_max_age,
            exclusions: &self.config.exclusions,
            new_entity,
            explicit_titles: &explicit_titles,
        };

        for release in &releases {
            if !ledger.handled.insert(release.id) {
                debug!("{} - {} already handled this run", release.artist_name, release.title);
                continue;
            }
            let disposition = if ledger.seen.contains(&release.id) {
                if !ledger.futures.contains(&release.id) {
                    continue;
                }
                let matured = utils::parse_release_date(&release.release_date).is_some_and(|d| d <= clock);
                if !matured {
                    continue;
                }
                let disposition = filter::evaluate(release, &ctx);
                writes.matured.push((release.id, release.release_date.clone()));
                outcome.futures_matured += 1;
                debug!("{} - {} reached its release date", release.artist_name, release.title);
                disposition
            } else {
                let disposition = filter::evaluate(release, &ctx);
                writes.releases.push(ReleaseEntry {
                    release: release.clone(),
                    future: disposition == Disposition::Future,
                });
                disposition
            };

            match disposition {
                Disposition::Queue => {
                    outcome.queue.push(QueueItem::album(release, &effective));
                    if effective.alerts {
                        outcome.digest.push(release);
                    }
                }
                Disposition::Future => {
                    debug!(
                        "{} - {} is a future release ({})",
                        release.artist_name, release.title, release.release_date
                    );
                }
                Disposition::RecordOnly(reason) => {
                    debug!("Skipping {} - {}: {}", release.artist_name, release.title, reason);
                }
            }
        }
        Ok(())
    }

    fn diff_playlist(
        &self,
        playlist: &MonitoredPlaylist,
        record: PlaylistRecord,
        options: &RefreshOptions,
        writes: &mut PendingWrites,
        outcome: &mut RefreshOutcome,
    ) -> Res<()> {
        writes.refreshed_playlists.push(playlist.id);
        let new_entity = self.is_new_entity(EntityKind::Playlist, playlist.id, writes)?;
        let effective = self.config.resolve_playlist(&self.profile, playlist);
        let seen = self.store.get_seen_track_ids(playlist.id)?;
        let no_titles = HashSet::new();

        let ctx = FilterContext {
            clock: options.clock(),
            time_machine: options.time_machine.is_some(),
            ignore_filters: options.ignore_filters,
            record_types: &effective.record_types,
            release_max_age: self.config.release_max_age,
            exclusions: &self.config.exclusions,
            new_entity,
            explicit_titles: &no_titles,
        };

        let mut known = HashSet::new();
        let unseen: Vec<TrackRecord> = record
            .tracks
            .into_iter()
            .filter(|t| !seen.contains(&t.id) && known.insert(t.id))
            .collect();

        for track in &unseen {
            match filter::evaluate_track(&ctx) {
                Disposition::Queue => outcome.queue.push(QueueItem::track(track, &effective)),
                other => debug!("Skipping track {} of {}: {:?}", track.title, playlist.title, other),
            }
        }

        writes.tracks.push((playlist.id, unseen));
        Ok(())
    }

    fn persist(&self, writes: PendingWrites, outcome: &mut RefreshOutcome) -> Res<()> {
        if writes.has_ledger_writes() {
            self.store.begin_transaction()?;
            outcome.releases_recorded = self.store.record_releases(&writes.releases)?;
            outcome.futures_recorded = writes.releases.iter().filter(|e| e.future).count();
            for (playlist_id, tracks) in &writes.tracks {
                outcome.tracks_recorded += self.store.record_playlist_tracks(*playlist_id, tracks)?;
            }
            for (album_id, release_date) in &writes.matured {
                self.store.clear_future_flag(*album_id, release_date)?;
            }
            self.store
                .mark_refreshed(EntityKind::Artist, &writes.first_artists)?;
            self.store
                .mark_refreshed(EntityKind::Playlist, &writes.first_playlists)?;
        }

        self.store
            .clear_pending(EntityKind::Artist, &writes.refreshed_artists)?;
        self.store
            .clear_pending(EntityKind::Playlist, &writes.refreshed_playlists)?;

        outcome.transaction_id = self.store.open_transaction();
        self.store.commit()?;

        if let Some(tid) = outcome.transaction_id {
            info!(
                "Transaction {}: {} releases ({} future, {} matured), {} tracks recorded, {} queued",
                tid,
                outcome.releases_recorded,
                outcome.futures_recorded,
                outcome.futures_matured,
                outcome.tracks_recorded,
                outcome.queue.len()
            );
        }
        Ok(())
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} [{bar:30.blue}] {pos}/{len} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏").progress_chars("=> "));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
