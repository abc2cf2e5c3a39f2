mod common;

use std::sync::{Arc, atomic::Ordering};

use common::{FakeCatalog, artist, config, date, explicit, monitor_artist, playlist, release, track, typed};
use relmon::{
    catalog::{CatalogClient, CatalogError},
    config::Config,
    management::{ReleaseEntry, SqliteStore},
    refresh::{RefreshEngine, RefreshOptions, RefreshOutcome, RefreshTarget, queue::QueueIdentity},
    types::{EntityKind, EntityOverrides, RecordType, ReleaseRecord},
};

async fn run(
    store: &SqliteStore,
    catalog: &Arc<FakeCatalog>,
    config: &Config,
    options: RefreshOptions,
) -> RefreshOutcome {
    let client: Arc<dyn CatalogClient> = catalog.clone();
    let engine = RefreshEngine::new(store, client, config, store.active_profile().unwrap());
    engine.run(&options).await.unwrap()
}

fn on(today: &str) -> RefreshOptions {
    RefreshOptions {
        today: date(today),
        ..RefreshOptions::default()
    }
}

/// Records `releases` as already seen in their own transaction.
fn seed(store: &SqliteStore, releases: &[ReleaseRecord]) {
    store.begin_transaction().unwrap();
    let entries: Vec<ReleaseEntry> = releases
        .iter()
        .map(|r| ReleaseEntry {
            release: r.clone(),
            future: false,
        })
        .collect();
    store.record_releases(&entries).unwrap();
    store.commit().unwrap();
}

fn queued_albums(outcome: &RefreshOutcome) -> Vec<i64> {
    outcome.queue.iter().filter_map(|item| item.album_id()).collect()
}

#[tokio::test]
async fn test_only_unseen_matching_release_is_queued() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[("RELMON_RECORD_TYPES", "album"), ("RELMON_ALERTS", "true")]);

    let band = artist(1, "Band");
    monitor_artist(&store, &band);
    seed(&store, &[release(100, 1, "First", "2023-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(100, 1, "First", "2023-01-01"),
            release(101, 1, "Second", "2023-06-01"),
        ],
    );

    let outcome = run(&store, &catalog, &config, on("2024-01-01")).await;

    assert_eq!(queued_albums(&outcome), vec![101]);
    assert_eq!(outcome.releases_recorded, 1);
    assert!(outcome.transaction_id.is_some());
    let groups = outcome.digest.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].release_date, "2023-06-01");
    assert_eq!(groups[0].entries[0].album, "Second");
    assert!(!store.is_pending(EntityKind::Artist, 1).unwrap());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Band"));
    seed(&store, &[release(100, 1, "First", "2023-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(100, 1, "First", "2023-01-01"),
            release(101, 1, "Second", "2023-06-01"),
        ],
    );

    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert_eq!(first.queue.len(), 1);
    let transactions = store.recent_transactions(10).unwrap().len();

    let second = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(second.queue.is_empty());
    assert_eq!(second.releases_recorded, 0);
    assert_eq!(second.transaction_id, None);
    assert!(second.selected.unwrap().full_refresh);
    assert_eq!(store.recent_transactions(10).unwrap().len(), transactions);
}

#[tokio::test]
async fn test_nothing_monitored_selects_nothing() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();

    let outcome = run(&store, &catalog, &config(&[]), on("2024-01-01")).await;

    assert!(outcome.selected.is_none());
    assert_eq!(catalog.release_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_new_artist_back_catalog_is_recorded_not_queued() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Prolific"));
    let releases: Vec<ReleaseRecord> = (0..10)
        .map(|i| release(200 + i, 1, &format!("Album {i}"), &format!("2020-0{}-01", i % 9 + 1)))
        .collect();
    catalog.set_releases(1, releases);

    let outcome = run(&store, &catalog, &config, on("2024-01-01")).await;

    assert!(outcome.queue.is_empty());
    assert_eq!(outcome.releases_recorded, 10);
    assert_eq!(store.get_seen_release_ids(1).unwrap().len(), 10);
}

#[tokio::test]
async fn test_bulk_download_queues_back_catalog() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[("RELMON_RECORD_TYPES", "album"), ("RELMON_RELEASE_MAX_AGE", "30")]);

    monitor_artist(&store, &artist(1, "Catch Up"));
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "Old", "2001-01-01"),
            typed(release(2, 1, "Single", "2002-01-01"), RecordType::Single),
            release(3, 1, "Soon", "2030-01-01"),
        ],
    );

    let options = RefreshOptions {
        ignore_filters: true,
        ..on("2024-01-01")
    };
    let outcome = run(&store, &catalog, &config, options).await;

    assert_eq!(queued_albums(&outcome), vec![1, 2]);
    assert_eq!(outcome.futures_recorded, 1);
}

#[tokio::test]
async fn test_explicit_version_wins() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Loud"));
    seed(&store, &[release(1, 1, "Debut", "2020-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "Debut", "2020-01-01"),
            release(10, 1, "Twin", "2023-06-01"),
            explicit(release(11, 1, "Twin", "2023-06-01")),
        ],
    );

    let outcome = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert_eq!(queued_albums(&outcome), vec![11]);
    // the clean twin is still recorded as seen
    assert!(store.get_seen_release_ids(1).unwrap().contains(&10));
}

#[tokio::test]
async fn test_explicit_version_wins_in_bulk_mode() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();

    monitor_artist(&store, &artist(1, "Loud"));
    catalog.set_releases(
        1,
        vec![
            release(10, 1, "Twin", "2023-06-01"),
            explicit(release(11, 1, "Twin", "2023-06-01")),
        ],
    );

    let options = RefreshOptions {
        ignore_filters: true,
        ..on("2024-01-01")
    };
    let outcome = run(&store, &catalog, &config(&[]), options).await;
    assert_eq!(queued_albums(&outcome), vec![11]);
}

#[tokio::test]
async fn test_future_release_matures() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[("RELMON_ALERTS", "true")]);

    monitor_artist(&store, &artist(1, "Patient"));
    seed(&store, &[release(1, 1, "Known", "2020-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "Known", "2020-01-01"),
            release(2, 1, "Announced", "2024-02-01"),
        ],
    );

    let before = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(before.queue.is_empty());
    assert!(before.digest.is_empty());
    assert_eq!(before.futures_recorded, 1);
    assert!(store.get_future_release_ids(1).unwrap().contains(&2));

    let still_waiting = run(&store, &catalog, &config, on("2024-01-15")).await;
    assert!(still_waiting.queue.is_empty());
    assert_eq!(still_waiting.transaction_id, None);

    let after = run(&store, &catalog, &config, on("2024-02-01")).await;
    assert_eq!(queued_albums(&after), vec![2]);
    assert_eq!(after.futures_matured, 1);
    assert_eq!(after.digest.len(), 1);
    assert!(store.get_future_release_ids(1).unwrap().is_empty());

    let done = run(&store, &catalog, &config, on("2024-03-01")).await;
    assert!(done.queue.is_empty());
}

#[tokio::test]
async fn test_monitor_then_rollback_forgets_everything() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "One", "2021-01-01"),
            release(2, 1, "Two", "2022-01-01"),
        ],
    );

    let tid = store.begin_transaction().unwrap();
    store
        .add_artist(&artist(1, "Brief"), &EntityOverrides::default())
        .unwrap();
    let options = RefreshOptions {
        target: RefreshTarget::Explicit {
            artist_ids: vec![1],
            playlist_ids: vec![],
        },
        ..on("2024-01-01")
    };
    let outcome = run(&store, &catalog, &config, options).await;
    assert_eq!(outcome.transaction_id, Some(tid));
    store.commit().unwrap();

    let report = store.rollback(tid).unwrap();
    assert_eq!(report.artists, 1);
    assert_eq!(report.releases, 2);
    assert!(store.get_artists().unwrap().is_empty());
    assert!(store.get_seen_release_ids(1).unwrap().is_empty());
    assert!(store.recent_transactions(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_rolled_back_refresh_is_queued_again() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Again"));
    seed(&store, &[release(1, 1, "Old", "2020-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "Old", "2020-01-01"),
            release(2, 1, "New", "2023-06-01"),
        ],
    );

    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert_eq!(queued_albums(&first), vec![2]);

    store.rollback(first.transaction_id.unwrap()).unwrap();
    assert!(store.is_pending(EntityKind::Artist, 1).unwrap());

    let replay = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(!replay.selected.as_ref().unwrap().full_refresh);
    assert_eq!(queued_albums(&replay), vec![2]);
}

#[tokio::test]
async fn test_failed_fetch_is_isolated() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Broken"));
    monitor_artist(&store, &artist(2, "Fine"));
    seed(&store, &[release(20, 2, "Old", "2020-01-01")]);
    catalog.fail_releases(1, CatalogError::Network("connection reset".to_string()));
    catalog.set_releases(
        2,
        vec![
            release(20, 2, "Old", "2020-01-01"),
            release(21, 2, "New", "2023-06-01"),
        ],
    );

    let outcome = run(&store, &catalog, &config, on("2024-01-01")).await;

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].id, 1);
    assert_eq!(outcome.failures[0].kind, EntityKind::Artist);
    assert_eq!(queued_albums(&outcome), vec![21]);
    assert!(store.is_pending(EntityKind::Artist, 1).unwrap());
    assert!(!store.is_pending(EntityKind::Artist, 2).unwrap());
}

#[tokio::test]
async fn test_time_machine_replays_history() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Replay"));
    catalog.set_releases(
        1,
        vec![
            release(100, 1, "Early", "2023-01-01"),
            release(101, 1, "Late", "2023-06-01"),
        ],
    );

    // a new artist is not suppressed under the time machine
    let options = RefreshOptions {
        time_machine: Some(date("2023-03-01")),
        ..on("2024-01-01")
    };
    let outcome = run(&store, &catalog, &config, options.clone()).await;
    assert_eq!(queued_albums(&outcome), vec![100]);
    assert_eq!(outcome.futures_recorded, 1);

    // moving the clock forward matures the later release
    let forward = RefreshOptions {
        time_machine: Some(date("2023-07-01")),
        ..on("2024-01-01")
    };
    let outcome = run(&store, &catalog, &config, forward).await;
    assert_eq!(queued_albums(&outcome), vec![101]);
    assert_eq!(outcome.futures_matured, 1);

    // going back forgets what came after
    let outcome = run(&store, &catalog, &config, options).await;
    assert_eq!(outcome.releases_discarded, 1);
    assert!(outcome.queue.is_empty());
    assert_eq!(outcome.futures_recorded, 1);
    assert_eq!(store.get_seen_release_ids(1).unwrap().len(), 2);
}

#[tokio::test]
async fn test_explicit_target_skips_unmonitored() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    monitor_artist(&store, &artist(1, "Known"));
    monitor_artist(&store, &artist(2, "Other"));

    let options = RefreshOptions {
        target: RefreshTarget::Explicit {
            artist_ids: vec![1, 99],
            playlist_ids: vec![],
        },
        ..on("2024-01-01")
    };
    let outcome = run(&store, &catalog, &config(&[]), options).await;

    assert_eq!(outcome.selected.unwrap().artists, 1);
    assert_eq!(catalog.release_calls.load(Ordering::SeqCst), 1);
    assert!(store.is_pending(EntityKind::Artist, 2).unwrap());
}

#[tokio::test]
async fn test_artist_overrides_apply() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[("RELMON_RECORD_TYPES", "album")]);

    store.begin_transaction().unwrap();
    store
        .add_artist(
            &artist(1, "Singles Only"),
            &EntityOverrides {
                record_type: Some("single".parse().unwrap()),
                alerts: Some(true),
                download_path: Some("/srv/singles".to_string()),
                ..EntityOverrides::default()
            },
        )
        .unwrap();
    store.commit().unwrap();
    seed(&store, &[release(1, 1, "Seed", "2020-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "Seed", "2020-01-01"),
            release(2, 1, "Album", "2023-06-01"),
            typed(release(3, 1, "Single", "2023-06-01"), RecordType::Single),
        ],
    );

    let outcome = run(&store, &catalog, &config, on("2024-01-01")).await;

    assert_eq!(queued_albums(&outcome), vec![3]);
    assert_eq!(
        outcome.queue[0].download_path().display().to_string(),
        "/srv/singles"
    );
    assert_eq!(outcome.digest.len(), 1);
}

#[tokio::test]
async fn test_digest_skips_artists_without_alerts() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();

    monitor_artist(&store, &artist(1, "Quiet"));
    seed(&store, &[release(1, 1, "Seed", "2020-01-01")]);
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "Seed", "2020-01-01"),
            release(2, 1, "New", "2023-06-01"),
        ],
    );

    let outcome = run(&store, &catalog, &config(&[]), on("2024-01-01")).await;
    assert_eq!(outcome.queue.len(), 1);
    assert!(outcome.digest.is_empty());
}

#[tokio::test]
async fn test_playlist_tracks() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    let mix = playlist(7, "Mix", vec![track(1, "One"), track(2, "Two")]);
    catalog.set_playlist(mix.clone());
    store.begin_transaction().unwrap();
    store.add_playlist(&mix, &EntityOverrides::default()).unwrap();
    store.commit().unwrap();

    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(first.queue.is_empty());
    assert_eq!(first.tracks_recorded, 2);

    catalog.set_playlist(playlist(
        7,
        "Mix",
        vec![track(1, "One"), track(2, "Two"), track(3, "Three"), track(3, "Three")],
    ));
    let second = run(&store, &catalog, &config, on("2024-01-02")).await;
    assert_eq!(second.tracks_recorded, 1);
    assert_eq!(second.queue.len(), 1);
    assert_eq!(second.queue[0].identity(), QueueIdentity::Track);
    assert_eq!(second.queue[0].track_id(), Some(3));
    assert_eq!(store.get_seen_tracks(7).unwrap().len(), 3);
}

#[tokio::test]
async fn test_shared_album_is_queued_once() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Alpha"));
    monitor_artist(&store, &artist(2, "Beta"));
    seed(
        &store,
        &[release(10, 1, "Alpha Old", "2020-01-01"), release(20, 2, "Beta Old", "2020-01-01")],
    );
    catalog.set_releases(
        1,
        vec![
            release(10, 1, "Alpha Old", "2020-01-01"),
            release(500, 1, "Together", "2023-06-01"),
        ],
    );
    catalog.set_releases(
        2,
        vec![
            release(20, 2, "Beta Old", "2020-01-01"),
            release(500, 2, "Together", "2023-06-01"),
        ],
    );

    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert_eq!(queued_albums(&first), vec![500]);
    assert_eq!(first.releases_recorded, 1);

    let second = run(&store, &catalog, &config, on("2024-01-02")).await;
    assert!(second.queue.is_empty());
    assert_eq!(second.transaction_id, None);

    let third = run(&store, &catalog, &config, on("2024-01-03")).await;
    assert!(third.queue.is_empty());
}

#[tokio::test]
async fn test_first_release_of_empty_artist_is_queued() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Debutant"));
    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(first.queue.is_empty());
    // the first refresh is recorded even though nothing was found
    assert!(first.transaction_id.is_some());
    assert!(store.has_been_refreshed(EntityKind::Artist, 1).unwrap());

    catalog.set_releases(1, vec![release(700, 1, "Debut", "2024-02-01")]);
    let later = run(&store, &catalog, &config, on("2024-02-02")).await;
    assert_eq!(queued_albums(&later), vec![700]);
}

#[tokio::test]
async fn test_first_track_of_empty_playlist_is_queued() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    let empty = playlist(7, "Fresh Mix", vec![]);
    catalog.set_playlist(empty.clone());
    store.begin_transaction().unwrap();
    store.add_playlist(&empty, &EntityOverrides::default()).unwrap();
    store.commit().unwrap();

    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(first.queue.is_empty());

    catalog.set_playlist(playlist(7, "Fresh Mix", vec![track(1, "Opener")]));
    let later = run(&store, &catalog, &config, on("2024-01-02")).await;
    assert_eq!(later.queue.len(), 1);
    assert_eq!(later.queue[0].track_id(), Some(1));
}

#[tokio::test]
async fn test_rolled_back_first_refresh_suppresses_again() {
    let store = SqliteStore::open_in_memory().unwrap();
    let catalog = FakeCatalog::new();
    let config = config(&[]);

    monitor_artist(&store, &artist(1, "Undone"));
    catalog.set_releases(
        1,
        vec![
            release(1, 1, "One", "2023-10-01"),
            release(2, 1, "Two", "2023-12-01"),
        ],
    );

    let first = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(first.queue.is_empty());
    assert_eq!(first.releases_recorded, 2);

    store.rollback(first.transaction_id.unwrap()).unwrap();
    assert!(!store.has_been_refreshed(EntityKind::Artist, 1).unwrap());

    let replay = run(&store, &catalog, &config, on("2024-01-01")).await;
    assert!(replay.queue.is_empty());
    assert_eq!(replay.releases_recorded, 2);
}
