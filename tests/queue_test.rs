mod common;

use std::path::PathBuf;

use common::{artist, playlist, release, track};
use relmon::{
    config::EffectiveConfig,
    error::QueueError,
    refresh::queue::{Digest, QueueIdentity, QueueItem, QueueRecord},
    types::{Bitrate, RecordTypeFilter},
};

fn effective() -> EffectiveConfig {
    EffectiveConfig {
        bitrate: Bitrate::Flac,
        record_types: RecordTypeFilter::All,
        download_path: PathBuf::from("/music"),
        alerts: true,
    }
}

fn album_record() -> QueueRecord {
    QueueRecord::from(&QueueItem::album(&release(10, 1, "Record", "2023-01-01"), &effective()))
}

#[test]
fn test_constructors_set_one_identity() {
    let config = effective();

    let album = QueueItem::album(&release(10, 1, "Record", "2023-01-01"), &config);
    assert_eq!(album.identity(), QueueIdentity::Album);
    assert_eq!(album.album_id(), Some(10));
    assert_eq!(album.label(), "Artist 1 - Record");
    assert_eq!(album.bitrate(), Bitrate::Flac);
    assert_eq!(album.download_path(), &PathBuf::from("/music"));

    let whole = QueueItem::artist(&artist(1, "Band"), &config);
    assert_eq!(whole.identity(), QueueIdentity::Artist);
    assert_eq!(whole.label(), "Band (discography)");
    assert_eq!(whole.url(), "https://www.deezer.com/artist/1");

    let single = QueueItem::track(&track(5, "Song"), &config);
    assert_eq!(single.identity(), QueueIdentity::Track);
    assert_eq!(single.track_id(), Some(5));
    assert_eq!(single.artist_name(), "Track Artist 5");

    let list = QueueItem::playlist(&playlist(7, "Mix", vec![]), &config);
    assert_eq!(list.identity(), QueueIdentity::Playlist);
    assert_eq!(list.label(), "Playlist Mix");
}

#[test]
fn test_record_converts_back_to_item() {
    let item = QueueItem::album(&release(10, 1, "Record", "2023-01-01"), &effective());
    let record = QueueRecord::from(&item);
    assert_eq!(record.bitrate, "flac");

    let back = QueueItem::try_from(record).unwrap();
    assert_eq!(back, item);
}

#[test]
fn test_conflicting_identity_is_rejected() {
    let record = QueueRecord {
        track_id: Some(5),
        track_title: Some("Song".to_string()),
        ..album_record()
    };
    match QueueItem::try_from(record) {
        Err(QueueError::ConflictingIdentity(names)) => assert_eq!(names, "album and track"),
        other => panic!("expected ConflictingIdentity, got {other:?}"),
    }

    let record = QueueRecord {
        playlist_title: Some("Mix".to_string()),
        ..album_record()
    };
    assert!(matches!(
        QueueItem::try_from(record),
        Err(QueueError::ConflictingIdentity(_))
    ));
}

#[test]
fn test_incomplete_records_are_malformed() {
    let half_album = QueueRecord {
        album_title: None,
        ..album_record()
    };
    assert!(matches!(
        QueueItem::try_from(half_album),
        Err(QueueError::Malformed(_))
    ));

    let no_url = QueueRecord {
        url: String::new(),
        ..album_record()
    };
    assert!(matches!(QueueItem::try_from(no_url), Err(QueueError::Malformed(_))));

    let bad_bitrate = QueueRecord {
        bitrate: "256".to_string(),
        ..album_record()
    };
    assert!(matches!(
        QueueItem::try_from(bad_bitrate),
        Err(QueueError::Malformed(_))
    ));

    let nameless_artist = QueueRecord {
        artist_name: " ".to_string(),
        album_id: None,
        album_title: None,
        ..album_record()
    };
    assert!(matches!(
        QueueItem::try_from(nameless_artist),
        Err(QueueError::Malformed(_))
    ));
}

#[test]
fn test_fields_parse_empty_as_none() {
    let fields: Vec<String> = ["Band", "", "", "5", "Song", "", "https://x/5", "320", "/music"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let record = QueueRecord::from_fields(&fields).unwrap();
    assert_eq!(record.album_id, None);
    assert_eq!(record.track_id, Some(5));
    assert_eq!(record.to_fields(), fields);

    let item = QueueItem::try_from(record).unwrap();
    assert_eq!(item.identity(), QueueIdentity::Track);
    assert_eq!(item.bitrate(), Bitrate::Mp3_320);
}

#[test]
fn test_fields_reject_wrong_shape() {
    let short = vec!["Band".to_string()];
    assert!(matches!(
        QueueRecord::from_fields(&short),
        Err(QueueError::Malformed(_))
    ));

    let mut bad_id: Vec<String> = vec![String::new(); QueueRecord::HEADER.len()];
    bad_id[1] = "ten".to_string();
    assert!(matches!(
        QueueRecord::from_fields(&bad_id),
        Err(QueueError::Malformed(_))
    ));
}

#[test]
fn test_digest_groups_newest_first() {
    let mut digest = Digest::new();
    assert!(digest.is_empty());

    digest.push(&release(1, 1, "Older", "2023-01-01"));
    digest.push(&release(2, 2, "Newer B", "2023-06-01"));
    digest.push(&release(3, 3, "Newer A", "2023-06-01"));

    assert_eq!(digest.len(), 3);
    let groups = digest.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].release_date, "2023-06-01");
    assert_eq!(groups[1].release_date, "2023-01-01");

    // insertion order within a date
    let titles: Vec<&str> = groups[0].entries.iter().map(|e| e.album.as_str()).collect();
    assert_eq!(titles, vec!["Newer B", "Newer A"]);

    let entry = &groups[1].entries[0];
    assert_eq!(entry.artist, "Artist 1");
    assert_eq!(entry.track_count, Some(10));
    assert_eq!(entry.cover.as_deref(), Some("https://cdn.example/1.jpg"));
}
