use chrono::{Datelike, NaiveDate};
use relmon::error::ConfigError;
use relmon::types::{RecordType, ReleaseRecord, ReleaseTableRow};
use relmon::utils::*;

// Helper function to create a test release
fn create_test_release(id: i64, title: &str, release_date: &str) -> ReleaseRecord {
    ReleaseRecord {
        id,
        artist_id: 1,
        artist_name: "Test Artist".to_string(),
        title: title.to_string(),
        release_date: release_date.to_string(),
        record_type: RecordType::Album,
        explicit: false,
        cover_url: None,
        link: format!("https://www.deezer.com/album/{id}"),
        track_count: None,
    }
}

// Helper function to create a test release table row
fn create_test_release_row(date: &str, title: &str, artist: &str) -> ReleaseTableRow {
    ReleaseTableRow {
        date: date.to_string(),
        artist: artist.to_string(),
        title: title.to_string(),
        record_type: "album".to_string(),
        explicit: "no".to_string(),
    }
}

#[test]
fn test_parse_date() {
    let date = parse_date("2024-02-29").unwrap();
    assert_eq!((date.year(), date.month(), date.day()), (2024, 2, 29));

    // Surrounding whitespace is accepted
    assert!(parse_date(" 2024-01-01 ").is_ok());

    assert_eq!(
        parse_date("2023-02-29"),
        Err(ConfigError::InvalidDate("2023-02-29".to_string()))
    );
    assert!(parse_date("01/02/2024").is_err());
    assert!(parse_date("").is_err());
}

#[test]
fn test_parse_release_date() {
    assert_eq!(
        parse_release_date("2023-06-01"),
        NaiveDate::from_ymd_opt(2023, 6, 1)
    );

    // The catalog uses zeros for unknown dates
    assert_eq!(parse_release_date("0000-00-00"), None);
    assert_eq!(parse_release_date("2023"), None);
}

#[test]
fn test_format_timestamp() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20");
}

#[test]
fn test_today_matches_timestamp() {
    let today = today();
    let from_timestamp = chrono::DateTime::from_timestamp(now_timestamp(), 0)
        .unwrap()
        .date_naive();

    // Allow for a run crossing midnight
    assert!((from_timestamp - today).num_days().abs() <= 1);
}

#[test]
fn test_remove_duplicate_releases() {
    let mut releases = vec![
        create_test_release(1, "First", "2023-01-01"),
        create_test_release(2, "Second", "2023-02-01"),
        create_test_release(1, "First again", "2023-01-01"),
        create_test_release(3, "Third", "2023-03-01"),
    ];

    remove_duplicate_releases(&mut releases);

    assert_eq!(releases.len(), 3);
    // First occurrence wins and order is kept
    assert_eq!(releases[0].title, "First");
    assert_eq!(
        releases.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn test_remove_duplicate_releases_empty() {
    let mut releases: Vec<ReleaseRecord> = Vec::new();
    remove_duplicate_releases(&mut releases);
    assert!(releases.is_empty());
}

#[test]
fn test_sort_release_table_rows() {
    let mut rows = vec![
        create_test_release_row("2023-01-01", "Old", "Zeta"),
        create_test_release_row("2023-06-01", "New B", "Beta"),
        create_test_release_row("2023-06-01", "New A", "Alpha"),
    ];

    sort_release_table_rows(&mut rows);

    // Newest date first, then artist ascending
    let order: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(order, vec!["New A", "New B", "Old"]);
}

#[test]
fn test_yes_no_and_dash() {
    assert_eq!(yes_no(Some(true)), "yes");
    assert_eq!(yes_no(Some(false)), "no");
    assert_eq!(yes_no(None), "-");

    assert_eq!(or_dash(Some(320)), "320");
    assert_eq!(or_dash(None::<String>), "-");
}
