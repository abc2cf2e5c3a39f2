mod common;

use std::path::PathBuf;

use common::config;
use relmon::{
    config::{ANONYMOUS_POOL_SIZE, AUTHENTICATED_POOL_SIZE, Config, failed_audit_path, queue_audit_path},
    error::ConfigError,
    types::{Bitrate, MonitoredArtist, MonitoredPlaylist, Profile, RecordType, RecordTypeFilter},
};

fn lookup(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let owned: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(move |key| {
        owned
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
}

fn monitored_artist(overrides: impl FnOnce(&mut MonitoredArtist)) -> MonitoredArtist {
    let mut artist = MonitoredArtist {
        id: 1,
        name: "Band".to_string(),
        bitrate: None,
        record_type: None,
        alerts: None,
        download_path: None,
        profile_id: 1,
        trans_id: 1,
    };
    overrides(&mut artist);
    artist
}

#[test]
fn test_defaults() {
    let config = config(&[("RELMON_DATA_DIR", "/data")]);

    assert_eq!(config.data_dir, PathBuf::from("/data"));
    assert_eq!(config.db_path(), PathBuf::from("/data/relmon.db").as_path());
    assert_eq!(config.api_url, "https://api.deezer.com");
    assert_eq!(config.bitrate, Bitrate::Mp3_320);
    assert_eq!(config.record_types, RecordTypeFilter::All);
    assert_eq!(config.release_max_age, None);
    assert!(!config.alerts);
    assert!(!config.exclusions.enabled);
    assert_eq!(config.query_limit, 5);
    assert_eq!(config.downloader, None);
    assert_eq!(queue_audit_path(&config), PathBuf::from("/data/queue.csv"));
    assert_eq!(failed_audit_path(&config), PathBuf::from("/data/failed.csv"));
}

#[test]
fn test_values_are_parsed() {
    let config = config(&[
        ("RELMON_BITRATE", "flac"),
        ("RELMON_RECORD_TYPES", "album, ep"),
        ("RELMON_RELEASE_MAX_AGE", "90"),
        ("RELMON_ALERTS", "yes"),
        ("RELMON_API_URL", "http://localhost:8080/"),
        ("RELMON_DB_PATH", "/elsewhere/monitor.db"),
        ("RELMON_EXCLUSIONS", "on"),
        ("RELMON_EXCLUDE_KEYWORDS", "live, remix"),
        ("RELMON_EXCLUDE_PATTERNS", r"\(Demo\);\[Instrumental\]"),
    ]);

    assert_eq!(config.bitrate, Bitrate::Flac);
    assert!(config.record_types.allows(RecordType::Ep));
    assert!(!config.record_types.allows(RecordType::Single));
    assert_eq!(config.release_max_age, Some(90));
    assert!(config.alerts);
    assert_eq!(config.api_url, "http://localhost:8080");
    assert_eq!(config.db_path(), PathBuf::from("/elsewhere/monitor.db").as_path());
    assert_eq!(config.exclusions.matching_rule("Live in Paris"), Some("live"));
    assert_eq!(
        config.exclusions.matching_rule("Song [Instrumental]"),
        Some(r"\[Instrumental\]")
    );
    assert_eq!(config.exclusions.matching_rule("Song"), None);
}

#[test]
fn test_zero_max_age_disables_gate() {
    let config = config(&[("RELMON_RELEASE_MAX_AGE", "0")]);
    assert_eq!(config.release_max_age, None);
}

#[test]
fn test_empty_values_count_as_unset() {
    let config = config(&[("RELMON_BITRATE", "  "), ("RELMON_ARL", "")]);
    assert_eq!(config.bitrate, Bitrate::Mp3_320);
    assert!(!config.is_authenticated());
}

#[test]
fn test_invalid_values_are_rejected() {
    assert_eq!(
        lookup(&[("RELMON_BITRATE", "256")]).unwrap_err(),
        ConfigError::InvalidBitrate("256".to_string())
    );
    assert!(matches!(
        lookup(&[("RELMON_RECORD_TYPES", "album,mixtape")]),
        Err(ConfigError::InvalidRecordType(_))
    ));
    assert!(matches!(
        lookup(&[("RELMON_RELEASE_MAX_AGE", "-3")]),
        Err(ConfigError::InvalidNumber { .. })
    ));
    assert!(matches!(
        lookup(&[("RELMON_ALERTS", "maybe")]),
        Err(ConfigError::InvalidBool { .. })
    ));
    assert!(matches!(
        lookup(&[("RELMON_EXCLUDE_PATTERNS", "(unclosed")]),
        Err(ConfigError::InvalidPattern { .. })
    ));
}

#[test]
fn test_fetch_pool_size() {
    assert_eq!(config(&[]).fetch_pool_size(), ANONYMOUS_POOL_SIZE);
    assert_eq!(
        config(&[("RELMON_ARL", "cookie")]).fetch_pool_size(),
        AUTHENTICATED_POOL_SIZE
    );
    assert_eq!(
        config(&[("RELMON_ARL", "cookie"), ("RELMON_FETCH_THREADS", "8")]).fetch_pool_size(),
        8
    );
}

#[test]
fn test_resolution_order() {
    let config = config(&[("RELMON_BITRATE", "128"), ("RELMON_DOWNLOAD_PATH", "/global")]);
    let profile = Profile {
        id: 1,
        name: "default".to_string(),
        bitrate: Some(Bitrate::Mp3_320),
        alerts: Some(true),
        ..Profile::default()
    };

    let inherited = config.resolve_artist(&profile, &monitored_artist(|_| {}));
    assert_eq!(inherited.bitrate, Bitrate::Mp3_320);
    assert_eq!(inherited.download_path, PathBuf::from("/global"));
    assert!(inherited.alerts);

    let overridden = config.resolve_artist(
        &profile,
        &monitored_artist(|a| {
            a.bitrate = Some(Bitrate::Flac);
            a.alerts = Some(false);
            a.record_type = Some(RecordTypeFilter::Only([RecordType::Single].into()));
            a.download_path = Some("/artist".to_string());
        }),
    );
    assert_eq!(overridden.bitrate, Bitrate::Flac);
    assert!(!overridden.alerts);
    assert!(!overridden.record_types.allows(RecordType::Album));
    assert_eq!(overridden.download_path, PathBuf::from("/artist"));

    let playlist = MonitoredPlaylist {
        id: 7,
        title: "Mix".to_string(),
        url: "https://www.deezer.com/playlist/7".to_string(),
        bitrate: None,
        alerts: None,
        download_path: Some("/lists".to_string()),
        profile_id: 1,
        trans_id: 1,
    };
    let resolved = config.resolve_playlist(&profile, &playlist);
    assert_eq!(resolved.bitrate, Bitrate::Mp3_320);
    assert_eq!(resolved.download_path, PathBuf::from("/lists"));

    assert_eq!(config.resolve_profile(&Profile::default()).bitrate, Bitrate::Mp3_128);
}

#[test]
fn test_record_type_filter_parsing() {
    assert_eq!("all".parse::<RecordTypeFilter>().unwrap(), RecordTypeFilter::All);
    assert_eq!(
        "album,ep,single,compilation".parse::<RecordTypeFilter>().unwrap(),
        RecordTypeFilter::All
    );
    assert_eq!(
        "Single".parse::<RecordTypeFilter>().unwrap().to_string(),
        "single"
    );
    assert!(",".parse::<RecordTypeFilter>().is_err());
}

#[test]
fn test_bitrate_codes() {
    for bitrate in [Bitrate::Mp3_128, Bitrate::Mp3_320, Bitrate::Flac] {
        assert_eq!(Bitrate::from_code(bitrate.code()), Some(bitrate));
        assert_eq!(bitrate.to_string().parse::<Bitrate>().unwrap(), bitrate);
    }
    assert_eq!(Bitrate::from_code(2), None);
}
