//! Configuration management for the release monitor.
//!
//! Configuration values come from environment variables and an optional
//! `.env` file in the local data directory. They are read exactly once into an
//! immutable [`Config`] snapshot that is passed to the refresh engine and the
//! filter pipeline. Nothing reads the environment after start-up.
//!
//! Settings are layered:
//! 1. Per-artist / per-playlist overrides stored in the database (highest priority)
//! 2. Active profile values stored in the database
//! 3. The global [`Config`] built from the environment
//!
//! [`Config::resolve_artist`] and [`Config::resolve_playlist`] flatten these
//! layers into an [`EffectiveConfig`] once per entity.

use std::{
    env,
    path::{Path, PathBuf},
};

use regex::Regex;

use crate::{
    Res,
    error::ConfigError,
    types::{Bitrate, MonitoredArtist, MonitoredPlaylist, Profile, RecordTypeFilter},
};

/// Concurrent fetches allowed without a catalog credential.
pub const ANONYMOUS_POOL_SIZE: usize = 2;
/// Concurrent fetches allowed with a catalog credential.
pub const AUTHENTICATED_POOL_SIZE: usize = 50;

const DEFAULT_API_URL: &str = "https://api.deezer.com";
const DEFAULT_QUERY_LIMIT: u32 = 5;
const DEFAULT_ROLLBACK_VIEW_LIMIT: usize = 10;

/// Returns the directory holding the database, `.env`, audit files and backups.
///
/// `RELMON_DATA_DIR` wins; otherwise the platform-specific local data directory:
/// - Linux: `~/.local/share/relmon`
/// - macOS: `~/Library/Application Support/relmon`
/// - Windows: `%LOCALAPPDATA%/relmon`
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = env::var("RELMON_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("relmon");
    path
}

/// Loads environment variables from `<data_dir>/.env`.
///
/// Creates the data directory if needed. A missing `.env` file is not an
/// error: every setting has a default or can come from the real environment.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created.
pub async fn load_env() -> Res<()> {
    let dir = data_dir();
    async_fs::create_dir_all(&dir).await?;

    let path = dir.join(".env");
    if path.is_file() {
        if let Err(e) = dotenv::from_path(&path) {
            tracing::warn!("Cannot parse {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// Title exclusions, compiled once.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    pub enabled: bool,
    rules: Vec<(String, Regex)>,
}

impl Exclusions {
    /// Builds keyword rules (case-insensitive whole-word match) and raw regex
    /// pattern rules.
    pub fn new(enabled: bool, keywords: &[String], patterns: &[String]) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(keywords.len() + patterns.len());

        for keyword in keywords.iter().filter(|k| !k.trim().is_empty()) {
            let source = format!(r"(?i)\b{}\b", regex::escape(keyword.trim()));
            let regex = Regex::new(&source).map_err(|e| ConfigError::InvalidPattern {
                pattern: keyword.clone(),
                reason: e.to_string(),
            })?;
            rules.push((keyword.trim().to_string(), regex));
        }

        for pattern in patterns.iter().filter(|p| !p.trim().is_empty()) {
            let regex = Regex::new(pattern.trim()).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            rules.push((pattern.trim().to_string(), regex));
        }

        Ok(Self { enabled, rules })
    }

    /// Returns the first rule matching `title`, if exclusions are enabled.
    pub fn matching_rule(&self, title: &str) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.rules
            .iter()
            .find(|(_, regex)| regex.is_match(title))
            .map(|(label, _)| label.as_str())
    }
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub api_url: String,
    pub arl: Option<String>,
    pub fetch_threads: Option<usize>,
    pub bitrate: Bitrate,
    pub record_types: RecordTypeFilter,
    /// `None` disables the age gate.
    pub release_max_age: Option<u32>,
    pub download_path: PathBuf,
    pub alerts: bool,
    pub email: Option<String>,
    pub query_limit: u32,
    pub pick_first: bool,
    pub rollback_view_limit: usize,
    pub exclusions: Exclusions,
    pub downloader: Option<PathBuf>,
}

/// Settings for one artist or playlist after applying overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub bitrate: Bitrate,
    pub record_types: RecordTypeFilter,
    pub download_path: PathBuf,
    pub alerts: bool,
}

impl Config {
    /// Builds the snapshot from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the snapshot from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("RELMON_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(data_dir);
        let db_path = get("RELMON_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("relmon.db"));

        let bitrate = match get("RELMON_BITRATE") {
            Some(v) => v.parse()?,
            None => Bitrate::Mp3_320,
        };
        let record_types = match get("RELMON_RECORD_TYPES") {
            Some(v) => v.parse()?,
            None => RecordTypeFilter::All,
        };
        let release_max_age = match parse_number::<u32>("RELMON_RELEASE_MAX_AGE", get("RELMON_RELEASE_MAX_AGE"))? {
            Some(0) | None => None,
            Some(days) => Some(days),
        };
        let fetch_threads = parse_number::<usize>("RELMON_FETCH_THREADS", get("RELMON_FETCH_THREADS"))?
            .filter(|n| *n > 0);

        let download_path = get("RELMON_DOWNLOAD_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::audio_dir()
                    .unwrap_or_else(|| data_dir.join("downloads"))
                    .join("relmon")
            });

        let keywords = split_list(get("RELMON_EXCLUDE_KEYWORDS"), ',');
        let patterns = split_list(get("RELMON_EXCLUDE_PATTERNS"), ';');
        let exclusions = Exclusions::new(
            parse_bool("RELMON_EXCLUSIONS", get("RELMON_EXCLUSIONS"))?.unwrap_or(false),
            &keywords,
            &patterns,
        )?;

        Ok(Self {
            api_url: get("RELMON_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            arl: get("RELMON_ARL"),
            fetch_threads,
            bitrate,
            record_types,
            release_max_age,
            download_path,
            alerts: parse_bool("RELMON_ALERTS", get("RELMON_ALERTS"))?.unwrap_or(false),
            email: get("RELMON_EMAIL"),
            query_limit: parse_number("RELMON_QUERY_LIMIT", get("RELMON_QUERY_LIMIT"))?
                .unwrap_or(DEFAULT_QUERY_LIMIT),
            pick_first: parse_bool("RELMON_PICK_FIRST", get("RELMON_PICK_FIRST"))?.unwrap_or(false),
            rollback_view_limit: parse_number("RELMON_ROLLBACK_VIEW_LIMIT", get("RELMON_ROLLBACK_VIEW_LIMIT"))?
                .unwrap_or(DEFAULT_ROLLBACK_VIEW_LIMIT),
            exclusions,
            downloader: get("RELMON_DOWNLOADER").map(PathBuf::from),
            data_dir,
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_authenticated(&self) -> bool {
        self.arl.is_some()
    }

    /// Size of the fetch worker pool.
    pub fn fetch_pool_size(&self) -> usize {
        match self.fetch_threads {
            Some(n) => n,
            None if self.is_authenticated() => AUTHENTICATED_POOL_SIZE,
            None => ANONYMOUS_POOL_SIZE,
        }
    }

    /// Effective settings of the active profile, used for manual downloads.
    pub fn resolve_profile(&self, profile: &Profile) -> EffectiveConfig {
        EffectiveConfig {
            bitrate: profile.bitrate.unwrap_or(self.bitrate),
            record_types: profile
                .record_type
                .clone()
                .unwrap_or_else(|| self.record_types.clone()),
            download_path: profile
                .download_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.download_path.clone()),
            alerts: profile.alerts.unwrap_or(self.alerts),
        }
    }

    pub fn resolve_artist(&self, profile: &Profile, artist: &MonitoredArtist) -> EffectiveConfig {
        let base = self.resolve_profile(profile);
        EffectiveConfig {
            bitrate: artist.bitrate.unwrap_or(base.bitrate),
            record_types: artist.record_type.clone().unwrap_or(base.record_types),
            download_path: artist
                .download_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or(base.download_path),
            alerts: artist.alerts.unwrap_or(base.alerts),
        }
    }

    pub fn resolve_playlist(&self, profile: &Profile, playlist: &MonitoredPlaylist) -> EffectiveConfig {
        let base = self.resolve_profile(profile);
        EffectiveConfig {
            bitrate: playlist.bitrate.unwrap_or(base.bitrate),
            record_types: base.record_types,
            download_path: playlist
                .download_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or(base.download_path),
            alerts: playlist.alerts.unwrap_or(base.alerts),
        }
    }
}

/// Path of the CSV audit trail of every queued item.
pub fn queue_audit_path(config: &Config) -> PathBuf {
    config.data_dir.join("queue.csv")
}

/// Path of the CSV audit trail of failed downloads.
pub fn failed_audit_path(config: &Config) -> PathBuf {
    config.data_dir.join("failed.csv")
}

pub fn parse_bool(key: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) => match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: v,
            }),
        },
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value: v.clone(),
            })
        })
        .transpose()
}

fn split_list(value: Option<String>, separator: char) -> Vec<String> {
    value
        .map(|v| {
            v.split(separator)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
