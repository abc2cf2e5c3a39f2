use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::error::ConfigError;

/// Kind of release as classified by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Album,
    Ep,
    Single,
    Compile,
}

impl RecordType {
    pub const ALL: [RecordType; 4] = [
        RecordType::Album,
        RecordType::Ep,
        RecordType::Single,
        RecordType::Compile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Album => "album",
            RecordType::Ep => "ep",
            RecordType::Single => "single",
            RecordType::Compile => "compile",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "album" => Ok(RecordType::Album),
            "ep" => Ok(RecordType::Ep),
            "single" => Ok(RecordType::Single),
            "compile" | "compilation" => Ok(RecordType::Compile),
            other => Err(ConfigError::InvalidRecordType(other.to_string())),
        }
    }
}

/// Allowlist of record types. `All` always passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTypeFilter {
    All,
    Only(BTreeSet<RecordType>),
}

impl RecordTypeFilter {
    pub fn allows(&self, record_type: RecordType) -> bool {
        match self {
            RecordTypeFilter::All => true,
            RecordTypeFilter::Only(types) => types.contains(&record_type),
        }
    }
}

impl Default for RecordTypeFilter {
    fn default() -> Self {
        RecordTypeFilter::All
    }
}

impl fmt::Display for RecordTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordTypeFilter::All => f.write_str("all"),
            RecordTypeFilter::Only(types) => {
                let joined = types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

impl FromStr for RecordTypeFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut types = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(RecordTypeFilter::All);
            }
            types.insert(part.parse::<RecordType>()?);
        }

        if types.is_empty() {
            return Err(ConfigError::InvalidRecordType(s.to_string()));
        }
        if types.len() == RecordType::ALL.len() {
            return Ok(RecordTypeFilter::All);
        }
        Ok(RecordTypeFilter::Only(types))
    }
}

/// Download quality. The numeric code is what the download engine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bitrate {
    Mp3_128,
    Mp3_320,
    Flac,
}

impl Bitrate {
    pub fn code(&self) -> u8 {
        match self {
            Bitrate::Mp3_128 => 1,
            Bitrate::Mp3_320 => 3,
            Bitrate::Flac => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Bitrate::Mp3_128),
            3 => Some(Bitrate::Mp3_320),
            9 => Some(Bitrate::Flac),
            _ => None,
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitrate::Mp3_128 => f.write_str("128"),
            Bitrate::Mp3_320 => f.write_str("320"),
            Bitrate::Flac => f.write_str("flac"),
        }
    }
}

impl FromStr for Bitrate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "128" | "1" => Ok(Bitrate::Mp3_128),
            "320" | "3" => Ok(Bitrate::Mp3_320),
            "flac" | "9" => Ok(Bitrate::Flac),
            other => Err(ConfigError::InvalidBitrate(other.to_string())),
        }
    }
}

// -- catalog records -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub id: i64,
    pub name: String,
    pub link: String,
    pub album_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: i64,
    pub artist_id: i64,
    pub artist_name: String,
    pub title: String,
    /// ISO `YYYY-MM-DD`.
    pub release_date: String,
    pub record_type: RecordType,
    pub explicit: bool,
    pub cover_url: Option<String>,
    pub link: String,
    pub track_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub artist_id: i64,
    pub artist_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub tracks: Vec<TrackRecord>,
}

/// Any record the catalog adapter can resolve from an id or URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRecord {
    Artist(ArtistRecord),
    Release(ReleaseRecord),
    Playlist(PlaylistRecord),
    Track(TrackRecord),
}

// -- persisted entities ----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Artist,
    Playlist,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Playlist => "playlist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredArtist {
    pub id: i64,
    pub name: String,
    pub bitrate: Option<Bitrate>,
    pub record_type: Option<RecordTypeFilter>,
    pub alerts: Option<bool>,
    pub download_path: Option<String>,
    pub profile_id: i64,
    pub trans_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredPlaylist {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub bitrate: Option<Bitrate>,
    pub alerts: Option<bool>,
    pub download_path: Option<String>,
    pub profile_id: i64,
    pub trans_id: i64,
}

/// Per-entity settings supplied by `monitor` flags or `monitor --edit`.
/// `None` leaves a field untouched on edit, and inherits on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityOverrides {
    pub bitrate: Option<Bitrate>,
    pub record_type: Option<RecordTypeFilter>,
    pub alerts: Option<bool>,
    pub download_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRelease {
    pub artist_id: i64,
    pub artist_name: String,
    pub album_id: i64,
    pub title: String,
    pub release_date: String,
    pub explicit: bool,
    pub record_type: RecordType,
    pub added: i64,
    pub future: bool,
    pub trans_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenPlaylistTrack {
    pub playlist_id: i64,
    pub track_id: i64,
    pub artist_id: i64,
    pub artist_name: String,
    pub track_name: String,
    pub added: i64,
    pub trans_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: i64,
    pub timestamp: i64,
    pub profile_id: i64,
}

/// A transaction with the number of rows it tagged, used by `rollback --view`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub transaction: Transaction,
    pub artists: usize,
    pub playlists: usize,
    pub releases: usize,
    pub tracks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub alerts: Option<bool>,
    pub bitrate: Option<Bitrate>,
    pub record_type: Option<RecordTypeFilter>,
    pub download_path: Option<String>,
    pub plex_base_url: Option<String>,
    pub plex_token: Option<String>,
    pub plex_library: Option<String>,
}

// -- table rows --------------------------------------------------------------

#[derive(Tabled)]
pub struct ArtistTableRow {
    pub id: i64,
    pub name: String,
    pub bitrate: String,
    pub record_type: String,
    pub alerts: String,
    pub download_path: String,
}

#[derive(Tabled)]
pub struct PlaylistTableRow {
    pub id: i64,
    pub title: String,
    pub bitrate: String,
    pub alerts: String,
    pub download_path: String,
}

#[derive(Tabled)]
pub struct ReleaseTableRow {
    pub date: String,
    pub artist: String,
    pub title: String,
    pub record_type: String,
    pub explicit: String,
}

#[derive(Tabled)]
pub struct TransactionTableRow {
    pub id: i64,
    pub date: String,
    pub artists: usize,
    pub playlists: usize,
    pub releases: usize,
    pub tracks: usize,
}

#[derive(Tabled)]
pub struct ProfileTableRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub alerts: String,
    pub bitrate: String,
    pub record_type: String,
    pub download_path: String,
}
