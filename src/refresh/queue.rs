//! Download queue items and the release digest.

use std::{collections::BTreeMap, path::PathBuf};

use crate::{
    config::EffectiveConfig,
    error::QueueError,
    types::{ArtistRecord, Bitrate, PlaylistRecord, RecordType, ReleaseRecord, TrackRecord},
};

/// Which single thing a queue item downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueIdentity {
    Album,
    Artist,
    Track,
    Playlist,
}

/// One entry of the download queue.
///
/// Exactly one identity is set: an album (with its artist), an artist alone
/// for the full discography, a track, or a playlist. Fields are private so
/// the constructors and [`TryFrom<QueueRecord>`] are the only ways in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    artist_name: String,
    album_id: Option<i64>,
    album_title: Option<String>,
    track_id: Option<i64>,
    track_title: Option<String>,
    playlist_title: Option<String>,
    url: String,
    bitrate: Bitrate,
    download_path: PathBuf,
}

impl QueueItem {
    pub fn album(release: &ReleaseRecord, config: &EffectiveConfig) -> Self {
        Self {
            artist_name: release.artist_name.clone(),
            album_id: Some(release.id),
            album_title: Some(release.title.clone()),
            track_id: None,
            track_title: None,
            playlist_title: None,
            url: release.link.clone(),
            bitrate: config.bitrate,
            download_path: config.download_path.clone(),
        }
    }

    pub fn artist(artist: &ArtistRecord, config: &EffectiveConfig) -> Self {
        Self {
            artist_name: artist.name.clone(),
            album_id: None,
            album_title: None,
            track_id: None,
            track_title: None,
            playlist_title: None,
            url: artist.link.clone(),
            bitrate: config.bitrate,
            download_path: config.download_path.clone(),
        }
    }

    pub fn track(track: &TrackRecord, config: &EffectiveConfig) -> Self {
        Self {
            artist_name: track.artist_name.clone(),
            album_id: None,
            album_title: None,
            track_id: Some(track.id),
            track_title: Some(track.title.clone()),
            playlist_title: None,
            url: track.link.clone(),
            bitrate: config.bitrate,
            download_path: config.download_path.clone(),
        }
    }

    pub fn playlist(playlist: &PlaylistRecord, config: &EffectiveConfig) -> Self {
        Self {
            artist_name: String::new(),
            album_id: None,
            album_title: None,
            track_id: None,
            track_title: None,
            playlist_title: Some(playlist.title.clone()),
            url: playlist.link.clone(),
            bitrate: config.bitrate,
            download_path: config.download_path.clone(),
        }
    }

    pub fn identity(&self) -> QueueIdentity {
        if self.album_id.is_some() {
            QueueIdentity::Album
        } else if self.track_id.is_some() {
            QueueIdentity::Track
        } else if self.playlist_title.is_some() {
            QueueIdentity::Playlist
        } else {
            QueueIdentity::Artist
        }
    }

    pub fn artist_name(&self) -> &str {
        &self.artist_name
    }

    pub fn album_id(&self) -> Option<i64> {
        self.album_id
    }

    pub fn track_id(&self) -> Option<i64> {
        self.track_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    pub fn download_path(&self) -> &PathBuf {
        &self.download_path
    }

    /// Short human label, e.g. `Artist - Album`.
    pub fn label(&self) -> String {
        match self.identity() {
            QueueIdentity::Album => format!(
                "{} - {}",
                self.artist_name,
                self.album_title.as_deref().unwrap_or_default()
            ),
            QueueIdentity::Track => format!(
                "{} - {}",
                self.artist_name,
                self.track_title.as_deref().unwrap_or_default()
            ),
            QueueIdentity::Playlist => format!(
                "Playlist {}",
                self.playlist_title.as_deref().unwrap_or_default()
            ),
            QueueIdentity::Artist => format!("{} (discography)", self.artist_name),
        }
    }
}

/// Flat, unvalidated form of a [`QueueItem`], as written to the audit files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRecord {
    pub artist_name: String,
    pub album_id: Option<i64>,
    pub album_title: Option<String>,
    pub track_id: Option<i64>,
    pub track_title: Option<String>,
    pub playlist_title: Option<String>,
    pub url: String,
    pub bitrate: String,
    pub download_path: String,
}

impl QueueRecord {
    pub const HEADER: [&'static str; 9] = [
        "artist_name",
        "album_id",
        "album_title",
        "track_id",
        "track_title",
        "playlist_title",
        "url",
        "bitrate",
        "download_path",
    ];

    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.artist_name.clone(),
            self.album_id.map(|id| id.to_string()).unwrap_or_default(),
            self.album_title.clone().unwrap_or_default(),
            self.track_id.map(|id| id.to_string()).unwrap_or_default(),
            self.track_title.clone().unwrap_or_default(),
            self.playlist_title.clone().unwrap_or_default(),
            self.url.clone(),
            self.bitrate.clone(),
            self.download_path.clone(),
        ]
    }

    pub fn from_fields(fields: &[String]) -> Result<Self, QueueError> {
        if fields.len() != Self::HEADER.len() {
            return Err(QueueError::Malformed(format!(
                "expected {} fields, found {}",
                Self::HEADER.len(),
                fields.len()
            )));
        }
        let text = |i: usize| Some(fields[i].clone()).filter(|v| !v.is_empty());
        let id = |i: usize| -> Result<Option<i64>, QueueError> {
            text(i)
                .map(|v| {
                    v.parse::<i64>()
                        .map_err(|_| QueueError::Malformed(format!("invalid id '{v}'")))
                })
                .transpose()
        };

        Ok(Self {
            artist_name: fields[0].clone(),
            album_id: id(1)?,
            album_title: text(2),
            track_id: id(3)?,
            track_title: text(4),
            playlist_title: text(5),
            url: fields[6].clone(),
            bitrate: fields[7].clone(),
            download_path: fields[8].clone(),
        })
    }
}

impl From<&QueueItem> for QueueRecord {
    fn from(item: &QueueItem) -> Self {
        Self {
            artist_name: item.artist_name.clone(),
            album_id: item.album_id,
            album_title: item.album_title.clone(),
            track_id: item.track_id,
            track_title: item.track_title.clone(),
            playlist_title: item.playlist_title.clone(),
            url: item.url.clone(),
            bitrate: item.bitrate.to_string(),
            download_path: item.download_path.display().to_string(),
        }
    }
}

impl TryFrom<QueueRecord> for QueueItem {
    type Error = QueueError;

    fn try_from(record: QueueRecord) -> Result<Self, Self::Error> {
        let album = record.album_id.is_some() || record.album_title.is_some();
        let track = record.track_id.is_some() || record.track_title.is_some();
        let playlist = record.playlist_title.is_some();

        let identities: Vec<&str> = [(album, "album"), (track, "track"), (playlist, "playlist")]
            .into_iter()
            .filter_map(|(set, name)| set.then_some(name))
            .collect();
        if identities.len() > 1 {
            return Err(QueueError::ConflictingIdentity(identities.join(" and ")));
        }

        if album && (record.album_id.is_none() || record.album_title.is_none()) {
            return Err(QueueError::Malformed("album needs both id and title".to_string()));
        }
        if track && (record.track_id.is_none() || record.track_title.is_none()) {
            return Err(QueueError::Malformed("track needs both id and title".to_string()));
        }
        if !playlist && record.artist_name.trim().is_empty() {
            return Err(QueueError::Malformed("artist name is empty".to_string()));
        }
        if record.url.trim().is_empty() {
            return Err(QueueError::Malformed("url is empty".to_string()));
        }

        let bitrate = record
            .bitrate
            .parse::<Bitrate>()
            .map_err(|e| QueueError::Malformed(e.to_string()))?;

        Ok(Self {
            artist_name: record.artist_name,
            album_id: record.album_id,
            album_title: record.album_title,
            track_id: record.track_id,
            track_title: record.track_title,
            playlist_title: record.playlist_title,
            url: record.url,
            bitrate,
            download_path: PathBuf::from(record.download_path),
        })
    }
}

/// One release in a digest group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub artist: String,
    pub album: String,
    pub cover: Option<String>,
    pub url: String,
    pub track_count: Option<u32>,
    pub record_type: RecordType,
}

impl From<&ReleaseRecord> for DigestEntry {
    fn from(release: &ReleaseRecord) -> Self {
        Self {
            artist: release.artist_name.clone(),
            album: release.title.clone(),
            cover: release.cover_url.clone(),
            url: release.link.clone(),
            track_count: release.track_count,
            record_type: release.record_type,
        }
    }
}

/// Releases sharing one release date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestGroup {
    pub release_date: String,
    pub entries: Vec<DigestEntry>,
}

/// Actionable releases bucketed by exact release date. Inside a bucket,
/// entries keep the order in which they passed the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    groups: BTreeMap<String, Vec<DigestEntry>>,
}

impl Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, release: &ReleaseRecord) {
        self.groups
            .entry(release.release_date.clone())
            .or_default()
            .push(DigestEntry::from(release));
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Groups, newest release date first.
    pub fn groups(&self) -> Vec<DigestGroup> {
        self.groups
            .iter()
            .rev()
            .map(|(release_date, entries)| DigestGroup {
                release_date: release_date.clone(),
                entries: entries.clone(),
            })
            .collect()
    }
}
