#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::NaiveDate;
use relmon::{
    catalog::{CatalogClient, CatalogError},
    config::Config,
    management::SqliteStore,
    types::{ArtistRecord, EntityOverrides, PlaylistRecord, RecordType, ReleaseRecord, TrackRecord},
};

/// In-memory catalog. Unknown ids are reported as not found.
#[derive(Default)]
pub struct FakeCatalog {
    artists: Mutex<HashMap<i64, ArtistRecord>>,
    releases: Mutex<HashMap<i64, Result<Vec<ReleaseRecord>, CatalogError>>>,
    playlists: Mutex<HashMap<i64, PlaylistRecord>>,
    pub release_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_artist(&self, artist: ArtistRecord) {
        self.artists.lock().unwrap().insert(artist.id, artist);
    }

    pub fn set_releases(&self, artist_id: i64, releases: Vec<ReleaseRecord>) {
        self.releases.lock().unwrap().insert(artist_id, Ok(releases));
    }

    pub fn fail_releases(&self, artist_id: i64, error: CatalogError) {
        self.releases.lock().unwrap().insert(artist_id, Err(error));
    }

    pub fn set_playlist(&self, playlist: PlaylistRecord) {
        self.playlists.lock().unwrap().insert(playlist.id, playlist);
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn get_artist(&self, artist_id: i64) -> Result<ArtistRecord, CatalogError> {
        self.artists
            .lock()
            .unwrap()
            .get(&artist_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("artist {artist_id}")))
    }

    async fn get_releases(&self, artist_id: i64) -> Result<Vec<ReleaseRecord>, CatalogError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.releases
            .lock()
            .unwrap()
            .get(&artist_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn get_playlist(&self, playlist_id: i64) -> Result<PlaylistRecord, CatalogError> {
        self.playlists
            .lock()
            .unwrap()
            .get(&playlist_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {playlist_id}")))
    }

    async fn get_album(&self, album_id: i64) -> Result<ReleaseRecord, CatalogError> {
        self.releases
            .lock()
            .unwrap()
            .values()
            .filter_map(|r| r.as_ref().ok())
            .flatten()
            .find(|r| r.id == album_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("album {album_id}")))
    }

    async fn get_track(&self, track_id: i64) -> Result<TrackRecord, CatalogError> {
        self.playlists
            .lock()
            .unwrap()
            .values()
            .flat_map(|p| p.tracks.iter())
            .find(|t| t.id == track_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("track {track_id}")))
    }

    async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<ArtistRecord>, CatalogError> {
        let query = query.to_lowercase();
        let mut found: Vec<ArtistRecord> = self
            .artists
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.name.to_lowercase().contains(&query))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.id);
        found.truncate(limit as usize);
        Ok(found)
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn artist(id: i64, name: &str) -> ArtistRecord {
    ArtistRecord {
        id,
        name: name.to_string(),
        link: format!("https://www.deezer.com/artist/{id}"),
        album_count: None,
    }
}

pub fn release(id: i64, artist_id: i64, title: &str, release_date: &str) -> ReleaseRecord {
    ReleaseRecord {
        id,
        artist_id,
        artist_name: format!("Artist {artist_id}"),
        title: title.to_string(),
        release_date: release_date.to_string(),
        record_type: RecordType::Album,
        explicit: false,
        cover_url: Some(format!("https://cdn.example/{id}.jpg")),
        link: format!("https://www.deezer.com/album/{id}"),
        track_count: Some(10),
    }
}

pub fn typed(mut release: ReleaseRecord, record_type: RecordType) -> ReleaseRecord {
    release.record_type = record_type;
    release
}

pub fn explicit(mut release: ReleaseRecord) -> ReleaseRecord {
    release.explicit = true;
    release
}

pub fn track(id: i64, title: &str) -> TrackRecord {
    TrackRecord {
        id,
        title: title.to_string(),
        link: format!("https://www.deezer.com/track/{id}"),
        artist_id: 900 + id,
        artist_name: format!("Track Artist {id}"),
    }
}

pub fn playlist(id: i64, title: &str, tracks: Vec<TrackRecord>) -> PlaylistRecord {
    PlaylistRecord {
        id,
        title: title.to_string(),
        link: format!("https://www.deezer.com/playlist/{id}"),
        tracks,
    }
}

/// Configuration built only from `pairs`; nothing is read from the environment.
pub fn config(pairs: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("RELMON_DATA_DIR".to_string())
        .or_insert_with(|| std::env::temp_dir().join("relmon-tests").display().to_string());
    Config::from_lookup(|key| map.get(key).cloned()).unwrap()
}

/// Monitors `artist` in its own committed transaction and returns its id.
pub fn monitor_artist(store: &SqliteStore, artist: &ArtistRecord) -> i64 {
    let tid = store.begin_transaction().unwrap();
    assert!(store.add_artist(artist, &EntityOverrides::default()).unwrap());
    store.commit().unwrap();
    tid
}
