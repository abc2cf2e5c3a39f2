//! Catalog client adapter.
//!
//! Every remote lookup goes through [`CatalogClient`], which hands back the
//! strongly typed records of [`crate::types`]. The refresh engine calls it from
//! a bounded worker pool, so implementations must be `Send + Sync` and safe to
//! call concurrently with distinct arguments.

mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpCatalog;

use crate::types::{ArtistRecord, CatalogRecord, PlaylistRecord, ReleaseRecord, TrackRecord};

/// Per-entity catalog failure. Never aborts a whole refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by the catalog")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("cannot decode catalog response: {0}")]
    Decode(String),
}

impl CatalogError {
    /// Transient failures may succeed on the next run.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CatalogError::NotFound(_) | CatalogError::Decode(_))
    }
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_artist(&self, artist_id: i64) -> Result<ArtistRecord, CatalogError>;

    /// Full discography of an artist. An empty list is a valid answer.
    async fn get_releases(&self, artist_id: i64) -> Result<Vec<ReleaseRecord>, CatalogError>;

    async fn get_playlist(&self, playlist_id: i64) -> Result<PlaylistRecord, CatalogError>;

    async fn get_album(&self, album_id: i64) -> Result<ReleaseRecord, CatalogError>;

    async fn get_track(&self, track_id: i64) -> Result<TrackRecord, CatalogError>;

    /// Artists matching `query`, best match first.
    async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<ArtistRecord>, CatalogError>;

    /// Resolves a parsed catalog link into its record.
    async fn resolve(&self, link: CatalogLink) -> Result<CatalogRecord, CatalogError> {
        Ok(match link {
            CatalogLink::Artist(id) => CatalogRecord::Artist(self.get_artist(id).await?),
            CatalogLink::Album(id) => CatalogRecord::Release(self.get_album(id).await?),
            CatalogLink::Playlist(id) => CatalogRecord::Playlist(self.get_playlist(id).await?),
            CatalogLink::Track(id) => CatalogRecord::Track(self.get_track(id).await?),
        })
    }
}

/// Entity addressed by a catalog web link such as
/// `https://www.deezer.com/en/artist/27`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogLink {
    Artist(i64),
    Album(i64),
    Playlist(i64),
    Track(i64),
}

impl CatalogLink {
    /// Parses a web link. The optional locale segment is ignored, as is any
    /// query string.
    pub fn parse(url: &str) -> Option<Self> {
        let path = url
            .trim()
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');

        let mut segments = path.rsplit('/');
        let id = segments.next()?.parse::<i64>().ok()?;
        match segments.next()? {
            "artist" => Some(CatalogLink::Artist(id)),
            "album" => Some(CatalogLink::Album(id)),
            "playlist" => Some(CatalogLink::Playlist(id)),
            "track" => Some(CatalogLink::Track(id)),
            _ => None,
        }
    }
}

/// Result of matching a search query against catalog candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMatch {
    /// Exactly one candidate carries the queried name.
    Exact(ArtistRecord),
    /// Several candidates carry the queried name; the caller has to choose.
    Ambiguous(Vec<ArtistRecord>),
    /// Nobody carries the queried name. Candidates are kept for display.
    NoExact(Vec<ArtistRecord>),
}

/// Prefers exact case-insensitive name matches. Never picks among several.
pub fn match_artist(query: &str, candidates: Vec<ArtistRecord>) -> SearchMatch {
    let wanted = query.trim().to_lowercase();
    let (mut exact, others): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|a| a.name.trim().to_lowercase() == wanted);

    match exact.len() {
        0 => SearchMatch::NoExact(others),
        1 => SearchMatch::Exact(exact.remove(0)),
        _ => SearchMatch::Ambiguous(exact),
    }
}
