use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{CatalogClient, CatalogError};
use crate::{
    config::Config,
    types::{ArtistRecord, PlaylistRecord, RecordType, ReleaseRecord, TrackRecord},
};

const MAX_ATTEMPTS: u32 = 3;
const PAGE_LIMIT: u32 = 100;
const MAX_RETRY_AFTER_SECS: u64 = 120;
const BAD_GATEWAY_DELAY: Duration = Duration::from_secs(10);
const QUOTA_DELAY: Duration = Duration::from_secs(5);

/// Error codes the public API returns inside a 200 response.
const QUOTA_EXCEEDED: i64 = 4;
const DATA_NOT_FOUND: i64 = 800;

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct ArtistDto {
    id: i64,
    name: String,
    #[serde(default)]
    link: String,
    nb_album: Option<u32>,
}

#[derive(Deserialize)]
struct ArtistRefDto {
    id: i64,
    name: String,
}

#[derive(Deserialize)]
struct AlbumDto {
    id: i64,
    title: String,
    #[serde(default)]
    link: String,
    cover_xl: Option<String>,
    cover_medium: Option<String>,
    #[serde(default)]
    release_date: String,
    #[serde(default)]
    record_type: String,
    #[serde(default)]
    explicit_lyrics: bool,
    nb_tracks: Option<u32>,
    artist: Option<ArtistRefDto>,
}

#[derive(Deserialize)]
struct TrackDto {
    id: i64,
    title: String,
    #[serde(default)]
    link: String,
    artist: ArtistRefDto,
}

#[derive(Deserialize)]
struct PlaylistDto {
    id: i64,
    title: String,
    #[serde(default)]
    link: String,
}

impl From<ArtistDto> for ArtistRecord {
    fn from(dto: ArtistDto) -> Self {
        ArtistRecord {
            id: dto.id,
            name: dto.name,
            link: dto.link,
            album_count: dto.nb_album,
        }
    }
}

impl From<TrackDto> for TrackRecord {
    fn from(dto: TrackDto) -> Self {
        TrackRecord {
            id: dto.id,
            title: dto.title,
            link: dto.link,
            artist_id: dto.artist.id,
            artist_name: dto.artist.name,
        }
    }
}

/// Builds a release. With an `owner` the release is filed under that artist,
/// even when the album's primary artist is someone else.
fn release_from_dto(dto: AlbumDto, owner: Option<&ArtistRecord>) -> ReleaseRecord {
    let record_type = dto.record_type.parse().unwrap_or_else(|_| {
        debug!(
            "Unknown record type '{}' for album {}, treating as album",
            dto.record_type, dto.id
        );
        RecordType::Album
    });
    let (artist_id, artist_name) = match (owner, dto.artist) {
        (Some(owner), _) => (owner.id, owner.name.clone()),
        (None, Some(artist)) => (artist.id, artist.name),
        (None, None) => (0, String::new()),
    };

    ReleaseRecord {
        id: dto.id,
        artist_id,
        artist_name,
        title: dto.title,
        release_date: dto.release_date,
        record_type,
        explicit: dto.explicit_lyrics,
        cover_url: dto.cover_xl.or(dto.cover_medium),
        link: dto.link,
        track_count: dto.nb_tracks,
    }
}

/// Catalog client speaking the public JSON API over HTTPS.
///
/// Anonymous unless an ARL credential is configured, in which case it is sent
/// as a cookie and the refresh engine uses the larger worker pool.
#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    arl: Option<String>,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, arl: Option<String>) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            arl,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        Self::new(config.api_url.clone(), config.arl.clone())
    }

    /// GETs `url` and decodes the body, retrying on 502, on 429 with an
    /// acceptable `Retry-After` and on quota errors.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.get(url);
            if let Some(arl) = &self.arl {
                request = request.header(header::COOKIE, format!("arl={arl}"));
            }

            let response = request
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            match response.status() {
                StatusCode::BAD_GATEWAY if attempt < MAX_ATTEMPTS => {
                    sleep(BAD_GATEWAY_DELAY).await;
                    continue;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    if retry_after <= MAX_RETRY_AFTER_SECS && attempt < MAX_ATTEMPTS {
                        sleep(Duration::from_secs(retry_after)).await;
                        continue;
                    }
                    warn!("Retry-After of {} seconds from {}, giving up", retry_after, url);
                    return Err(CatalogError::RateLimited);
                }
                StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(url.to_string())),
                status if status.is_server_error() => {
                    return Err(CatalogError::Unavailable(status.to_string()));
                }
                status if !status.is_success() => {
                    return Err(CatalogError::Network(status.to_string()));
                }
                _ => {}
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| CatalogError::Decode(e.to_string()))?;

            if body.get("error").is_some() {
                let api_error = serde_json::from_value::<ApiErrorBody>(body)
                    .map(|b| b.error)
                    .map_err(|e| CatalogError::Decode(e.to_string()))?;
                match api_error.code {
                    QUOTA_EXCEEDED if attempt < MAX_ATTEMPTS => {
                        sleep(QUOTA_DELAY).await;
                        continue;
                    }
                    QUOTA_EXCEEDED => return Err(CatalogError::RateLimited),
                    DATA_NOT_FOUND => return Err(CatalogError::NotFound(url.to_string())),
                    _ => return Err(CatalogError::Unavailable(api_error.message)),
                }
            }

            return serde_json::from_value(body).map_err(|e| CatalogError::Decode(e.to_string()));
        }
    }

    /// Follows `next` links until the listing is exhausted.
    async fn get_all_pages<T: DeserializeOwned>(&self, first_url: String) -> Result<Vec<T>, CatalogError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.data);
            next = page.next;
        }
        Ok(items)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn get_artist(&self, artist_id: i64) -> Result<ArtistRecord, CatalogError> {
        let url = format!("{}/artist/{}", self.base_url, artist_id);
        let dto: ArtistDto = self.get_json(&url).await?;
        Ok(dto.into())
    }

    async fn get_releases(&self, artist_id: i64) -> Result<Vec<ReleaseRecord>, CatalogError> {
        let artist = self.get_artist(artist_id).await?;
        let url = format!(
            "{}/artist/{}/albums?limit={}",
            self.base_url, artist_id, PAGE_LIMIT
        );
        let albums: Vec<AlbumDto> = self.get_all_pages(url).await?;
        Ok(albums
            .into_iter()
            .map(|dto| release_from_dto(dto, Some(&artist)))
            .collect())
    }

    async fn get_playlist(&self, playlist_id: i64) -> Result<PlaylistRecord, CatalogError> {
        let url = format!("{}/playlist/{}", self.base_url, playlist_id);
        let playlist: PlaylistDto = self.get_json(&url).await?;

        let url = format!(
            "{}/playlist/{}/tracks?limit={}",
            self.base_url, playlist_id, PAGE_LIMIT
        );
        let tracks: Vec<TrackDto> = self.get_all_pages(url).await?;

        Ok(PlaylistRecord {
            id: playlist.id,
            title: playlist.title,
            link: playlist.link,
            tracks: tracks.into_iter().map(TrackRecord::from).collect(),
        })
    }

    async fn get_album(&self, album_id: i64) -> Result<ReleaseRecord, CatalogError> {
        let url = format!("{}/album/{}", self.base_url, album_id);
        let dto: AlbumDto = self.get_json(&url).await?;
        Ok(release_from_dto(dto, None))
    }

    async fn get_track(&self, track_id: i64) -> Result<TrackRecord, CatalogError> {
        let url = format!("{}/track/{}", self.base_url, track_id);
        let dto: TrackDto = self.get_json(&url).await?;
        Ok(dto.into())
    }

    async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<ArtistRecord>, CatalogError> {
        let mut url = reqwest::Url::parse(&format!("{}/search/artist", self.base_url))
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query.trim())
            .append_pair("limit", &limit.to_string());

        let page: Page<ArtistDto> = self.get_json(url.as_str()).await?;
        Ok(page.data.into_iter().map(ArtistRecord::from).collect())
    }
}
