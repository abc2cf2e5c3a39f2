use std::sync::Arc;

use tabled::Table;

use super::{Context, choose, deliver};
use crate::{
    Res,
    catalog::{CatalogClient, CatalogLink, SearchMatch, match_artist},
    info,
    refresh::{RefreshEngine, RefreshOptions, RefreshTarget},
    success,
    types::{ArtistRecord, EntityOverrides, PlaylistRecord},
    warning,
};

#[derive(Debug, Clone, Default)]
pub struct MonitorRequest {
    /// Artist names, resolved through a catalog search.
    pub names: Vec<String>,
    pub artist_ids: Vec<i64>,
    pub playlist_ids: Vec<i64>,
    /// Catalog links to artists or playlists.
    pub urls: Vec<String>,
    pub remove: bool,
    pub edit: bool,
    pub overrides: EntityOverrides,
    pub no_refresh: bool,
    /// Refresh the new entities in bulk mode so their back catalog is queued.
    pub download: bool,
    pub skip_downloads: bool,
}

pub async fn monitor(ctx: &Context, request: MonitorRequest) -> Res<()> {
    if request.remove {
        return remove(ctx, &request);
    }
    if request.edit {
        return edit(ctx, &request);
    }

    let catalog = ctx.catalog()?;
    let (artists, playlists) = resolve(ctx, &catalog, &request).await?;
    if artists.is_empty() && playlists.is_empty() {
        warning!("Nothing to monitor");
        return Ok(());
    }

    let added = match add(ctx, &artists, &playlists, &request.overrides) {
        Ok(added) => added,
        Err(e) => {
            ctx.store.abort()?;
            return Err(e);
        }
    };
    let (added_artists, added_playlists) = added;
    if added_artists.is_empty() && added_playlists.is_empty() {
        ctx.store.abort()?;
        info!("Everything is already monitored");
        return Ok(());
    }

    if request.no_refresh {
        ctx.store.commit()?;
        return Ok(());
    }

    let profile = ctx.store.active_profile()?;
    let engine = RefreshEngine::new(&ctx.store, catalog, &ctx.config, profile);
    let options = RefreshOptions {
        target: RefreshTarget::Explicit {
            artist_ids: added_artists,
            playlist_ids: added_playlists,
        },
        ignore_filters: request.download,
        show_progress: true,
        ..RefreshOptions::default()
    };
    let outcome = engine.run(&options).await?;
    ctx.store.commit()?;

    if let Some(tid) = outcome.transaction_id {
        success!(
            "Recorded {} releases and {} tracks in transaction {}",
            outcome.releases_recorded,
            outcome.tracks_recorded,
            tid
        );
    }
    deliver(ctx, &outcome, request.skip_downloads).await
}

/// Adds every entity inside the open transaction and returns the ids that
/// were not monitored yet.
fn add(
    ctx: &Context,
    artists: &[ArtistRecord],
    playlists: &[PlaylistRecord],
    overrides: &EntityOverrides,
) -> Res<(Vec<i64>, Vec<i64>)> {
    ctx.store.begin_transaction()?;

    let mut added_artists = Vec::new();
    for artist in artists {
        if ctx.store.add_artist(artist, overrides)? {
            success!("Monitoring {} ({})", artist.name, artist.id);
            added_artists.push(artist.id);
        } else {
            info!("{} is already monitored", artist.name);
        }
    }

    let mut added_playlists = Vec::new();
    for playlist in playlists {
        if ctx.store.add_playlist(playlist, overrides)? {
            success!("Monitoring playlist {} ({})", playlist.title, playlist.id);
            added_playlists.push(playlist.id);
        } else {
            info!("Playlist {} is already monitored", playlist.title);
        }
    }
    Ok((added_artists, added_playlists))
}

async fn resolve(
    ctx: &Context,
    catalog: &Arc<dyn CatalogClient>,
    request: &MonitorRequest,
) -> Res<(Vec<ArtistRecord>, Vec<PlaylistRecord>)> {
    let mut artists = Vec::new();
    let mut playlists = Vec::new();

    for name in &request.names {
        let candidates = catalog.search_artists(name, ctx.config.query_limit).await?;
        match match_artist(name, candidates) {
            SearchMatch::Exact(artist) => artists.push(artist),
            SearchMatch::Ambiguous(matches) => {
                if let Some(artist) = disambiguate(ctx, name, matches)? {
                    artists.push(artist);
                }
            }
            SearchMatch::NoExact(candidates) => {
                warning!("No artist named '{}' found", name);
                if !candidates.is_empty() {
                    println!("{}", Table::new(super::search::candidate_rows(&candidates)));
                }
            }
        }
    }

    for id in &request.artist_ids {
        artists.push(catalog.get_artist(*id).await?);
    }
    for id in &request.playlist_ids {
        playlists.push(catalog.get_playlist(*id).await?);
    }

    for url in &request.urls {
        match CatalogLink::parse(url) {
            Some(CatalogLink::Artist(id)) => artists.push(catalog.get_artist(id).await?),
            Some(CatalogLink::Playlist(id)) => playlists.push(catalog.get_playlist(id).await?),
            Some(_) => warning!("Only artist and playlist links can be monitored: {}", url),
            None => warning!("Not a catalog link: {}", url),
        }
    }

    Ok((artists, playlists))
}

fn disambiguate(ctx: &Context, name: &str, mut matches: Vec<ArtistRecord>) -> Res<Option<ArtistRecord>> {
    if ctx.config.pick_first {
        let first = matches.remove(0);
        info!("Several artists named '{}', picking {} ({})", name, first.name, first.id);
        return Ok(Some(first));
    }

    warning!("Several artists are named '{}':", name);
    for (index, artist) in matches.iter().enumerate() {
        println!(
            "  {}) {} ({} albums) {}",
            index + 1,
            artist.name,
            artist.album_count.unwrap_or_default(),
            artist.link
        );
    }
    Ok(choose(matches.len())?.map(|index| matches.swap_remove(index)))
}

fn remove(ctx: &Context, request: &MonitorRequest) -> Res<()> {
    let (artist_ids, playlist_ids) = local_targets(ctx, request)?;
    for id in artist_ids {
        if ctx.store.remove_artist(id)? {
            success!("Stopped monitoring artist {}", id);
        } else {
            warning!("Artist {} is not monitored", id);
        }
    }
    for id in playlist_ids {
        if ctx.store.remove_playlist(id)? {
            success!("Stopped monitoring playlist {}", id);
        } else {
            warning!("Playlist {} is not monitored", id);
        }
    }
    Ok(())
}

fn edit(ctx: &Context, request: &MonitorRequest) -> Res<()> {
    if request.overrides == EntityOverrides::default() {
        warning!("Nothing to change, pass --bitrate, --record-type, --alerts or --download-path");
        return Ok(());
    }
    let (artist_ids, playlist_ids) = local_targets(ctx, request)?;
    for id in artist_ids {
        if ctx.store.update_artist_config(id, &request.overrides)? {
            success!("Updated artist {}", id);
        } else {
            warning!("Artist {} is not monitored", id);
        }
    }
    for id in playlist_ids {
        if ctx.store.update_playlist_config(id, &request.overrides)? {
            success!("Updated playlist {}", id);
        } else {
            warning!("Playlist {} is not monitored", id);
        }
    }
    Ok(())
}

/// Ids of already monitored entities named by the request, without catalog calls.
fn local_targets(ctx: &Context, request: &MonitorRequest) -> Res<(Vec<i64>, Vec<i64>)> {
    let mut artist_ids = request.artist_ids.clone();
    let mut playlist_ids = request.playlist_ids.clone();

    for name in &request.names {
        let artists = ctx.store.find_artists_by_name(name)?;
        let playlists = ctx.store.find_playlists_by_title(name)?;
        if artists.is_empty() && playlists.is_empty() {
            warning!("'{}' is not monitored", name);
        }
        artist_ids.extend(artists.iter().map(|a| a.id));
        playlist_ids.extend(playlists.iter().map(|p| p.id));
    }

    for url in &request.urls {
        match CatalogLink::parse(url) {
            Some(CatalogLink::Artist(id)) => artist_ids.push(id),
            Some(CatalogLink::Playlist(id)) => playlist_ids.push(id),
            _ => warning!("Not an artist or playlist link: {}", url),
        }
    }
    Ok((artist_ids, playlist_ids))
}
