use super::{Context, deliver};
use crate::{
    Res, info,
    refresh::{RefreshEngine, RefreshOptions, RefreshTarget},
    success, utils, warning,
};

/// Refreshes pending entities (or everything), or only the named ones.
pub async fn refresh(
    ctx: &Context,
    names: Vec<String>,
    skip_downloads: bool,
    time_machine: Option<String>,
    ignore_filters: bool,
) -> Res<()> {
    let time_machine = time_machine.as_deref().map(utils::parse_date).transpose()?;

    let target = if names.is_empty() {
        RefreshTarget::Due
    } else {
        let mut artist_ids = Vec::new();
        let mut playlist_ids = Vec::new();
        for name in &names {
            let artists = ctx.store.find_artists_by_name(name)?;
            let playlists = ctx.store.find_playlists_by_title(name)?;
            if artists.is_empty() && playlists.is_empty() {
                warning!("'{}' is not monitored", name);
            }
            artist_ids.extend(artists.iter().map(|a| a.id));
            playlist_ids.extend(playlists.iter().map(|p| p.id));
        }
        RefreshTarget::Explicit {
            artist_ids,
            playlist_ids,
        }
    };

    if let Some(date) = time_machine {
        info!("Time machine: refreshing as of {}", date);
    }

    let profile = ctx.store.active_profile()?;
    let engine = RefreshEngine::new(&ctx.store, ctx.catalog()?, &ctx.config, profile);
    let options = RefreshOptions {
        target,
        time_machine,
        ignore_filters,
        show_progress: true,
        ..RefreshOptions::default()
    };
    let outcome = engine.run(&options).await?;

    let Some(selection) = &outcome.selected else {
        warning!("Nothing to refresh");
        return Ok(());
    };
    info!(
        "Checked {} artists and {} playlists",
        selection.artists, selection.playlists
    );

    match outcome.transaction_id {
        Some(tid) => success!(
            "{} new releases ({} future, {} matured), {} new tracks, {} queued (transaction {})",
            outcome.releases_recorded,
            outcome.futures_recorded,
            outcome.futures_matured,
            outcome.tracks_recorded,
            outcome.queue.len(),
            tid
        ),
        None => success!("No new releases"),
    }

    deliver(ctx, &outcome, skip_downloads).await
}
