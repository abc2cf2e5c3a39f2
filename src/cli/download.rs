use super::Context;
use crate::{
    Res,
    catalog::CatalogLink,
    download::{AuditTrail, CommandSink, dispatch},
    info,
    refresh::queue::QueueItem,
    success, warning,
};

#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    /// Full discographies.
    pub artist_ids: Vec<i64>,
    pub album_ids: Vec<i64>,
    pub track_ids: Vec<i64>,
    pub playlist_ids: Vec<i64>,
    pub urls: Vec<String>,
    /// Re-dispatch everything recorded in the failed audit file.
    pub retry_failed: bool,
}

/// Downloads catalog entities by hand with the active profile's settings.
pub async fn download(ctx: &Context, request: DownloadRequest) -> Res<()> {
    let sink = CommandSink::from_config(&ctx.config)?;
    let audit = AuditTrail::from_config(&ctx.config);

    let queue = if request.retry_failed {
        let items = audit.read_failed().await?;
        audit.clear_failed().await?;
        items
    } else {
        build_queue(ctx, &request).await?
    };

    if queue.is_empty() {
        info!("Nothing to download");
        return Ok(());
    }
    for item in &queue {
        info!("Queued {}", item.label());
    }

    let report = dispatch(&queue, &sink, &audit).await?;
    success!("Downloaded {} of {} items", report.downloaded, queue.len());
    if !report.failed.is_empty() {
        warning!("{} downloads failed", report.failed.len());
    }
    Ok(())
}

async fn build_queue(ctx: &Context, request: &DownloadRequest) -> Res<Vec<QueueItem>> {
    let catalog = ctx.catalog()?;
    let profile = ctx.store.active_profile()?;
    let effective = ctx.config.resolve_profile(&profile);

    let mut artist_ids = request.artist_ids.clone();
    let mut album_ids = request.album_ids.clone();
    let mut track_ids = request.track_ids.clone();
    let mut playlist_ids = request.playlist_ids.clone();
    for url in &request.urls {
        match CatalogLink::parse(url) {
            Some(CatalogLink::Artist(id)) => artist_ids.push(id),
            Some(CatalogLink::Album(id)) => album_ids.push(id),
            Some(CatalogLink::Track(id)) => track_ids.push(id),
            Some(CatalogLink::Playlist(id)) => playlist_ids.push(id),
            None => warning!("Not a catalog link: {}", url),
        }
    }

    let mut queue = Vec::new();
    for id in artist_ids {
        queue.push(QueueItem::artist(&catalog.get_artist(id).await?, &effective));
    }
    for id in album_ids {
        queue.push(QueueItem::album(&catalog.get_album(id).await?, &effective));
    }
    for id in track_ids {
        queue.push(QueueItem::track(&catalog.get_track(id).await?, &effective));
    }
    for id in playlist_ids {
        queue.push(QueueItem::playlist(&catalog.get_playlist(id).await?, &effective));
    }
    Ok(queue)
}
