use chrono::Duration;
use tabled::Table;

use super::Context;
use crate::{
    Res, info,
    types::{ArtistTableRow, PlaylistTableRow, ReleaseTableRow},
    utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    Artists,
    Playlists,
    Releases { days: Option<u32>, future: bool },
}

pub fn show(ctx: &Context, target: ShowTarget) -> Res<()> {
    match target {
        ShowTarget::Artists => show_artists(ctx),
        ShowTarget::Playlists => show_playlists(ctx),
        ShowTarget::Releases { days, future } => show_releases(ctx, days, future),
    }
}

fn show_artists(ctx: &Context) -> Res<()> {
    let artists = ctx.store.get_artists()?;
    if artists.is_empty() {
        info!("No artists monitored. Add some with `relmon monitor NAME`.");
        return Ok(());
    }
    let rows: Vec<ArtistTableRow> = artists
        .into_iter()
        .map(|a| ArtistTableRow {
            id: a.id,
            name: a.name,
            bitrate: utils::or_dash(a.bitrate),
            record_type: utils::or_dash(a.record_type),
            alerts: utils::yes_no(a.alerts),
            download_path: utils::or_dash(a.download_path),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn show_playlists(ctx: &Context) -> Res<()> {
    let playlists = ctx.store.get_playlists()?;
    if playlists.is_empty() {
        info!("No playlists monitored");
        return Ok(());
    }
    let rows: Vec<PlaylistTableRow> = playlists
        .into_iter()
        .map(|p| PlaylistTableRow {
            id: p.id,
            title: p.title,
            bitrate: utils::or_dash(p.bitrate),
            alerts: utils::yes_no(p.alerts),
            download_path: utils::or_dash(p.download_path),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn show_releases(ctx: &Context, days: Option<u32>, future: bool) -> Res<()> {
    let since = days.map(|d| utils::today() - Duration::days(i64::from(d)));
    let releases = ctx.store.recent_releases(since, future)?;
    if releases.is_empty() {
        info!("No releases seen yet");
        return Ok(());
    }

    let mut rows: Vec<ReleaseTableRow> = releases
        .into_iter()
        .map(|r| ReleaseTableRow {
            date: r.release_date,
            artist: r.artist_name,
            title: r.title,
            record_type: r.record_type.to_string(),
            explicit: utils::yes_no(Some(r.explicit)),
        })
        .collect();
    utils::sort_release_table_rows(&mut rows);
    println!("{}", Table::new(rows));
    Ok(())
}
