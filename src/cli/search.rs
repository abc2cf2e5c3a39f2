use tabled::{Table, Tabled};

use super::Context;
use crate::{Res, types::ArtistRecord, warning};

#[derive(Tabled)]
pub(super) struct CandidateRow {
    id: i64,
    name: String,
    albums: String,
    link: String,
}

pub(super) fn candidate_rows(candidates: &[ArtistRecord]) -> Vec<CandidateRow> {
    candidates
        .iter()
        .map(|a| CandidateRow {
            id: a.id,
            name: a.name.clone(),
            albums: a.album_count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            link: a.link.clone(),
        })
        .collect()
}

pub async fn search(ctx: &Context, query: String, limit: Option<u32>) -> Res<()> {
    let limit = limit.unwrap_or(ctx.config.query_limit);
    let candidates = ctx.catalog()?.search_artists(&query, limit).await?;
    if candidates.is_empty() {
        warning!("No artist matches '{}'", query);
        return Ok(());
    }
    println!("{}", Table::new(candidate_rows(&candidates)));
    Ok(())
}
