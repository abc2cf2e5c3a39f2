use tabled::Table;

use super::Context;
use crate::{
    Res, info, success,
    types::TransactionTableRow,
    utils, warning,
};

/// Rolls back one transaction by id, the last `count` transactions, or
/// lists recent transactions when `view` is set.
pub fn rollback(ctx: &Context, count: Option<usize>, transaction_id: Option<i64>, view: bool) -> Res<()> {
    if view {
        let transactions = ctx.store.recent_transactions(ctx.config.rollback_view_limit)?;
        if transactions.is_empty() {
            info!("No transactions recorded");
            return Ok(());
        }
        let rows: Vec<TransactionTableRow> = transactions
            .into_iter()
            .map(|s| TransactionTableRow {
                id: s.transaction.id,
                date: utils::format_timestamp(s.transaction.timestamp),
                artists: s.artists,
                playlists: s.playlists,
                releases: s.releases,
                tracks: s.tracks,
            })
            .collect();
        println!("{}", Table::new(rows));
        return Ok(());
    }

    let reports = match transaction_id {
        Some(id) => vec![ctx.store.rollback(id)?],
        None => ctx.store.rollback_last(count.unwrap_or(1))?,
    };
    if reports.is_empty() {
        warning!("Nothing to roll back");
    }
    for report in reports {
        success!(
            "Rolled back transaction {}: {} artists, {} playlists, {} releases, {} tracks",
            report.transaction_id,
            report.artists,
            report.playlists,
            report.releases,
            report.tracks
        );
    }
    Ok(())
}
