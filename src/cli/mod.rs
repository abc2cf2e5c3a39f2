//! # CLI Module
//!
//! User-facing commands of `relmon`. Each command receives a [`Context`]
//! holding the configuration snapshot and the open store, talks to the
//! catalog and the refresh engine, and reports through the colored console
//! macros. Failures are returned as [`crate::Error`]; `main` turns them into
//! exit codes.
//!
//! ## Commands
//!
//! - [`monitor`] - add, edit or remove monitored artists and playlists
//! - [`refresh`] - look for new releases and hand them to the downloader
//! - [`rollback`] - undo recent transactions or list them
//! - [`show`] - tables of monitored entities and seen releases
//! - [`profile`] - manage profiles
//! - [`reset`], [`backup`], [`restore`] - database maintenance
//! - [`download`] - download artists, albums, tracks or playlists by hand
//! - [`search`] - search the catalog for artists

mod download;
mod maintenance;
mod monitor;
mod profile;
mod refresh;
mod rollback;
mod search;
mod show;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

pub use download::{DownloadRequest, download};
pub use maintenance::{backup, reset, restore};
pub use monitor::{MonitorRequest, monitor};
pub use profile::{ProfileAction, profile};
pub use refresh::refresh;
pub use rollback::rollback;
pub use search::search;
pub use show::{ShowTarget, show};

use crate::{
    Res,
    catalog::{CatalogClient, HttpCatalog},
    config::Config,
    download::{AuditTrail, CommandSink, DownloadSink},
    management::SqliteStore,
    notify::{ConsoleNotifier, FileNotifier, Notifier},
    refresh::RefreshOutcome,
    success, warning,
};

/// Everything a command needs: the configuration snapshot and the store.
pub struct Context {
    pub config: Config,
    pub store: SqliteStore,
}

impl Context {
    pub fn open(config: Config) -> Res<Self> {
        let store = SqliteStore::open(config.db_path())?;
        Ok(Self { config, store })
    }

    pub fn catalog(&self) -> Res<Arc<dyn CatalogClient>> {
        Ok(Arc::new(HttpCatalog::from_config(&self.config)?))
    }

    fn digest_path(&self) -> PathBuf {
        self.config.data_dir.join("digest.txt")
    }
}

/// Hands a refresh result to the downloader and the notifiers.
async fn deliver(ctx: &Context, outcome: &RefreshOutcome, skip_downloads: bool) -> Res<()> {
    for failure in &outcome.failures {
        warning!("No data for {} ({}): {}", failure.name, failure.id, failure.error);
    }

    let mut sink = None;
    if !outcome.queue.is_empty() {
        if skip_downloads {
            warning!("{} items queued, downloads skipped", outcome.queue.len());
        } else if ctx.config.downloader.is_none() {
            warning!(
                "{} items queued but RELMON_DOWNLOADER is not set, downloads skipped",
                outcome.queue.len()
            );
        } else {
            sink = Some(CommandSink::from_config(&ctx.config)?);
        }
    }

    let audit = AuditTrail::from_config(&ctx.config);
    let console = ConsoleNotifier;
    let file = FileNotifier::new(ctx.digest_path());
    let notifiers: [&dyn Notifier; 2] = [&console, &file];
    let sink = sink.as_ref().map(|s| s as &dyn DownloadSink);

    let delivered = crate::download::deliver(&outcome.queue, &outcome.digest, sink, &audit, &notifiers).await?;
    if let Some(report) = delivered {
        success!("Downloaded {} of {} items", report.downloaded, outcome.queue.len());
        if !report.failed.is_empty() {
            warning!(
                "{} downloads failed, retry with `relmon download --retry-failed`",
                report.failed.len()
            );
        }
    }
    Ok(())
}

/// Asks a yes/no question on stdin. Anything but `y`/`yes` is a no.
fn confirm(question: &str) -> Res<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Asks for a 1-based choice among `count` options. Empty input or an out of
/// range number means no choice.
fn choose(count: usize) -> Res<Option<usize>> {
    print!("Choose 1-{count} (empty to skip): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=count).contains(n))
        .map(|n| n - 1))
}
