//! Notifier boundary.
//!
//! A refresh hands its digest to a [`Notifier`] only when it is non-empty.
//! Delivery over mail lives outside this crate; the notifiers here print the
//! digest or write it next to the database for an external mailer to pick up.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    Res,
    refresh::queue::{Digest, DigestGroup},
};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// `groups` is sorted newest release date first and never empty.
    async fn notify(&self, groups: &[DigestGroup]) -> Res<()>;
}

/// Plain text rendering of a digest.
pub fn render_text(groups: &[DigestGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        out.push_str(&format!("Released {}\n", group.release_date));
        for entry in &group.entries {
            let tracks = entry
                .track_count
                .map(|n| format!(", {n} tracks"))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {} - {} ({}{})\n    {}\n",
                entry.artist, entry.album, entry.record_type, tracks, entry.url
            ));
        }
        out.push('\n');
    }
    out
}

pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, groups: &[DigestGroup]) -> Res<()> {
        print!("{}", render_text(groups));
        Ok(())
    }
}

/// Writes the rendered digest to a file, replacing the previous one.
pub struct FileNotifier {
    path: PathBuf,
}

impl FileNotifier {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn notify(&self, groups: &[DigestGroup]) -> Res<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::write(&self.path, render_text(groups)).await?;
        debug!("Digest written to {}", self.path.display());
        Ok(())
    }
}

/// Sends `digest` through every notifier. Returns `false` when it was empty.
pub async fn send_digest(digest: &Digest, notifiers: &[&dyn Notifier]) -> Res<bool> {
    if digest.is_empty() {
        return Ok(false);
    }
    let groups = digest.groups();
    for notifier in notifiers {
        notifier.notify(&groups).await?;
    }
    Ok(true)
}
