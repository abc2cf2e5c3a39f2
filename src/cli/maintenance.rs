use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::Utc;

use super::{Context, confirm};
use crate::{Error, Res, config::Config, info, management::SqliteStore, success};

/// Deletes every monitored entity and ledger row of the active profile.
pub fn reset(ctx: &Context, yes: bool) -> Res<()> {
    let profile = ctx.store.active_profile()?;
    if !yes
        && !confirm(&format!(
            "Remove all artists, playlists and releases of profile '{}'?",
            profile.name
        ))?
    {
        return Err(Error::Aborted);
    }
    ctx.store.reset_profile()?;
    success!("Profile {} reset", profile.name);
    Ok(())
}

fn backup_dir(config: &Config) -> PathBuf {
    config.data_dir.join("backups")
}

/// Copies the database into `<data_dir>/backups` and returns the new file.
pub async fn backup(config: &Config) -> Res<PathBuf> {
    let dir = backup_dir(config);
    async_fs::create_dir_all(&dir).await?;

    let target = dir.join(format!("relmon-{}.db", Utc::now().format("%Y%m%d-%H%M%S")));
    async_fs::copy(config.db_path(), &target).await?;
    success!("Backup written to {}", target.display());
    Ok(target)
}

/// Replaces the database with `file`, or with the newest backup when `file`
/// is `None`. The backup is validated before anything is overwritten.
pub async fn restore(config: &Config, file: Option<PathBuf>, yes: bool) -> Res<()> {
    let source = match file {
        Some(file) => file,
        None => match latest_backup(&backup_dir(config))? {
            Some(latest) => latest,
            None => {
                info!("No backups found in {}", backup_dir(config).display());
                return Ok(());
            }
        },
    };

    if !source.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no backup at {}", source.display()),
        )
        .into());
    }
    drop(SqliteStore::open(&source)?);

    if !yes
        && !confirm(&format!(
            "Replace {} with {}?",
            config.db_path().display(),
            source.display()
        ))?
    {
        return Err(Error::Aborted);
    }

    if let Some(parent) = config.db_path().parent() {
        async_fs::create_dir_all(parent).await?;
    }
    async_fs::copy(&source, config.db_path()).await?;
    success!("Restored {}", source.display());
    Ok(())
}

fn latest_backup(dir: &Path) -> Res<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut newest: Option<PathBuf> = None;
    // Timestamped names sort chronologically.
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "db") && newest.as_ref().is_none_or(|n| path > *n) {
            newest = Some(path);
        }
    }
    Ok(newest)
}
