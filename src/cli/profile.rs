use tabled::Table;

use super::{Context, confirm};
use crate::{
    Error, Res,
    error::ConfigError,
    management::DEFAULT_PROFILE_ID,
    success,
    types::{Profile, ProfileTableRow},
    utils, warning,
};

#[derive(Debug, Clone)]
pub enum ProfileAction {
    List,
    Add(Profile),
    /// `name` selects the profile; fields set in `changes` replace stored ones.
    Edit { name: String, changes: Profile, rename: Option<String> },
    Delete { name: String, yes: bool },
    Use { name: String },
}

pub fn profile(ctx: &Context, action: ProfileAction) -> Res<()> {
    match action {
        ProfileAction::List => list(ctx),
        ProfileAction::Add(profile) => {
            let id = ctx.store.create_profile(&profile)?;
            success!("Created profile {} ({})", profile.name, id);
            Ok(())
        }
        ProfileAction::Edit { name, changes, rename } => {
            let mut stored = find(ctx, &name)?;
            if let Some(new_name) = rename {
                stored.name = new_name;
            }
            if changes.email.is_some() {
                stored.email = changes.email;
            }
            if changes.alerts.is_some() {
                stored.alerts = changes.alerts;
            }
            if changes.bitrate.is_some() {
                stored.bitrate = changes.bitrate;
            }
            if changes.record_type.is_some() {
                stored.record_type = changes.record_type;
            }
            if changes.download_path.is_some() {
                stored.download_path = changes.download_path;
            }
            if changes.plex_base_url.is_some() {
                stored.plex_base_url = changes.plex_base_url;
            }
            if changes.plex_token.is_some() {
                stored.plex_token = changes.plex_token;
            }
            if changes.plex_library.is_some() {
                stored.plex_library = changes.plex_library;
            }
            ctx.store.update_profile(&stored)?;
            success!("Updated profile {}", stored.name);
            Ok(())
        }
        ProfileAction::Delete { name, yes } => {
            let stored = find(ctx, &name)?;
            if stored.id == DEFAULT_PROFILE_ID {
                warning!("The default profile cannot be deleted");
                return Ok(());
            }
            if !yes && !confirm(&format!("Delete profile '{}' and all of its data?", stored.name))? {
                return Err(Error::Aborted);
            }
            ctx.store.delete_profile(stored.id)?;
            success!("Deleted profile {}", stored.name);
            Ok(())
        }
        ProfileAction::Use { name } => {
            let stored = find(ctx, &name)?;
            ctx.store.set_active_profile(stored.id)?;
            success!("Switched to profile {}", stored.name);
            Ok(())
        }
    }
}

fn find(ctx: &Context, name: &str) -> Res<Profile> {
    ctx.store
        .get_profile_by_name(name)?
        .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()).into())
}

fn list(ctx: &Context) -> Res<()> {
    let active = ctx.store.active_profile_id();
    let rows: Vec<ProfileTableRow> = ctx
        .store
        .list_profiles()?
        .into_iter()
        .map(|p| ProfileTableRow {
            id: p.id,
            name: if p.id == active {
                format!("{} *", p.name)
            } else {
                p.name
            },
            email: utils::or_dash(p.email),
            alerts: utils::yes_no(p.alerts),
            bitrate: utils::or_dash(p.bitrate),
            record_type: utils::or_dash(p.record_type),
            download_path: utils::or_dash(p.download_path),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}
