use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

use relmon::{
    Error, Res,
    cli::{self, Context, DownloadRequest, MonitorRequest, ProfileAction, ShowTarget},
    config::{self, Config},
    error,
    types::{Bitrate, EntityOverrides, Profile, RecordTypeFilter},
    warning,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Log at debug level regardless of LOG_LEVEL
    #[clap(long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Monitor artists and playlists, or edit and remove monitored ones
    Monitor(MonitorOptions),

    /// Look for new releases of monitored artists and playlists
    Refresh(RefreshOpts),

    /// Undo recent monitor and refresh runs
    Rollback(RollbackOpts),

    /// Show monitored entities and seen releases
    Show(ShowOptions),

    /// Manage profiles
    Profile(ProfileOptions),

    /// Forget every artist, playlist and release of the active profile
    Reset(ConfirmOpts),

    /// Copy the database into the backups directory
    Backup,

    /// Replace the database with a backup
    Restore(RestoreOpts),

    /// Download artists, albums, tracks or playlists by hand
    Download(DownloadOpts),

    /// Search the catalog for artists
    Search(SearchOpts),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone, Default)]
pub struct OverrideOpts {
    /// Download quality: 128, 320 or flac
    #[clap(long)]
    pub bitrate: Option<Bitrate>,

    /// Record types to queue: comma separated album, ep, single, compile, or all
    #[clap(long)]
    pub record_type: Option<RecordTypeFilter>,

    /// Include in release digests (true/false)
    #[clap(long)]
    pub alerts: Option<bool>,

    /// Download directory
    #[clap(long)]
    pub download_path: Option<String>,
}

impl From<OverrideOpts> for EntityOverrides {
    fn from(opts: OverrideOpts) -> Self {
        EntityOverrides {
            bitrate: opts.bitrate,
            record_type: opts.record_type,
            alerts: opts.alerts,
            download_path: opts.download_path,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct MonitorOptions {
    /// Artist names (or playlist titles with --remove/--edit)
    pub names: Vec<String>,

    /// Artist ids
    #[clap(long = "artist-id", value_delimiter = ',')]
    pub artist_ids: Vec<i64>,

    /// Playlist ids
    #[clap(long = "playlist", value_delimiter = ',')]
    pub playlist_ids: Vec<i64>,

    /// Artist or playlist links
    #[clap(long = "url")]
    pub urls: Vec<String>,

    /// Stop monitoring instead
    #[clap(long, conflicts_with = "edit")]
    pub remove: bool,

    /// Change settings of monitored entities instead
    #[clap(long)]
    pub edit: bool,

    #[clap(flatten)]
    pub overrides: OverrideOpts,

    /// Do not refresh the new entities right away
    #[clap(long, conflicts_with = "download")]
    pub no_refresh: bool,

    /// Queue the whole back catalog of the new entities
    #[clap(long)]
    pub download: bool,

    /// Record releases but do not download anything
    #[clap(long)]
    pub skip_downloads: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RefreshOpts {
    /// Refresh only these monitored artists or playlists
    pub names: Vec<String>,

    /// Record releases but do not download anything
    #[clap(long)]
    pub skip_downloads: bool,

    /// Refresh as if today were this date (YYYY-MM-DD)
    #[clap(long)]
    pub time_machine: Option<String>,

    /// Queue every new release regardless of filters
    #[clap(long)]
    pub ignore_filters: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RollbackOpts {
    /// Number of most recent transactions to undo
    pub count: Option<usize>,

    /// Undo exactly this transaction
    #[clap(long, conflicts_with = "count")]
    pub id: Option<i64>,

    /// List recent transactions instead
    #[clap(short, long)]
    pub view: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowOptions {
    #[command(subcommand)]
    pub command: ShowSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ShowSubcommand {
    /// Monitored artists
    Artists,
    /// Monitored playlists
    Playlists,
    /// Seen releases, newest first
    Releases {
        /// Only releases of the last N days
        #[clap(long)]
        days: Option<u32>,
        /// Only releases that are not out yet
        #[clap(long)]
        future: bool,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct ProfileOptions {
    #[command(subcommand)]
    pub command: ProfileSubcommand,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ProfileFields {
    #[clap(long)]
    pub email: Option<String>,

    #[clap(flatten)]
    pub overrides: OverrideOpts,

    #[clap(long)]
    pub plex_base_url: Option<String>,

    #[clap(long)]
    pub plex_token: Option<String>,

    #[clap(long)]
    pub plex_library: Option<String>,
}

impl ProfileFields {
    fn into_profile(self, name: String) -> Profile {
        Profile {
            id: 0,
            name,
            email: self.email,
            alerts: self.overrides.alerts,
            bitrate: self.overrides.bitrate,
            record_type: self.overrides.record_type,
            download_path: self.overrides.download_path,
            plex_base_url: self.plex_base_url,
            plex_token: self.plex_token,
            plex_library: self.plex_library,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileSubcommand {
    /// List profiles, the active one is starred
    List,
    /// Create a profile
    Add {
        name: String,
        #[clap(flatten)]
        fields: ProfileFields,
    },
    /// Change a profile
    Edit {
        name: String,
        #[clap(long)]
        rename: Option<String>,
        #[clap(flatten)]
        fields: ProfileFields,
    },
    /// Delete a profile and all of its data
    Delete {
        name: String,
        #[clap(long, short)]
        yes: bool,
    },
    /// Switch the active profile
    Use { name: String },
}

#[derive(Parser, Debug, Clone)]
pub struct ConfirmOpts {
    /// Do not ask for confirmation
    #[clap(long, short)]
    pub yes: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RestoreOpts {
    /// Backup file, defaults to the newest backup
    pub file: Option<PathBuf>,

    /// Do not ask for confirmation
    #[clap(long, short)]
    pub yes: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DownloadOpts {
    /// Artist ids (full discography)
    #[clap(long = "artist", value_delimiter = ',')]
    pub artist_ids: Vec<i64>,

    /// Album ids
    #[clap(long = "album", value_delimiter = ',')]
    pub album_ids: Vec<i64>,

    /// Track ids
    #[clap(long = "track", value_delimiter = ',')]
    pub track_ids: Vec<i64>,

    /// Playlist ids
    #[clap(long = "playlist", value_delimiter = ',')]
    pub playlist_ids: Vec<i64>,

    /// Catalog links
    #[clap(long = "url")]
    pub urls: Vec<String>,

    /// Retry every failed download
    #[clap(long, conflicts_with_all = ["artist_ids", "album_ids", "track_ids", "playlist_ids", "urls"])]
    pub retry_failed: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOpts {
    pub query: String,

    /// Maximum number of candidates
    #[clap(long)]
    pub limit: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .with_env_var("LOG_LEVEL")
            .from_env_lossy()
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(command: Command) -> Res<()> {
    let config = Config::from_env()?;

    match command {
        Command::Backup => cli::backup(&config).await.map(|_| ()),
        Command::Restore(opt) => cli::restore(&config, opt.file, opt.yes).await,
        command => {
            let ctx = Context::open(config)?;
            run_with_store(&ctx, command).await
        }
    }
}

async fn run_with_store(ctx: &Context, command: Command) -> Res<()> {
    match command {
        Command::Monitor(opt) => {
            let request = MonitorRequest {
                names: opt.names,
                artist_ids: opt.artist_ids,
                playlist_ids: opt.playlist_ids,
                urls: opt.urls,
                remove: opt.remove,
                edit: opt.edit,
                overrides: opt.overrides.into(),
                no_refresh: opt.no_refresh,
                download: opt.download,
                skip_downloads: opt.skip_downloads,
            };
            cli::monitor(ctx, request).await
        }
        Command::Refresh(opt) => {
            cli::refresh(
                ctx,
                opt.names,
                opt.skip_downloads,
                opt.time_machine,
                opt.ignore_filters,
            )
            .await
        }
        Command::Rollback(opt) => cli::rollback(ctx, opt.count, opt.id, opt.view),
        Command::Show(opt) => {
            let target = match opt.command {
                ShowSubcommand::Artists => ShowTarget::Artists,
                ShowSubcommand::Playlists => ShowTarget::Playlists,
                ShowSubcommand::Releases { days, future } => ShowTarget::Releases { days, future },
            };
            cli::show(ctx, target)
        }
        Command::Profile(opt) => {
            let action = match opt.command {
                ProfileSubcommand::List => ProfileAction::List,
                ProfileSubcommand::Add { name, fields } => ProfileAction::Add(fields.into_profile(name)),
                ProfileSubcommand::Edit { name, rename, fields } => ProfileAction::Edit {
                    changes: fields.into_profile(name.clone()),
                    name,
                    rename,
                },
                ProfileSubcommand::Delete { name, yes } => ProfileAction::Delete { name, yes },
                ProfileSubcommand::Use { name } => ProfileAction::Use { name },
            };
            cli::profile(ctx, action)
        }
        Command::Reset(opt) => cli::reset(ctx, opt.yes),
        Command::Download(opt) => {
            let request = DownloadRequest {
                artist_ids: opt.artist_ids,
                album_ids: opt.album_ids,
                track_ids: opt.track_ids,
                playlist_ids: opt.playlist_ids,
                urls: opt.urls,
                retry_failed: opt.retry_failed,
            };
            cli::download(ctx, request).await
        }
        Command::Search(opt) => cli::search(ctx, opt.query, opt.limit).await,
        Command::Backup | Command::Restore(_) | Command::Completions(_) => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }
    init_logging(cli.debug);

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command_for_update();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    match run(cli.command).await {
        Ok(()) => {}
        Err(Error::Aborted) => {
            warning!("Aborted");
            std::process::exit(Error::Aborted.exit_code());
        }
        Err(e) => {
            eprintln!("[{}] {}", "!".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}
