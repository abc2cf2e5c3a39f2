//! Release Monitor Library
//!
//! This library provides the building blocks of `relmon`, a tool that watches
//! artists and playlists of a streaming catalog, remembers every release it has
//! already seen, filters newly discovered releases against user rules and hands
//! the actionable ones to an external downloader.
//!
//! # Modules
//!
//! - `catalog` - Catalog API client and its strongly-typed output contract
//! - `cli` - Command-line interface implementations
//! - `config` - Environment configuration and effective per-entity settings
//! - `download` - Download sink boundary, dispatcher and CSV audit trail
//! - `error` - Error taxonomy shared by every layer
//! - `management` - SQLite persistence (monitored entities, seen ledger, transactions, profiles)
//! - `notify` - Release digest notifier boundary
//! - `refresh` - Refresh engine, filter pipeline, queue and digest assembly
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use relmon::{config, management::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> relmon::Res<()> {
//!     config::load_env().await?;
//!     let config = config::Config::from_env()?;
//!     let store = SqliteStore::open(config.db_path())?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod management;
pub mod notify;
pub mod refresh;
pub mod types;
pub mod utils;

pub use error::Error;

/// A convenient Result type alias for operations that may fail.
///
/// Every layer converts its own failure type into [`Error`], so callers at
/// the CLI edge only need to match on one taxonomy to decide whether a
/// failure is a hard stop or degrades gracefully.
pub type Res<T> = std::result::Result<T, Error>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Refreshing {} artists", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only used at the CLI edge for unrecoverable errors. The library layers
/// return [`Error`] instead.
///
/// # Example
///
/// ```
/// error!("Failed to open database: {}", e);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
