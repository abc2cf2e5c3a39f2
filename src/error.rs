//! Error taxonomy.
//!
//! Failures are split by how the caller is expected to react: transient
//! catalog failures and not-found degrade to "no new releases" for one entity,
//! configuration errors stop the current command before any remote call or
//! write, and repeated authentication failures stop all downloads of a run.

use thiserror::Error;

use crate::{catalog::CatalogError, download::SinkError};

/// Crate-level error returned by every public operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("download error: {0}")]
    Sink(#[from] SinkError),

    #[error("authentication failed {attempts} times in a row, downloads skipped for this run")]
    Authentication { attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("aborted by user")]
    Aborted,
}

impl Error {
    /// Process exit code used by the binary for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Aborted => 2,
            _ => 1,
        }
    }
}

/// Validation failures raised while building the configuration snapshot or
/// parsing user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid bitrate '{0}', expected one of 128, 320, flac")]
    InvalidBitrate(String),

    #[error("invalid record type '{0}', expected one of album, ep, single, compile, all")]
    InvalidRecordType(String),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid number '{value}' for {key}")]
    InvalidNumber { key: String, value: String },

    #[error("invalid boolean '{value}' for {key}")]
    InvalidBool { key: String, value: String },

    #[error("invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{0} must be set")]
    MissingValue(String),

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("write attempted outside an open transaction")]
    NoOpenTransaction,

    #[error("unknown database version {0}")]
    UnknownVersion(i64),

    #[error("schema validation failed for table {table}: found columns {found:?}")]
    SchemaMismatch { table: String, found: Vec<String> },

    #[error("the default profile cannot be deleted")]
    DefaultProfile,

    #[error("profile '{0}' already exists")]
    DuplicateProfile(String),

    #[error("no such transaction {0}")]
    UnknownTransaction(i64),

    #[error("cannot prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// QueueItem construction failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue item needs exactly one identity (album, artist, track or playlist), found {0}")]
    ConflictingIdentity(String),

    #[error("malformed queue record: {0}")]
    Malformed(String),
}
