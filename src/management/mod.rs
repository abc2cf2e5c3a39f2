//! Persistent store of monitored entities, the seen ledger, transactions and profiles.

mod schema;
mod store;

pub use schema::{BASE_DB_VERSION, VERSIONED_SCHEMAS};
pub use store::{DEFAULT_PROFILE_ID, DueForRefresh, ReleaseEntry, RollbackReport, SqliteStore};
