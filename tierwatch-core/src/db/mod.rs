//! Database access for tierwatch-core
//!
//! The labeled record store is the only database the orchestrator touches.

pub mod records;

pub use records::SqlRecordSource;

use sqlx::SqlitePool;
use std::path::Path;
use tierwatch_common::Result;

/// Open (creating if missing) the record store database at `db_path`
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tierwatch_common::db::init_database(db_path).await
}

/// Connect to the record store by URL
pub async fn connect_record_store(database_url: &str) -> Result<SqlitePool> {
    tracing::debug!(url = database_url, "Connecting to record store");
    tierwatch_common::db::connect_database(database_url).await
}
