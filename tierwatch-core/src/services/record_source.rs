//! Remote record source seam
//!
//! The orchestrator only ever talks to the labeled record store through this
//! trait. `SqlRecordSource` (see `crate::db::records`) is the production
//! implementation; tests substitute in-memory sources.

use async_trait::async_trait;
use tierwatch_common::Result;

use crate::models::{RecordId, RemoteRecord};

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Create the record table and any missing bookkeeping columns
    async fn ensure_schema(&self) -> Result<()>;

    /// Records with `trained` NULL or false and a known label, in id order
    async fn fetch_untrained(&self) -> Result<Vec<RemoteRecord>>;

    /// Flag records as consumed; must be a no-op for unknown ids
    async fn mark_trained(&self, ids: &[RecordId]) -> Result<()>;

    /// Number of records still waiting to be consumed
    async fn count_untrained(&self) -> Result<u64> {
        Ok(self.fetch_untrained().await?.len() as u64)
    }
}
