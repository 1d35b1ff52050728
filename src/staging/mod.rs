//! Local staging buffer of row identifiers waiting for their remote delete.
//!
//! The buffer decouples how fast rows are discovered from how fast they can
//! be deleted. Identifiers are only ever removed after their remote delete
//! attempt has finished, so an interrupted run resumes where it stopped.

mod error;
mod sqlite;
#[cfg(test)]
pub mod test_utils;

use async_trait::async_trait;
pub use error::{StagingError, StagingResult};
pub use sqlite::{SqliteStagingRepo, StagingDatabase, staging_table_name};

pub use crate::models::StagingRow;

/// A durable queue of row identifiers for one target.
#[async_trait]
pub trait StagingRepository: Send + Sync {
    async fn has_rows(&self) -> StagingResult<bool>;

    async fn count_rows(&self) -> StagingResult<u64>;

    /// Read up to `limit` identifiers, ordered by partition key.
    async fn get_rows(&self, limit: usize) -> StagingResult<Vec<StagingRow>>;

    /// Insert identifiers in one transaction. Already staged identifiers are ignored.
    async fn insert(&self, rows: &[StagingRow]) -> StagingResult<()>;

    /// Remove identifiers in one transaction. Missing identifiers are ignored.
    async fn delete(&self, rows: &[StagingRow]) -> StagingResult<()>;

    /// Destroy the buffer. Succeeds when it is already gone.
    async fn drop_table(&self) -> StagingResult<()>;
}
