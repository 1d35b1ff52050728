//! Access to the remote partitioned table store.
//!
//! The store only accepts bulk deletes that touch a single partition and at
//! most [`MAX_BATCH_SIZE`] rows per transaction. [`RemoteTableRepository::delete`]
//! hides that constraint: any set of rows is grouped by partition, cut into
//! bounded sub-batches, and the sub-batches are deleted concurrently.

pub mod azure;
mod error;
#[cfg(test)]
pub mod test_utils;

use std::collections::BTreeMap;

use async_trait::async_trait;
pub use azure::AzureTableRepository;
pub use error::{RemoteError, RemoteResult};

use crate::{
    models::{RemoteRow, StagingRow},
    observability::metrics,
};

/// Maximum number of operations the store accepts in one batch transaction.
pub const MAX_BATCH_SIZE: usize = 100;

/// Page size used when the caller does not ask for a specific one.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// An opaque cursor for resuming a paginated scan.
///
/// Tokens are backend-specific and only valid within the scan that produced
/// them. They should not be parsed or persisted by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of a filtered scan.
///
/// `rows` may be empty while `next` is still set; the scan is only exhausted
/// when `next` is `None`.
#[derive(Debug, Clone, Default)]
pub struct RowPage {
    pub rows: Vec<RemoteRow>,
    pub next: Option<ContinuationToken>,
}

impl RowPage {
    pub fn new(rows: Vec<RemoteRow>, next: Option<ContinuationToken>) -> Self {
        Self { rows, next }
    }

    /// Whether the scan has no further pages.
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Result of deleting one single-partition sub-batch.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Every row in the batch was deleted.
    Deleted,
    /// The store reported a row as missing. The delete counts as achieved.
    AlreadyGone,
    /// Any other failure. Fails the enclosing [`RemoteTableRepository::delete`].
    Failed(RemoteError),
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::AlreadyGone => "already_gone",
            Self::Failed(_) => "failed",
        }
    }
}

/// Reads and deletes rows in the remote store.
///
/// Implementations apply the retention cutoff themselves: every row returned
/// by [`get_rows`](Self::get_rows) is eligible for deletion.
#[async_trait]
pub trait RemoteTableRepository: Send + Sync {
    /// Read the next page of eligible rows. `None` starts a fresh scan.
    ///
    /// `page_size` is an upper bound; the store may return fewer rows.
    async fn get_rows(
        &self,
        token: Option<&ContinuationToken>,
        page_size: u32,
    ) -> RemoteResult<RowPage>;

    /// Delete one batch of at most [`MAX_BATCH_SIZE`] rows sharing a partition key.
    async fn delete_batch(&self, batch: &[StagingRow]) -> BatchOutcome;

    /// Probe whether at least one eligible row exists.
    async fn has_rows(&self) -> RemoteResult<bool> {
        let page = self.get_rows(None, 1).await?;
        Ok(!page.rows.is_empty())
    }

    /// Delete rows spanning any number of partitions.
    ///
    /// Rows that are already gone are not an error. Any other failure is
    /// returned after every sub-batch has finished; sub-batches that succeeded
    /// stay deleted.
    async fn delete(&self, rows: &[StagingRow]) -> RemoteResult<()> {
        delete_in_batches(self, rows).await
    }
}

/// Group rows by partition key and split every group into sub-batches of at
/// most [`MAX_BATCH_SIZE`] rows. Partitions come out in key order.
pub fn plan_delete_batches(rows: &[StagingRow]) -> Vec<Vec<StagingRow>> {
    let mut by_partition: BTreeMap<&str, Vec<StagingRow>> = BTreeMap::new();
    for row in rows {
        by_partition
            .entry(row.partition_key.as_str())
            .or_default()
            .push(row.clone());
    }

    by_partition
        .into_values()
        .flat_map(|group| {
            group
                .chunks(MAX_BATCH_SIZE)
                .map(<[StagingRow]>::to_vec)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Delete `rows` through `repo` as concurrent single-partition sub-batches.
///
/// All sub-batches are awaited even when one of them fails; the first
/// non-tolerated failure is returned.
pub async fn delete_in_batches<R>(repo: &R, rows: &[StagingRow]) -> RemoteResult<()>
where
    R: RemoteTableRepository + ?Sized,
{
    let batches = plan_delete_batches(rows);
    if batches.is_empty() {
        return Ok(());
    }

    let outcomes =
        futures::future::join_all(batches.iter().map(|batch| repo.delete_batch(batch))).await;

    let mut first_error = None;
    for (batch, outcome) in batches.iter().zip(outcomes) {
        metrics::record_delete_batch(outcome.as_str());
        match outcome {
            BatchOutcome::Deleted => {}
            BatchOutcome::AlreadyGone => {
                tracing::debug!(
                    partition_key = %batch[0].partition_key,
                    rows = batch.len(),
                    "Rows already gone from remote table"
                );
            }
            BatchOutcome::Failed(e) => {
                tracing::warn!(
                    partition_key = %batch[0].partition_key,
                    rows = batch.len(),
                    error = %e,
                    "Failed to delete batch from remote table"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
