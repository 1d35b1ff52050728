use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use super::{PurgeResult, TargetId};
use crate::{
    models::StagingRow, observability::metrics, remote::RemoteTableRepository,
    staging::StagingRepository,
};

/// Drains staged identifiers into remote deletes.
#[async_trait]
pub trait RowProcessor: Send + Sync {
    /// Delete up to `max_rows` staged rows remotely, then unstage them.
    ///
    /// Returns the number of identifiers drained. On error nothing is
    /// unstaged, so the same rows are attempted again on the next call.
    async fn process(&self, max_rows: usize) -> PurgeResult<usize>;
}

pub struct StagingRowProcessor {
    target: TargetId,
    remote: Arc<dyn RemoteTableRepository>,
    staging: Arc<dyn StagingRepository>,
}

impl StagingRowProcessor {
    pub fn new(
        target: TargetId,
        remote: Arc<dyn RemoteTableRepository>,
        staging: Arc<dyn StagingRepository>,
    ) -> Self {
        Self {
            target,
            remote,
            staging,
        }
    }
}

/// Group rows by partition key.
fn group_by_partition(rows: &[StagingRow]) -> BTreeMap<&str, Vec<StagingRow>> {
    let mut groups: BTreeMap<&str, Vec<StagingRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(row.partition_key.as_str())
            .or_default()
            .push(row.clone());
    }
    groups
}

#[async_trait]
impl RowProcessor for StagingRowProcessor {
    async fn process(&self, max_rows: usize) -> PurgeResult<usize> {
        let rows = self.staging.get_rows(max_rows).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let groups = group_by_partition(&rows);
        for (partition_key, group) in &groups {
            tracing::trace!(
                target_id = %self.target,
                partition_key,
                rows = group.len(),
                "Deleting partition group"
            );
            self.remote.delete(group).await?;
        }

        self.staging.delete(&rows).await?;
        metrics::record_rows_unstaged(&self.target.to_string(), rows.len() as u64);

        tracing::debug!(
            target_id = %self.target,
            rows = rows.len(),
            partitions = groups.len(),
            "Drained staging chunk"
        );
        Ok(rows.len())
    }
}
