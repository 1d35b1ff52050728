use std::sync::Arc;

use async_trait::async_trait;

use super::{PurgeResult, TargetId};
use crate::{
    models::StagingRow,
    observability::metrics,
    remote::{ContinuationToken, RemoteTableRepository},
    staging::StagingRepository,
};

/// Refills the staging buffer from the remote store.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stage eligible rows until the buffer holds `capacity` rows or the scan ends.
    ///
    /// Returns `false` when the remote store had nothing eligible.
    async fn download(&self, capacity: u64) -> PurgeResult<bool>;
}

pub struct TableDownloader {
    target: TargetId,
    remote: Arc<dyn RemoteTableRepository>,
    staging: Arc<dyn StagingRepository>,
    page_size: u32,
}

impl TableDownloader {
    pub fn new(
        target: TargetId,
        remote: Arc<dyn RemoteTableRepository>,
        staging: Arc<dyn StagingRepository>,
        page_size: u32,
    ) -> Self {
        Self {
            target,
            remote,
            staging,
            page_size,
        }
    }
}

#[async_trait]
impl Downloader for TableDownloader {
    async fn download(&self, capacity: u64) -> PurgeResult<bool> {
        if !self.remote.has_rows().await? {
            return Ok(false);
        }

        // Every download starts a fresh scan: eligibility moves with the clock
        let mut token: Option<ContinuationToken> = None;
        let mut pages = 0usize;
        let mut staged = 0usize;

        while self.staging.count_rows().await? < capacity {
            let page = self.remote.get_rows(token.as_ref(), self.page_size).await?;
            if page.rows.is_empty() {
                break;
            }
            pages += 1;

            let rows: Vec<StagingRow> = page.rows.into_iter().map(StagingRow::from).collect();
            self.staging.insert(&rows).await?;
            staged += rows.len();
            metrics::record_rows_staged(&self.target.to_string(), rows.len() as u64);

            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            target_id = %self.target,
            pages,
            rows = staged,
            capacity,
            "Download finished"
        );
        Ok(true)
    }
}
