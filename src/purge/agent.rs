use std::sync::Arc;

use super::{
    Downloader, PurgeError, PurgeResult, PurgeSettings, RowProcessor, StagingRowProcessor, TableDownloader,
    TargetId,
};
use crate::{remote::RemoteTableRepository, staging::StagingRepository};

/// Where the agent is in its control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Deleting staged rows until the buffer is empty.
    Draining,
    /// Probing the remote store for eligible rows.
    CheckingRemote,
    /// Refilling the buffer from the remote store.
    Downloading,
    /// Both stores were empty and the buffer has been dropped.
    Terminated,
}

/// Counters for one [`PurgeAgent::execute`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub iterations: u64,
    pub downloads: u64,
    /// Identifiers removed from staging after their remote delete.
    ///
    /// Rows the store reported as already gone are included, and a row that
    /// is staged again by a later scan is counted again.
    pub rows_unstaged: u64,
}

/// Drives the purge of one target until both stores are empty.
pub struct PurgeAgent {
    target: TargetId,
    remote: Arc<dyn RemoteTableRepository>,
    staging: Arc<dyn StagingRepository>,
    downloader: Arc<dyn Downloader>,
    processor: Arc<dyn RowProcessor>,
    settings: PurgeSettings,
    state: AgentState,
    summary: PurgeSummary,
}

impl PurgeAgent {
    pub fn new(
        target: TargetId,
        remote: Arc<dyn RemoteTableRepository>,
        staging: Arc<dyn StagingRepository>,
        downloader: Arc<dyn Downloader>,
        processor: Arc<dyn RowProcessor>,
        settings: PurgeSettings,
    ) -> Self {
        Self {
            target,
            remote,
            staging,
            downloader,
            processor,
            settings,
            state: AgentState::Draining,
            summary: PurgeSummary::default(),
        }
    }

    /// Wire an agent with the standard downloader and row processor.
    pub fn for_target(
        target: TargetId,
        remote: Arc<dyn RemoteTableRepository>,
        staging: Arc<dyn StagingRepository>,
        settings: PurgeSettings,
    ) -> Self {
        let downloader = Arc::new(TableDownloader::new(
            target.clone(),
            remote.clone(),
            staging.clone(),
            settings.page_size,
        ));
        let processor = Arc::new(StagingRowProcessor::new(
            target.clone(),
            remote.clone(),
            staging.clone(),
        ));
        Self::new(target, remote, staging, downloader, processor, settings)
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn summary(&self) -> PurgeSummary {
        self.summary
    }

    fn transition(&mut self, next: AgentState) {
        tracing::debug!(
            target_id = %self.target,
            from = ?self.state,
            to = ?next,
            "Agent state change"
        );
        self.state = next;
    }

    /// Run one drain / check / refill cycle.
    ///
    /// Returns `false` once both the buffer and the remote store are empty; the
    /// buffer has then been dropped. Returns `true` after a refill.
    pub async fn iteration(&mut self) -> PurgeResult<bool> {
        if self.state == AgentState::Terminated {
            return Ok(false);
        }
        self.summary.iterations += 1;

        if self.state != AgentState::Draining {
            self.transition(AgentState::Draining);
        }
        let chunk_size = self.settings.drain_chunk_size.max(1);
        while self.staging.has_rows().await? {
            let drained = self.processor.process(chunk_size).await?;
            if drained == 0 {
                return Err(PurgeError::DrainStalled);
            }
            self.summary.rows_unstaged += drained as u64;
        }

        self.transition(AgentState::CheckingRemote);
        if !self.remote.has_rows().await? {
            self.staging.drop_table().await?;
            self.transition(AgentState::Terminated);
            return Ok(false);
        }

        self.transition(AgentState::Downloading);
        self.downloader
            .download(self.settings.staging_capacity)
            .await?;
        self.summary.downloads += 1;
        self.transition(AgentState::Draining);
        Ok(true)
    }

    /// Iterate until there is nothing left to purge.
    pub async fn execute(&mut self) -> PurgeResult<PurgeSummary> {
        tracing::info!(target_id = %self.target, "Purging table");

        while self.iteration().await? {
            tracing::debug!(
                target_id = %self.target,
                iterations = self.summary.iterations,
                rows_unstaged = self.summary.rows_unstaged,
                "Purge iteration complete"
            );
        }

        tracing::info!(
            target_id = %self.target,
            iterations = self.summary.iterations,
            downloads = self.summary.downloads,
            rows_unstaged = self.summary.rows_unstaged,
            "Table purged"
        );
        Ok(self.summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        models::StagingRow,
        remote::test_utils::InMemoryTable,
        staging::test_utils::{InMemoryStaging, StagingCall},
    };

    /// Counts calls and forwards to a real downloader.
    struct CountingDownloader {
        inner: TableDownloader,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Downloader for CountingDownloader {
        async fn download(&self, capacity: u64) -> PurgeResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.download(capacity).await
        }
    }

    /// Reports an empty drain while rows stay staged.
    struct StalledProcessor;

    #[async_trait]
    impl RowProcessor for StalledProcessor {
        async fn process(&self, _max_rows: usize) -> PurgeResult<usize> {
            Ok(0)
        }
    }

    fn settings() -> PurgeSettings {
        PurgeSettings {
            page_size: 40,
            staging_capacity: 100,
            drain_chunk_size: 30,
        }
    }

    fn counting_agent(
        remote: Arc<InMemoryTable>,
        staging: Arc<InMemoryStaging>,
    ) -> (PurgeAgent, Arc<CountingDownloader>) {
        let target = TargetId::new("acct", "Alerts");
        let downloader = Arc::new(CountingDownloader {
            inner: TableDownloader::new(
                target.clone(),
                remote.clone(),
                staging.clone(),
                settings().page_size,
            ),
            calls: AtomicUsize::new(0),
        });
        let processor = Arc::new(StagingRowProcessor::new(
            target.clone(),
            remote.clone(),
            staging.clone(),
        ));
        let agent = PurgeAgent::new(
            target,
            remote,
            staging,
            downloader.clone(),
            processor,
            settings(),
        );
        (agent, downloader)
    }

    #[tokio::test]
    async fn test_empty_stores_terminate_and_drop() {
        let remote = Arc::new(InMemoryTable::new());
        let staging = Arc::new(InMemoryStaging::new());
        let (mut agent, downloader) = counting_agent(remote.clone(), staging.clone());

        assert!(!agent.iteration().await.unwrap());
        assert_eq!(agent.state(), AgentState::Terminated);
        assert!(staging.was_dropped());
        assert_eq!(staging.inserts(), 0);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);

        // Terminated agents stay terminated without touching either store
        let calls = staging.calls().len();
        assert!(!agent.iteration().await.unwrap());
        assert_eq!(staging.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_iteration_downloads_exactly_once_when_remote_has_rows() {
        let remote = Arc::new(InMemoryTable::new());
        remote.insert_partition("A", 10);
        let staging = Arc::new(InMemoryStaging::new());
        let (mut agent, downloader) = counting_agent(remote.clone(), staging.clone());

        assert!(agent.iteration().await.unwrap());
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(staging.len(), 10);
        assert!(!staging.was_dropped());
        assert_eq!(agent.state(), AgentState::Draining);
    }

    #[tokio::test]
    async fn test_drains_backlog_in_chunks_before_checking_remote() {
        let remote = Arc::new(InMemoryTable::new());
        remote.insert_partition("A", 70);
        let staging = Arc::new(InMemoryStaging::with_rows(remote.staging_rows()));
        let (mut agent, downloader) = counting_agent(remote.clone(), staging.clone());

        assert!(!agent.iteration().await.unwrap());

        let chunk_reads: Vec<_> = staging
            .calls()
            .into_iter()
            .filter(|c| matches!(c, StagingCall::GetRows(_)))
            .collect();
        assert_eq!(chunk_reads, vec![StagingCall::GetRows(30); 3]);
        assert_eq!(agent.summary().rows_unstaged, 70);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert!(staging.was_dropped());
    }

    #[tokio::test]
    async fn test_execute_purges_everything() {
        let remote = Arc::new(InMemoryTable::new());
        remote.insert_partition("A", 150);
        remote.insert_partition("B", 120);
        let staging = Arc::new(InMemoryStaging::new());
        let (mut agent, downloader) = counting_agent(remote.clone(), staging.clone());

        let summary = agent.execute().await.unwrap();

        assert_eq!(remote.len(), 0);
        assert!(staging.was_dropped());
        assert_eq!(summary.rows_unstaged, 270);
        // Capacity 100 with pages of 40 stages 120 rows per download
        assert_eq!(summary.downloads, 3);
        assert_eq!(summary.iterations, 4);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 3);
        assert_eq!(agent.state(), AgentState::Terminated);
    }

    #[tokio::test]
    async fn test_delete_failure_aborts_and_resumes() {
        let remote = Arc::new(InMemoryTable::new());
        remote.insert_partition("A", 20);
        remote.fail_partition("A");
        let staging = Arc::new(InMemoryStaging::with_rows(vec![StagingRow::new(
            "A", "A-00000",
        )]));
        let mut agent = PurgeAgent::for_target(
            TargetId::new("acct", "Alerts"),
            remote.clone(),
            staging.clone(),
            settings(),
        );

        let result = agent.execute().await;
        assert!(matches!(result, Err(PurgeError::Remote(_))));
        assert_eq!(staging.len(), 1);
        assert!(!staging.was_dropped());

        remote.heal_partition("A");
        let summary = agent.execute().await.unwrap();
        assert_eq!(remote.len(), 0);
        assert!(staging.was_dropped());
        assert_eq!(summary.rows_unstaged, 20);
    }

    #[tokio::test]
    async fn test_zero_drain_chunk_still_makes_progress() {
        let remote = Arc::new(InMemoryTable::new());
        remote.insert_partition("A", 3);
        let staging = Arc::new(InMemoryStaging::with_rows(remote.staging_rows()));
        let mut agent = PurgeAgent::for_target(
            TargetId::new("acct", "Alerts"),
            remote.clone(),
            staging.clone(),
            PurgeSettings {
                drain_chunk_size: 0,
                ..settings()
            },
        );

        let summary = agent.execute().await.unwrap();

        assert_eq!(summary.rows_unstaged, 3);
        assert_eq!(remote.len(), 0);
        assert!(staging.calls().contains(&StagingCall::GetRows(1)));
    }

    #[tokio::test]
    async fn test_drain_without_progress_fails() {
        let remote = Arc::new(InMemoryTable::new());
        remote.insert_partition("A", 5);
        let staging = Arc::new(InMemoryStaging::with_rows(remote.staging_rows()));
        let target = TargetId::new("acct", "Alerts");
        let downloader = Arc::new(TableDownloader::new(
            target.clone(),
            remote.clone(),
            staging.clone(),
            40,
        ));
        let mut agent = PurgeAgent::new(
            target,
            remote.clone(),
            staging.clone(),
            downloader,
            Arc::new(StalledProcessor),
            settings(),
        );

        let result = agent.iteration().await;

        assert!(matches!(result, Err(PurgeError::DrainStalled)));
        assert_eq!(staging.len(), 5);
        assert_eq!(remote.len(), 5);
    }
}
