//! Drives the purge of every configured target, one after another.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    config::{PurgerConfig, StorageAccountConfig},
    observability::metrics,
    purge::{PurgeAgent, PurgeError, PurgeResult, PurgeSettings, PurgeSummary, TargetId},
    remote::{
        AzureTableRepository, RemoteTableRepository,
        azure::{AzureTableSettings, RetentionWindow},
    },
    staging::{StagingDatabase, StagingRepository},
};

/// Opens the repositories used to purge one target.
#[async_trait]
pub trait TargetRepositories: Send + Sync {
    async fn remote(&self, target: &TargetId) -> PurgeResult<Arc<dyn RemoteTableRepository>>;

    /// Open the staging buffer, creating it when missing.
    async fn staging(&self, target: &TargetId) -> PurgeResult<Arc<dyn StagingRepository>>;

    /// Identifiers currently staged, or `None` when the target has no buffer.
    async fn staged_rows(&self, target: &TargetId) -> PurgeResult<Option<u64>>;
}

/// Azure tables staged in a shared SQLite database.
pub struct AzureTargets {
    accounts: HashMap<String, StorageAccountConfig>,
    client: reqwest::Client,
    retention: RetentionWindow,
    staging: StagingDatabase,
}

impl AzureTargets {
    pub async fn from_config(config: &PurgerConfig) -> PurgeResult<Self> {
        let client = AzureTableRepository::http_client(config.purge.request_timeout())?;
        let staging = StagingDatabase::open(&config.staging).await?;
        let accounts = config
            .storage_accounts
            .iter()
            .map(|a| (a.name.clone(), a.clone()))
            .collect();

        Ok(Self {
            accounts,
            client,
            retention: RetentionWindow::days(config.purge.retention_days),
            staging,
        })
    }

    pub async fn close(&self) {
        self.staging.close().await;
    }
}

#[async_trait]
impl TargetRepositories for AzureTargets {
    async fn remote(&self, target: &TargetId) -> PurgeResult<Arc<dyn RemoteTableRepository>> {
        let account = self
            .accounts
            .get(&target.account)
            .ok_or_else(|| PurgeError::UnknownAccount(target.account.clone()))?;

        let repo = AzureTableRepository::new(
            self.client.clone(),
            AzureTableSettings {
                account: account.name.clone(),
                key: account.key.clone(),
                table: target.table.clone(),
                endpoint: account.endpoint.clone(),
                retention: self.retention,
            },
        )?;
        Ok(Arc::new(repo))
    }

    async fn staging(&self, target: &TargetId) -> PurgeResult<Arc<dyn StagingRepository>> {
        Ok(self
            .staging
            .repository(&target.account, &target.table)
            .await?)
    }

    async fn staged_rows(&self, target: &TargetId) -> PurgeResult<Option<u64>> {
        Ok(self
            .staging
            .staged_rows(&target.account, &target.table)
            .await?)
    }
}

/// How one target's run ended.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: TargetId,
    pub result: PurgeResult<PurgeSummary>,
}

/// Per-target outcomes of a run, in processing order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn rows_unstaged(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.rows_unstaged)
            .sum()
    }
}

/// What a read-only check found for one target.
#[derive(Debug)]
pub struct TargetCheck {
    pub target: TargetId,
    /// Whether the remote table holds rows past the retention cutoff.
    pub eligible: PurgeResult<bool>,
    /// Identifiers left staged by an earlier run.
    pub staged: PurgeResult<Option<u64>>,
}

async fn purge_target(
    repos: &dyn TargetRepositories,
    target: &TargetId,
    settings: PurgeSettings,
) -> PurgeResult<PurgeSummary> {
    let remote = repos.remote(target).await?;
    let staging = repos.staging(target).await?;
    PurgeAgent::for_target(target.clone(), remote, staging, settings)
        .execute()
        .await
}

/// Purge `targets` sequentially.
///
/// A failing target is recorded and the run moves on, unless `fail_fast`
/// is set, in which case the remaining targets are skipped.
pub async fn run_targets(
    repos: &dyn TargetRepositories,
    targets: &[TargetId],
    settings: PurgeSettings,
    fail_fast: bool,
) -> RunReport {
    let mut report = RunReport::default();

    for target in targets {
        let result = purge_target(repos, target, settings).await;
        match &result {
            Ok(summary) => {
                metrics::record_target_run("success");
                tracing::info!(
                    target_id = %target,
                    rows_unstaged = summary.rows_unstaged,
                    downloads = summary.downloads,
                    "Target purged"
                );
            }
            Err(e) => {
                metrics::record_target_run("error");
                tracing::error!(target_id = %target, error = %e, "Target purge failed");
            }
        }

        let failed = result.is_err();
        report.outcomes.push(TargetOutcome {
            target: target.clone(),
            result,
        });
        if failed && fail_fast {
            tracing::warn!(
                skipped = targets.len() - report.outcomes.len(),
                "Stopping after first failure"
            );
            break;
        }
    }

    report
}

/// Probe every target without changing either store.
pub async fn check_targets(
    repos: &dyn TargetRepositories,
    targets: &[TargetId],
) -> Vec<TargetCheck> {
    let mut checks = Vec::with_capacity(targets.len());

    for target in targets {
        let eligible = match repos.remote(target).await {
            Ok(remote) => remote.has_rows().await.map_err(PurgeError::from),
            Err(e) => Err(e),
        };
        let staged = repos.staged_rows(target).await;

        tracing::info!(
            target_id = %target,
            eligible = ?eligible.as_ref().ok(),
            staged = ?staged.as_ref().ok().copied().flatten(),
            "Checked target"
        );
        checks.push(TargetCheck {
            target: target.clone(),
            eligible,
            staged,
        });
    }

    checks
}

/// Purge every target in `config`.
pub async fn run(config: &PurgerConfig) -> PurgeResult<RunReport> {
    let repos = AzureTargets::from_config(config).await?;
    let targets: Vec<TargetId> = config.targets().map(|(_, t)| t).collect();

    tracing::info!(
        targets = targets.len(),
        retention_days = config.purge.retention_days,
        "Starting purge run"
    );
    let report = run_targets(
        &repos,
        &targets,
        config.purge.settings(),
        config.purge.fail_fast,
    )
    .await;
    repos.close().await;

    tracing::info!(
        targets = report.outcomes.len(),
        failed = report.failed(),
        rows_unstaged = report.rows_unstaged(),
        "Purge run finished"
    );
    Ok(report)
}

/// How [`run_until_interrupted`] ended.
#[derive(Debug)]
pub enum RunExit {
    Finished(PurgeResult<RunReport>),
    /// The interrupt fired first. Staged rows are resumed by the next run.
    Interrupted,
}

/// Purge every target in `config` unless `interrupt` resolves first.
///
/// An interrupt that fails to install (resolves to `Err`) is logged and
/// ignored; the run then continues to completion.
pub async fn run_until_interrupted<F>(config: &PurgerConfig, interrupt: F) -> RunExit
where
    F: Future<Output = std::io::Result<()>>,
{
    let interrupted = async {
        match interrupt.await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install interrupt handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        biased;

        () = interrupted => RunExit::Interrupted,
        result = run(config) => RunExit::Finished(result),
    }
}

/// Check every target in `config`.
pub async fn check(config: &PurgerConfig) -> PurgeResult<Vec<TargetCheck>> {
    let repos = AzureTargets::from_config(config).await?;
    let targets: Vec<TargetId> = config.targets().map(|(_, t)| t).collect();
    let checks = check_targets(&repos, &targets).await;
    repos.close().await;
    Ok(checks)
}
