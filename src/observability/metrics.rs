//! Prometheus metrics for purge runs.
//!
//! Provides counters for:
//! - Rows staged from and purged in each target table
//! - Remote delete batch outcomes
//! - Per-target run results

#[cfg(feature = "prometheus")]
use metrics::counter;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen_address)
        .install()?;

    tracing::info!(address = %config.listen_address, "Prometheus metrics listener started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record identifiers copied from a remote table into staging.
pub fn record_rows_staged(target: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_rows_staged_total", "target" => target.to_string()).increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (target, count);
    }
}

/// Record identifiers removed from staging after their remote delete.
///
/// Includes identifiers the remote store reported as already gone.
pub fn record_rows_unstaged(target: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_rows_unstaged_total", "target" => target.to_string()).increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (target, count);
    }
}

/// Record the outcome of one remote delete batch.
///
/// # Arguments
/// * `outcome` - `deleted`, `already_gone` or `failed`
pub fn record_delete_batch(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_delete_batches_total", "outcome" => outcome.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Record a finished target run (`success` or `error`).
pub fn record_target_run(status: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_target_runs_total", "status" => status.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = status;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
