//! Configuration module for the table purger.
//!
//! The purger is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [purge]
//! retention_days = 30
//!
//! [staging]
//! path = "databases/purge-staging.db"
//!
//! [[storage_accounts]]
//! name = "prodlogs"
//! key = "${PRODLOGS_KEY}"
//! table_names = ["Alerts", "Heartbeats"]
//! ```

mod accounts;
mod observability;
mod purge;
mod staging;

use std::{collections::HashSet, path::Path};

pub use accounts::*;
pub use observability::*;
pub use purge::*;
use serde::{Deserialize, Serialize};
pub use staging::*;

use crate::purge::TargetId;

/// Root configuration for the table purger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgerConfig {
    /// Pipeline tunables shared by every target.
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Local staging database.
    #[serde(default)]
    pub staging: StagingConfig,

    /// Observability configuration (logging, metrics).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Storage accounts and the tables to purge in each.
    #[serde(default)]
    pub storage_accounts: Vec<StorageAccountConfig>,
}

impl PurgerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Catch feature-gated settings before typed deserialization
        let raw: toml::Value = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        check_disabled_features(&raw)?;

        let config: PurgerConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_accounts.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[storage_accounts]] entry is required".into(),
            ));
        }

        self.purge.validate()?;
        self.staging.validate()?;
        let mut names = HashSet::new();
        for account in &self.storage_accounts {
            account.validate()?;
            if !names.insert(account.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "storage account '{}' is configured more than once; \
                     list all of its tables in a single entry",
                    account.name
                )));
            }
        }

        Ok(())
    }

    /// Every account/table pair, in configuration order.
    pub fn targets(&self) -> impl Iterator<Item = (&StorageAccountConfig, TargetId)> + '_ {
        self.storage_accounts.iter().flat_map(|account| {
            account
                .table_names
                .iter()
                .map(move |table| (account, TargetId::new(&account.name, table)))
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Check for feature-gated configuration values before typed deserialization.
fn check_disabled_features(raw: &toml::Value) -> Result<(), ConfigError> {
    let metrics_enabled = raw
        .get("observability")
        .and_then(|v| v.get("metrics"))
        .and_then(|v| v.get("enabled"))
        .and_then(|v| v.as_bool())
        == Some(true);

    if metrics_enabled && !cfg!(feature = "prometheus") {
        return Err(ConfigError::Validation(
            "observability.metrics.enabled requires the 'prometheus' feature.\n\
             Rebuild with: cargo build --features prometheus"
                .into(),
        ));
    }
    Ok(())
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
