//! Purge pipeline configuration.
//!
//! # Example
//!
//! ```toml
//! [purge]
//! retention_days = 30
//! page_size = 1000
//! staging_capacity = 1000000
//! drain_chunk_size = 10000
//! request_timeout_secs = 60
//! fail_fast = false
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::{
    purge::PurgeSettings,
    remote::{DEFAULT_PAGE_SIZE, azure::MAX_PAGE_SIZE},
};

/// Settings shared by every target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Rows last modified more than this many days before the start of
    /// today (UTC) are purged.
    /// Default: 30
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Rows requested per remote page. The store caps pages at 1000.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Refilling stops once this many identifiers are staged.
    #[serde(default = "default_staging_capacity")]
    pub staging_capacity: u64,

    /// Identifiers drained per delete round.
    #[serde(default = "default_drain_chunk_size")]
    pub drain_chunk_size: usize,

    /// Timeout for each HTTP request to the remote store.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Stop at the first failing target instead of moving on to the next one.
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            page_size: default_page_size(),
            staging_capacity: default_staging_capacity(),
            drain_chunk_size: default_drain_chunk_size(),
            request_timeout_secs: default_request_timeout_secs(),
            fail_fast: false,
        }
    }
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days == 0 {
            return Err(ConfigError::Validation(
                "purge.retention_days must be greater than 0".into(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::Validation(format!(
                "purge.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.staging_capacity == 0 {
            return Err(ConfigError::Validation(
                "purge.staging_capacity must be greater than 0".into(),
            ));
        }
        if self.drain_chunk_size == 0 {
            return Err(ConfigError::Validation(
                "purge.drain_chunk_size must be greater than 0".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "purge.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settings(&self) -> PurgeSettings {
        PurgeSettings {
            page_size: self.page_size,
            staging_capacity: self.staging_capacity,
            drain_chunk_size: self.drain_chunk_size,
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_staging_capacity() -> u64 {
    PurgeSettings::default().staging_capacity
}

fn default_drain_chunk_size() -> usize {
    PurgeSettings::default().drain_chunk_size
}

fn default_request_timeout_secs() -> u64 {
    60
}
