//! The staged-deletion pipeline for one target table.
//!
//! [`PurgeAgent`] alternates between draining the staging buffer into remote
//! deletes ([`RowProcessor`]) and refilling it from the remote store
//! ([`Downloader`]) until both are empty.

mod agent;
mod downloader;
mod error;
mod processor;

use std::fmt;

pub use agent::{AgentState, PurgeAgent, PurgeSummary};
pub use downloader::{Downloader, TableDownloader};
pub use error::{PurgeError, PurgeResult};
pub use processor::{RowProcessor, StagingRowProcessor};

use crate::remote::DEFAULT_PAGE_SIZE;

/// Identifies one table in one storage account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId {
    pub account: String,
    pub table: String,
}

impl TargetId {
    pub fn new(account: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.table)
    }
}

/// Tunables for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSettings {
    /// Rows requested per remote page.
    pub page_size: u32,
    /// Refilling stops once the buffer holds at least this many rows.
    pub staging_capacity: u64,
    /// Rows drained per [`RowProcessor::process`] call. Zero is treated as one.
    pub drain_chunk_size: usize,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            staging_capacity: 1_000_000,
            drain_chunk_size: 10_000,
        }
    }
}
