//! Row identities shared by the remote store, the staging buffer and the purge pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row read from the remote table that is older than the retention cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub partition_key: String,
    pub row_key: String,
    /// Last-modified time reported by the remote store.
    pub timestamp: DateTime<Utc>,
}

impl RemoteRow {
    pub fn new(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp,
        }
    }
}

/// Identity of a row waiting in the staging buffer for its remote delete.
///
/// The timestamp is dropped on purpose: a later delete only needs the keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StagingRow {
    pub partition_key: String,
    pub row_key: String,
}

impl StagingRow {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl From<&RemoteRow> for StagingRow {
    fn from(row: &RemoteRow) -> Self {
        Self::new(row.partition_key.clone(), row.row_key.clone())
    }
}

impl From<RemoteRow> for StagingRow {
    fn from(row: RemoteRow) -> Self {
        Self {
            partition_key: row.partition_key,
            row_key: row.row_key,
        }
    }
}
