//! In-memory remote table for exercising the purge pipeline without a network.
//!
//! Mirrors the store's batch rules: a batch touching more than one partition
//! or more than [`MAX_BATCH_SIZE`] rows is rejected, and a batch referencing
//! a missing row deletes nothing and reports [`BatchOutcome::AlreadyGone`].
// Not every helper is used by every test module.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{
    BatchOutcome, ContinuationToken, MAX_BATCH_SIZE, RemoteError, RemoteResult,
    RemoteTableRepository, RowPage,
};
use crate::models::{RemoteRow, StagingRow};

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryTable {
    rows: Mutex<BTreeMap<Key, RemoteRow>>,
    failing_partitions: Mutex<HashSet<String>>,
    failing_reads: Mutex<bool>,
    page_limit: Mutex<Option<u32>>,
    page_sizes: Mutex<Vec<u32>>,
    delete_batches: Mutex<Vec<Vec<StagingRow>>>,
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `count` eligible rows under `partition_key`.
    pub fn insert_partition(&self, partition_key: &str, count: usize) {
        let timestamp = Utc::now() - Duration::days(90);
        let mut rows = self.rows.lock().unwrap();
        for i in 0..count {
            let row_key = format!("{partition_key}-{i:05}");
            rows.insert(
                (partition_key.to_string(), row_key.clone()),
                RemoteRow::new(partition_key, row_key, timestamp),
            );
        }
    }

    /// Make every batch delete for `partition_key` fail with a server error.
    pub fn fail_partition(&self, partition_key: &str) {
        self.failing_partitions
            .lock()
            .unwrap()
            .insert(partition_key.to_string());
    }

    pub fn heal_partition(&self, partition_key: &str) {
        self.failing_partitions.lock().unwrap().remove(partition_key);
    }

    /// Make every read fail with a server error.
    pub fn fail_reads(&self, fail: bool) {
        *self.failing_reads.lock().unwrap() = fail;
    }

    /// Cap the rows returned per page regardless of the requested page size.
    pub fn set_page_limit(&self, limit: u32) {
        *self.page_limit.lock().unwrap() = Some(limit);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn staging_rows(&self) -> Vec<StagingRow> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .map(StagingRow::from)
            .collect()
    }

    /// Page sizes requested by every `get_rows` call, in call order.
    pub fn page_sizes(&self) -> Vec<u32> {
        self.page_sizes.lock().unwrap().clone()
    }

    /// Every batch passed to `delete_batch`, in call order.
    pub fn delete_batches(&self) -> Vec<Vec<StagingRow>> {
        self.delete_batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTableRepository for InMemoryTable {
    async fn get_rows(
        &self,
        token: Option<&ContinuationToken>,
        page_size: u32,
    ) -> RemoteResult<RowPage> {
        self.page_sizes.lock().unwrap().push(page_size);
        if *self.failing_reads.lock().unwrap() {
            return Err(RemoteError::status(503, "Server Busy"));
        }

        let offset: usize = match token {
            Some(token) => token
                .as_str()
                .parse()
                .map_err(|_| RemoteError::InvalidResponse("bad token".to_string()))?,
            None => 0,
        };
        let limit = match *self.page_limit.lock().unwrap() {
            Some(cap) => page_size.min(cap),
            None => page_size,
        } as usize;

        let rows = self.rows.lock().unwrap();
        let page: Vec<RemoteRow> = rows.values().skip(offset).take(limit).cloned().collect();
        let consumed = offset + page.len();
        let next = (consumed < rows.len()).then(|| ContinuationToken::new(consumed.to_string()));

        Ok(RowPage::new(page, next))
    }

    async fn delete_batch(&self, batch: &[StagingRow]) -> BatchOutcome {
        self.delete_batches.lock().unwrap().push(batch.to_vec());

        let Some(first) = batch.first() else {
            return BatchOutcome::Deleted;
        };
        if batch.len() > MAX_BATCH_SIZE
            || batch.iter().any(|r| r.partition_key != first.partition_key)
        {
            return BatchOutcome::Failed(RemoteError::status(400, "InvalidBatch"));
        }
        if self
            .failing_partitions
            .lock()
            .unwrap()
            .contains(&first.partition_key)
        {
            return BatchOutcome::Failed(RemoteError::status(500, "InternalError"));
        }

        let mut rows = self.rows.lock().unwrap();
        let all_present = batch
            .iter()
            .all(|r| rows.contains_key(&(r.partition_key.clone(), r.row_key.clone())));
        if !all_present {
            // The store applies a batch atomically
            return BatchOutcome::AlreadyGone;
        }
        for r in batch {
            rows.remove(&(r.partition_key.clone(), r.row_key.clone()));
        }
        BatchOutcome::Deleted
    }
}
