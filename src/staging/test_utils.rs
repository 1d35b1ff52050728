//! In-memory staging buffer that records the calls made against it.
// Not every helper is used by every test module.
#![allow(dead_code)]

use std::{collections::BTreeSet, sync::Mutex};

use async_trait::async_trait;

use super::{StagingRepository, StagingResult, StagingRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingCall {
    Insert(usize),
    Delete(usize),
    GetRows(usize),
    Drop,
}

#[derive(Default)]
pub struct InMemoryStaging {
    rows: Mutex<BTreeSet<StagingRow>>,
    calls: Mutex<Vec<StagingCall>>,
    dropped: Mutex<bool>,
}

impl InMemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = StagingRow>) -> Self {
        let staging = Self::default();
        staging.rows.lock().unwrap().extend(rows);
        staging
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn rows(&self) -> Vec<StagingRow> {
        self.rows.lock().unwrap().iter().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StagingCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inserts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StagingCall::Insert(_)))
            .count()
    }

    pub fn was_dropped(&self) -> bool {
        *self.dropped.lock().unwrap()
    }

    fn record(&self, call: StagingCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StagingRepository for InMemoryStaging {
    async fn has_rows(&self) -> StagingResult<bool> {
        Ok(!self.rows.lock().unwrap().is_empty())
    }

    async fn count_rows(&self) -> StagingResult<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn get_rows(&self, limit: usize) -> StagingResult<Vec<StagingRow>> {
        self.record(StagingCall::GetRows(limit));
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert(&self, rows: &[StagingRow]) -> StagingResult<()> {
        self.record(StagingCall::Insert(rows.len()));
        *self.dropped.lock().unwrap() = false;
        self.rows.lock().unwrap().extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete(&self, rows: &[StagingRow]) -> StagingResult<()> {
        self.record(StagingCall::Delete(rows.len()));
        let mut staged = self.rows.lock().unwrap();
        for row in rows {
            staged.remove(row);
        }
        Ok(())
    }

    async fn drop_table(&self) -> StagingResult<()> {
        self.record(StagingCall::Drop);
        self.rows.lock().unwrap().clear();
        *self.dropped.lock().unwrap() = true;
        Ok(())
    }
}
