use super::{NewsStore, RecordFilter};
use crate::types::{NewsRecord, RecordPatch, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-process store, for runs without a database and for tests
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<NewsRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<NewsRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<NewsRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn find(&self, filter: &RecordFilter, limit: usize, offset: usize) -> StoreResult<Vec<NewsRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<NewsRecord> = records.iter().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_one(&self, filter: &RecordFilter) -> StoreResult<Option<NewsRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| filter.matches(r)).cloned())
    }

    async fn insert(&self, record: &NewsRecord) -> StoreResult<String> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.url == record.url) {
            return Err(StoreError::Conflict {
                url: record.url.clone(),
            });
        }
        records.push(record.clone());
        Ok(record.id.clone())
    }

    async fn insert_if_absent(&self, record: &NewsRecord) -> StoreResult<bool> {
        // Check and insert under one write lock
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.url == record.url) {
            debug!("Skipping existing url: {}", record.url);
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn count(&self, filter: &RecordFilter) -> StoreResult<u64> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn update(&self, id: &str, patch: &RecordPatch) -> StoreResult<Option<NewsRecord>> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                patch.apply(record, Utc::now());
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn increment_views(&self, id: &str) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.view_count += 1;
                record.updated_at = Utc::now();
                Ok(record.view_count)
            }
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }
}
