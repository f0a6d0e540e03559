#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use secnews_aggregator::store::{NewsStore, RecordFilter};
use secnews_aggregator::{
    Category, FeedFetcher, FeedSource, FetchError, ItemNormalizer, NewsRecord, RawEntry, RecordPatch, StoreError,
    StoreResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Answers from a fixed table keyed by source name. Unknown sources get a 404.
#[derive(Default)]
pub struct StubFetcher {
    feeds: HashMap<String, Result<Vec<RawEntry>, u16>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, source: &str, entries: Vec<RawEntry>) -> Self {
        self.feeds.insert(source.to_string(), Ok(entries));
        self
    }

    pub fn with_failure(mut self, source: &str, status: u16) -> Self {
        self.feeds.insert(source.to_string(), Err(status));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawEntry>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.feeds.get(&source.name) {
            Some(Ok(entries)) => Ok(entries.clone()),
            Some(Err(status)) => Err(FetchError::Status {
                status: *status,
                url: source.endpoint_url.clone(),
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: source.endpoint_url.clone(),
            }),
        }
    }
}

/// Every call fails as if the database were down
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl NewsStore for FailingStore {
    async fn find(&self, _: &RecordFilter, _: usize, _: usize) -> StoreResult<Vec<NewsRecord>> {
        Err(down())
    }

    async fn find_one(&self, _: &RecordFilter) -> StoreResult<Option<NewsRecord>> {
        Err(down())
    }

    async fn insert(&self, _: &NewsRecord) -> StoreResult<String> {
        Err(down())
    }

    async fn insert_if_absent(&self, _: &NewsRecord) -> StoreResult<bool> {
        Err(down())
    }

    async fn count(&self, _: &RecordFilter) -> StoreResult<u64> {
        Err(down())
    }

    async fn update(&self, _: &str, _: &RecordPatch) -> StoreResult<Option<NewsRecord>> {
        Err(down())
    }

    async fn delete(&self, _: &str) -> StoreResult<bool> {
        Err(down())
    }

    async fn increment_views(&self, _: &str) -> StoreResult<u64> {
        Err(down())
    }
}

pub fn source(name: &str, category: Category) -> FeedSource {
    FeedSource::new(
        name,
        &format!("https://{}.test/feed", name.to_lowercase().replace(' ', "-")),
        category,
        "en",
    )
}

pub fn entry(title: &str, link: &str, published: &str) -> RawEntry {
    RawEntry {
        title: title.to_string(),
        description_html: format!("<p>{}</p>", title),
        link: link.to_string(),
        published_at_raw: Some(published.to_string()),
        categories: Vec::new(),
    }
}

/// A persisted-looking record filed under `category`, `age_minutes` old by `created_at`
pub fn stored(title: &str, link: &str, category: Category, age_minutes: i64) -> NewsRecord {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut record = ItemNormalizer::new().normalize_at(
        &entry(title, link, "2024-05-01T00:00:00Z"),
        &source("Archive", category),
        base,
    );
    record.category = category;
    record.created_at = base - Duration::minutes(age_minutes);
    record.updated_at = record.created_at;
    record
}
