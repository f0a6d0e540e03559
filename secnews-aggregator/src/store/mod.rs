pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgNewsStore;

use crate::types::{Category, NewsRecord, RecordPatch, StoreResult};
use async_trait::async_trait;

/// Equality filter over `NewsRecord` fields. `None` means "don't care".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub id: Option<String>,
    pub url: Option<String>,
    pub published: Option<bool>,
    pub category: Option<Category>,
    pub breaking: Option<bool>,
}

impl RecordFilter {
    pub fn published() -> Self {
        Self {
            published: Some(true),
            ..Self::default()
        }
    }

    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    pub fn with_breaking(mut self, breaking: bool) -> Self {
        self.breaking = Some(breaking);
        self
    }

    pub fn matches(&self, record: &NewsRecord) -> bool {
        self.id.as_ref().map_or(true, |id| &record.id == id)
            && self.url.as_ref().map_or(true, |url| &record.url == url)
            && self.published.map_or(true, |p| record.is_published == p)
            && self.category.map_or(true, |c| record.category == c)
            && self.breaking.map_or(true, |b| record.is_breaking == b)
    }
}

/// Keyed collection of news records, unique on `url`.
///
/// The sync path only ever calls `insert_if_absent`; `insert`, `update` and
/// `delete` exist for the admin boundary and `increment_views` for read
/// tracking.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Records matching `filter`, newest `created_at` first where the store can order
    async fn find(&self, filter: &RecordFilter, limit: usize, offset: usize) -> StoreResult<Vec<NewsRecord>>;

    async fn find_one(&self, filter: &RecordFilter) -> StoreResult<Option<NewsRecord>>;

    /// Plain insert; a duplicate `url` is `StoreError::Conflict`
    async fn insert(&self, record: &NewsRecord) -> StoreResult<String>;

    /// Atomic insert keyed on `url`. Returns false when the url already exists.
    async fn insert_if_absent(&self, record: &NewsRecord) -> StoreResult<bool>;

    async fn count(&self, filter: &RecordFilter) -> StoreResult<u64>;

    async fn update(&self, id: &str, patch: &RecordPatch) -> StoreResult<Option<NewsRecord>>;

    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Bumps `view_count` and returns the new value
    async fn increment_views(&self, id: &str) -> StoreResult<u64>;
}
