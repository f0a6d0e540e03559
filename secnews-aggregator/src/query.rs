use crate::counts::CountAggregator;
use crate::live::{self, LiveOptions};
use crate::normalizer::ItemNormalizer;
use crate::store::{NewsStore, RecordFilter};
use crate::traits::FeedFetcher;
use crate::types::{Category, FeedSource, NewsRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_BREAKING_LIMIT: usize = 5;

/// Opaque pagination token over the persisted result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    offset: usize,
}

impl Cursor {
    pub fn at(offset: usize) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{:x}", self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cursor: {0}")]
pub struct InvalidCursor(String);

impl FromStr for Cursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('c')
            .and_then(|hex| usize::from_str_radix(hex, 16).ok())
            .map(Cursor::at)
            .ok_or_else(|| InvalidCursor(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// `None` means every category
    pub category: Option<Category>,
    pub search: Option<String>,
    pub page_size: usize,
    pub cursor: Option<String>,
}

impl ListRequest {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn search(mut self, term: &str) -> Self {
        self.search = Some(term.to_string());
        self
    }

    pub fn cursor(mut self, cursor: &str) -> Self {
        self.cursor = Some(cursor.to_string());
        self
    }
}

/// "all" (or nothing) selects every category
pub fn parse_category_filter(raw: Option<&str>) -> Result<Option<Category>, crate::types::UnknownVariant> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

/// Where the records of a page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeMode {
    Persisted,
    Blended,
    LiveOnly,
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsPage {
    pub records: Vec<NewsRecord>,
    pub next_cursor: Option<String>,
    pub mode: ServeMode,
}

/// Result of the persisted read that drives the fallback decision
#[derive(Debug)]
pub enum StoreRead {
    /// The store filled the page
    Ok(Vec<NewsRecord>),
    /// The store answered but came up short
    Degraded(Vec<NewsRecord>, String),
    /// The store could not be read
    Empty(String),
}

impl StoreRead {
    pub fn classify(result: Result<Vec<NewsRecord>, String>, page_size: usize) -> Self {
        match result {
            Ok(records) if records.len() >= page_size => StoreRead::Ok(records),
            Ok(records) => {
                let reason = format!("store returned {} of {}", records.len(), page_size);
                StoreRead::Degraded(records, reason)
            }
            Err(reason) => StoreRead::Empty(reason),
        }
    }

    /// How many live records the page still needs
    pub fn shortfall(&self, page_size: usize) -> usize {
        match self {
            StoreRead::Ok(_) => 0,
            StoreRead::Degraded(records, _) => page_size.saturating_sub(records.len()),
            StoreRead::Empty(_) => page_size,
        }
    }

    pub fn into_records(self) -> Vec<NewsRecord> {
        match self {
            StoreRead::Ok(records) | StoreRead::Degraded(records, _) => records,
            StoreRead::Empty(_) => Vec::new(),
        }
    }
}

impl ServeMode {
    pub fn from_parts(persisted: usize, live: usize) -> Self {
        match (persisted, live) {
            (0, 0) => ServeMode::Empty,
            (_, 0) => ServeMode::Persisted,
            (0, _) => ServeMode::LiveOnly,
            _ => ServeMode::Blended,
        }
    }
}

/// Read side of the pipeline: persisted records first, live feeds to fill gaps.
///
/// No method here returns an error. Store and fetch failures degrade the
/// answer instead.
pub struct QueryService {
    store: Arc<dyn NewsStore>,
    fetcher: Arc<dyn FeedFetcher>,
    sources: Vec<FeedSource>,
    normalizer: ItemNormalizer,
    options: LiveOptions,
    counts: CountAggregator,
    cancel: CancellationToken,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn NewsStore>,
        fetcher: Arc<dyn FeedFetcher>,
        sources: Vec<FeedSource>,
        options: LiveOptions,
    ) -> Self {
        Self {
            counts: CountAggregator::new(store.clone()),
            store,
            fetcher,
            sources,
            normalizer: ItemNormalizer::new(),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Live fetches started by this service stop when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn list_news(&self, request: &ListRequest) -> NewsPage {
        let page_size = clamp_page_size(request.page_size);
        let offset = match request.cursor.as_deref() {
            Some(raw) => raw.parse::<Cursor>().map(|c| c.offset()).unwrap_or_else(|e| {
                warn!("{}, starting from the first page", e);
                0
            }),
            None => 0,
        };

        let filter = RecordFilter::published().with_category(request.category);
        let fetched = self.store.find(&filter, page_size, offset).await;
        let store_filled_page = matches!(&fetched, Ok(records) if records.len() >= page_size);

        let read = StoreRead::classify(
            fetched
                .map(|mut records| {
                    records.sort_by(newest_first);
                    records.retain(|r| {
                        r.is_published && request.category.map_or(true, |c| r.category == c)
                    });
                    records
                })
                .map_err(|e| e.to_string()),
            page_size,
        );

        let needed = read.shortfall(page_size);
        match &read {
            StoreRead::Ok(_) => {}
            StoreRead::Degraded(_, reason) => debug!("Topping up from live feeds: {}", reason),
            StoreRead::Empty(reason) => warn!("Store read failed, serving live feeds: {}", reason),
        }

        let store_reachable = !matches!(read, StoreRead::Empty(_));
        let mut records = read.into_records();
        let persisted = records.len();

        if needed > 0 {
            let on_page: HashSet<String> = records.iter().map(|r| r.url.clone()).collect();
            let candidates = self
                .live_records(|r| request.category.map_or(true, |c| r.category == c))
                .await;

            // Persisted urls belong to other pages of the stored set
            let mut live = Vec::with_capacity(needed);
            for record in candidates {
                if live.len() == needed {
                    break;
                }
                if !record.url.is_empty()
                    && (on_page.contains(&record.url) || (store_reachable && self.is_persisted(&record.url).await))
                {
                    continue;
                }
                live.push(record);
            }
            records.extend(live);
        }
        let live_count = records.len() - persisted;

        if let Some(term) = request.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = term.to_lowercase();
            records.retain(|r| r.matches_search(&needle));
        }

        let next_cursor = store_filled_page.then(|| Cursor::at(offset + page_size).to_string());
        let mode = ServeMode::from_parts(persisted, live_count);

        info!(
            "Served {} records ({} persisted, {} live, {:?})",
            records.len(),
            persisted,
            live_count,
            mode
        );

        NewsPage {
            records,
            next_cursor,
            mode,
        }
    }

    /// Newest breaking records; live breaking records if the store is down
    pub async fn list_breaking(&self, limit: usize) -> Vec<NewsRecord> {
        let limit = match limit {
            0 => DEFAULT_BREAKING_LIMIT,
            n => n.min(MAX_PAGE_SIZE),
        };
        let filter = RecordFilter::published().with_breaking(true);

        match self.store.find(&filter, limit, 0).await {
            Ok(mut records) => {
                records.retain(|r| r.is_published && r.is_breaking);
                records.sort_by(newest_first);
                records.truncate(limit);
                records
            }
            Err(e) => {
                warn!("Store read failed, serving live breaking news: {}", e);
                let mut records = self.live_records(|r| r.is_breaking).await;
                records.truncate(limit);
                records
            }
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Option<NewsRecord> {
        let filter = RecordFilter {
            published: Some(true),
            ..RecordFilter::by_id(id)
        };

        match self.store.find_one(&filter).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Lookup of {} failed: {}", id, e);
                None
            }
        }
    }

    pub async fn counts(&self) -> BTreeMap<String, u64> {
        self.counts.counts().await
    }

    async fn is_persisted(&self, url: &str) -> bool {
        match self.store.find_one(&RecordFilter::by_url(url)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                debug!("Could not check {} against the store: {}", url, e);
                false
            }
        }
    }

    async fn live_records(&self, keep: impl Fn(&NewsRecord) -> bool) -> Vec<NewsRecord> {
        let cancel = self.cancel.child_token();
        let batch = live::collect(&self.sources, self.fetcher.as_ref(), &self.normalizer, self.options, &cancel).await;
        batch.records.into_iter().filter(|r| keep(r)).collect()
    }
}

fn newest_first(a: &NewsRecord, b: &NewsRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.published_at.cmp(&a.published_at))
}

fn clamp_page_size(page_size: usize) -> usize {
    if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.min(MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_is_opaque_but_reversible() {
        let cursor = Cursor::at(40);
        let encoded = cursor.to_string();
        assert_ne!(encoded, "40");
        assert_eq!(encoded.parse::<Cursor>().unwrap(), cursor);
        assert!("garbage".parse::<Cursor>().is_err());
    }

    #[test]
    fn shortfall_drives_the_top_up() {
        assert_eq!(StoreRead::classify(Ok(Vec::new()), 5).shortfall(5), 5);
        assert_eq!(StoreRead::classify(Err("down".into()), 5).shortfall(5), 5);
        assert!(matches!(
            StoreRead::classify(Err("down".into()), 5),
            StoreRead::Empty(_)
        ));
        assert!(matches!(
            StoreRead::classify(Ok(Vec::new()), 5),
            StoreRead::Degraded(_, _)
        ));
    }

    #[test]
    fn serve_mode_reflects_origin() {
        assert_eq!(ServeMode::from_parts(0, 0), ServeMode::Empty);
        assert_eq!(ServeMode::from_parts(3, 0), ServeMode::Persisted);
        assert_eq!(ServeMode::from_parts(0, 3), ServeMode::LiveOnly);
        assert_eq!(ServeMode::from_parts(2, 3), ServeMode::Blended);
    }

    #[test]
    fn all_means_no_category_filter() {
        assert_eq!(parse_category_filter(Some("all")).unwrap(), None);
        assert_eq!(parse_category_filter(None).unwrap(), None);
        assert_eq!(
            parse_category_filter(Some("Education")).unwrap(),
            Some(Category::Education)
        );
        assert!(parse_category_filter(Some("gossip")).is_err());
    }

    #[test]
    fn page_size_is_bounded() {
        assert_eq!(clamp_page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(1000), MAX_PAGE_SIZE);
        assert_eq!(clamp_page_size(7), 7);
    }
}
