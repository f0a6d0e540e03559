use crate::normalizer::ItemNormalizer;
use crate::traits::FeedFetcher;
use crate::types::{FeedSource, FetchConfig, FetchError, NewsRecord, RawEntry};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounds for one concurrent pass over the feed table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveOptions {
    pub concurrency: usize,
    /// Deadline for a single source, retries included
    pub deadline: Duration,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for LiveOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            deadline: Duration::from_secs(config.timeout_seconds),
        }
    }
}

#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: FetchError,
}

/// Output of a live pass. Records are normalized but not persisted.
#[derive(Debug, Default)]
pub struct LiveBatch {
    /// Newest `published_at` first, one record per non-empty url
    pub records: Vec<NewsRecord>,
    pub failures: Vec<SourceFailure>,
    pub attempted: usize,
    /// Entries fetched before url de-duplication
    pub fetched: usize,
}

impl LiveBatch {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

/// Fetch and normalize every source concurrently.
///
/// A failing, slow or cancelled source lands in `failures`; it never fails
/// the batch.
pub async fn collect(
    sources: &[FeedSource],
    fetcher: &dyn FeedFetcher,
    normalizer: &ItemNormalizer,
    options: LiveOptions,
    cancel: &CancellationToken,
) -> LiveBatch {
    let start_time = Instant::now();

    let fetches: Vec<_> = sources
        .iter()
        .map(|source| async move {
            let outcome = fetch_with_deadline(fetcher, source, options.deadline, cancel).await;
            (source, outcome)
        })
        .collect();
    let outcomes: Vec<(&FeedSource, Result<Vec<RawEntry>, FetchError>)> = stream::iter(fetches)
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let mut batch = LiveBatch {
        attempted: sources.len(),
        ..LiveBatch::default()
    };
    let mut seen_urls = HashSet::new();

    for (source, outcome) in outcomes {
        match outcome {
            Ok(entries) => {
                debug!("{}: {} entries", source.name, entries.len());
                batch.fetched += entries.len();
                for entry in &entries {
                    let record = normalizer.normalize(entry, source);
                    if !record.url.is_empty() && !seen_urls.insert(record.url.clone()) {
                        continue;
                    }
                    batch.records.push(record);
                }
            }
            Err(error) => {
                warn!("Source {} failed: {}", source.name, error);
                batch.failures.push(SourceFailure {
                    source: source.name.clone(),
                    error,
                });
            }
        }
    }

    batch.records.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    if !batch.failures.is_empty() {
        warn!("{} of {} sources failed", batch.failures.len(), batch.attempted);
    }
    info!(
        "Live pass: {} records from {}/{} sources in {} ms",
        batch.records.len(),
        batch.succeeded(),
        batch.attempted,
        start_time.elapsed().as_millis()
    );

    batch
}

async fn fetch_with_deadline(
    fetcher: &dyn FeedFetcher,
    source: &FeedSource,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<RawEntry>, FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = tokio::time::timeout(deadline, fetcher.fetch(source)) => match result {
            Ok(entries) => entries,
            Err(_) => Err(FetchError::Timeout {
                url: source.endpoint_url.clone(),
                seconds: deadline.as_secs(),
            }),
        },
    }
}
