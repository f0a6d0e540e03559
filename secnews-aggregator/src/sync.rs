use crate::live::{self, LiveOptions};
use crate::normalizer::ItemNormalizer;
use crate::store::NewsStore;
use crate::traits::FeedFetcher;
use crate::types::{AggregatorError, FeedSource, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub sources: usize,
    pub failed_sources: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub skipped_unlinked: usize,
    pub write_failures: usize,
}

/// Pulls every source and inserts records whose url the store hasn't seen.
///
/// Existing records are never updated here. Runs are serialized, and each
/// insert is conditional on `url`, so concurrent callers cannot produce
/// duplicates.
pub struct SyncEngine {
    store: Arc<dyn NewsStore>,
    fetcher: Arc<dyn FeedFetcher>,
    normalizer: ItemNormalizer,
    options: LiveOptions,
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn NewsStore>, fetcher: Arc<dyn FeedFetcher>, options: LiveOptions) -> Self {
        Self {
            store,
            fetcher,
            normalizer: ItemNormalizer::new(),
            options,
            running: Mutex::new(()),
        }
    }

    pub async fn sync(&self, sources: &[FeedSource], cancel: &CancellationToken) -> Result<SyncReport> {
        let _guard = tokio::select! {
            guard = self.running.lock() => guard,
            _ = cancel.cancelled() => return Err(AggregatorError::Cancelled),
        };
        let start_time = Instant::now();

        info!("Syncing {} sources", sources.len());
        let batch = live::collect(sources, self.fetcher.as_ref(), &self.normalizer, self.options, cancel).await;

        if cancel.is_cancelled() {
            warn!("Sync cancelled before writing");
            return Err(AggregatorError::Cancelled);
        }

        let mut report = SyncReport {
            sources: batch.attempted,
            failed_sources: batch.failures.len(),
            fetched: batch.fetched,
            ..SyncReport::default()
        };

        // Batch is newest first; each later record is stamped one microsecond
        // earlier so created_at order matches publication order.
        let batch_time = Utc::now();
        for (rank, mut record) in batch.records.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Sync cancelled after {} inserts", report.inserted);
                return Err(AggregatorError::Cancelled);
            }

            if record.url.is_empty() {
                debug!("Skipping entry without a link: {}", record.title);
                report.skipped_unlinked += 1;
                continue;
            }

            let stamp = batch_time - Duration::microseconds(rank as i64);
            record.is_published = true;
            record.view_count = 0;
            record.created_at = stamp;
            record.updated_at = stamp;

            match self.store.insert_if_absent(&record).await {
                Ok(true) => {
                    debug!("Inserted {} ({})", record.id, record.url);
                    report.inserted += 1;
                }
                Ok(false) => report.skipped_existing += 1,
                Err(e) => {
                    // Left absent, so the next run retries it
                    warn!("Failed to store {}: {}", record.url, e);
                    report.write_failures += 1;
                }
            }
        }

        info!(
            "Sync finished: {} new, {} existing, {} unlinked, {} write failures, {}/{} sources failed ({} ms)",
            report.inserted,
            report.skipped_existing,
            report.skipped_unlinked,
            report.write_failures,
            report.failed_sources,
            report.sources,
            start_time.elapsed().as_millis()
        );
        Ok(report)
    }
}
