mod common;

use common::{entry, init_tracing, source, FailingStore, StubFetcher};
use secnews_aggregator::store::{NewsStore, RecordFilter};
use secnews_aggregator::{
    AggregatorError, Category, ListRequest, LiveOptions, MemoryStore, QueryService, Result, Severity, SyncEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn options() -> LiveOptions {
    LiveOptions {
        concurrency: 4,
        deadline: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn second_pass_over_same_feed_inserts_nothing() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new().with_feed(
        "Router Watch",
        vec![entry(
            "Firmware notes for home routers",
            "https://example.com/a/b",
            "2024-05-01T10:00:00Z",
        )],
    ));
    let engine = SyncEngine::new(store.clone(), fetcher, options());
    let sources = vec![source("Router Watch", Category::Tools)];
    let cancel = CancellationToken::new();

    let first = engine.sync(&sources, &cancel).await?;
    let second = engine.sync(&sources, &cancel).await?;
    info!("first: {:?}, second: {:?}", first, second);

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped_existing, 1);

    let records = store.snapshot().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, "https://example.com/a/b");
    assert!(records[0].is_published);
    assert_eq!(records[0].view_count, 0);
    Ok(())
}

#[tokio::test]
async fn one_dead_feed_does_not_block_the_batch() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_feed(
                "Alive",
                vec![
                    entry("Patch notes for June", "https://alive.test/1", "2024-06-01T00:00:00Z"),
                    entry("Scanner release 2.0", "https://alive.test/2", "2024-06-02T00:00:00Z"),
                ],
            )
            .with_failure("Dead", 503),
    );
    let engine = SyncEngine::new(store.clone(), fetcher, options());
    let sources = vec![source("Alive", Category::Updates), source("Dead", Category::Threats)];

    let report = engine.sync(&sources, &CancellationToken::new()).await?;

    assert_eq!(report.sources, 2);
    assert_eq!(report.failed_sources, 1);
    assert_eq!(report.inserted, 2);
    assert_eq!(store.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn zero_day_headline_is_reclassified_as_threat() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new().with_feed(
        "Gear Lab",
        vec![entry(
            "Critical Zero-Day in Example Router",
            "https://example.com/a/b",
            "2024-05-01T10:00:00Z",
        )],
    ));
    let engine = SyncEngine::new(store.clone(), fetcher, options());

    engine
        .sync(&[source("Gear Lab", Category::Tools)], &CancellationToken::new())
        .await?;

    let record = store
        .find_one(&RecordFilter::by_url("https://example.com/a/b"))
        .await?
        .expect("record stored");
    assert_eq!(record.severity, Severity::High);
    assert!(record.is_breaking);
    assert_eq!(record.category, Category::Threats);
    Ok(())
}

#[tokio::test]
async fn write_failures_are_counted_not_fatal() -> Result<()> {
    init_tracing();

    let fetcher = Arc::new(StubFetcher::new().with_feed(
        "Alive",
        vec![entry("Weekly research report", "https://alive.test/r", "2024-06-01T00:00:00Z")],
    ));
    let engine = SyncEngine::new(Arc::new(FailingStore), fetcher, options());

    let report = engine
        .sync(&[source("Alive", Category::Reports)], &CancellationToken::new())
        .await?;

    assert_eq!(report.inserted, 0);
    assert_eq!(report.write_failures, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_syncs_do_not_duplicate() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let entries = (0..10)
        .map(|i| {
            entry(
                &format!("Advisory {}", i),
                &format!("https://vendor.test/advisory/{}", i),
                "2024-06-01T00:00:00Z",
            )
        })
        .collect();
    let fetcher = Arc::new(StubFetcher::new().with_feed("Vendor", entries));
    let engine = Arc::new(SyncEngine::new(store.clone(), fetcher, options()));
    let sources = vec![source("Vendor", Category::Updates)];
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(engine.sync(&sources, &cancel), engine.sync(&sources, &cancel));
    let (a, b) = (a?, b?);

    assert_eq!(a.inserted + b.inserted, 10);
    assert_eq!(store.count(&RecordFilter::published()).await?, 10);
    Ok(())
}

#[tokio::test]
async fn cancelled_sync_writes_nothing() {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new().with_feed(
        "Alive",
        vec![entry("Patch notes", "https://alive.test/1", "2024-06-01T00:00:00Z")],
    ));
    let engine = SyncEngine::new(store.clone(), fetcher, options());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = engine.sync(&[source("Alive", Category::Updates)], &cancel).await;

    assert!(matches!(result, Err(AggregatorError::Cancelled)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn freshly_synced_batch_lists_newest_first() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new().with_feed(
        "Wire",
        vec![
            entry("January roundup", "https://wire.test/jan", "2024-01-15T00:00:00Z"),
            entry("March roundup", "https://wire.test/mar", "2024-03-15T00:00:00Z"),
            entry("February roundup", "https://wire.test/feb", "2024-02-15T00:00:00Z"),
        ],
    ));
    let sources = vec![source("Wire", Category::Reports)];
    let engine = SyncEngine::new(store.clone(), fetcher.clone(), options());
    engine.sync(&sources, &CancellationToken::new()).await?;

    let query = QueryService::new(store, fetcher, sources, options());
    let page = query.list_news(&ListRequest::new(3)).await;

    let urls: Vec<&str> = page.records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://wire.test/mar", "https://wire.test/feb", "https://wire.test/jan"]
    );
    Ok(())
}

#[tokio::test]
async fn entries_without_a_link_are_not_stored() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new().with_feed(
        "Wire",
        vec![
            entry("Unlinked bulletin one", "", "2024-06-01T00:00:00Z"),
            entry("Unlinked bulletin two", "", "2024-06-02T00:00:00Z"),
            entry("Linked advisory", "https://wire.test/advisory", "2024-06-03T00:00:00Z"),
        ],
    ));
    let engine = SyncEngine::new(store.clone(), fetcher, options());

    let report = engine
        .sync(&[source("Wire", Category::Updates)], &CancellationToken::new())
        .await?;

    assert_eq!(report.inserted, 1);
    assert_eq!(report.skipped_unlinked, 2);
    assert_eq!(report.skipped_existing, 0);
    assert_eq!(store.len().await, 1);
    Ok(())
}
