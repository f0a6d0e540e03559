use anyhow::Context;
use clap::Parser;
use secnews_aggregator::api::{self, AppState};
use secnews_aggregator::config::{AppConfig, Command};
use secnews_aggregator::normalizer::recency_label;
use secnews_aggregator::query::{self, ListRequest};
use secnews_aggregator::{
    FeedFetcher, HttpFeedFetcher, MemoryStore, NewsRecord, NewsStore, PgNewsStore, QueryService, SyncEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_target(false)
        .init();

    let registry = config.registry().context("loading feed table")?;
    info!("Loaded {} feed sources", registry.len());

    let store: Arc<dyn NewsStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database");
            let store = PgNewsStore::connect(url).await.map_err(|e| {
                error!("Failed to connect to database. Check DATABASE_URL and that Postgres is running.");
                e
            })?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, records are kept in memory for this run only");
            Arc::new(MemoryStore::new())
        }
    };

    let fetcher: Arc<dyn FeedFetcher> = Arc::new(HttpFeedFetcher::new(config.fetch_config())?);
    let options = config.live_options();
    let sources = registry.sources().to_vec();

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                shutdown.cancel();
            }
        }
    });

    match config.command {
        Command::Sync => {
            let engine = SyncEngine::new(store, fetcher, options);
            let report = engine.sync(&sources, &shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::List {
            category,
            search,
            page_size,
            cursor,
        } => {
            let service = QueryService::new(store, fetcher, sources, options).with_cancellation(shutdown);
            let request = ListRequest {
                category: query::parse_category_filter(category.as_deref())?,
                search,
                page_size,
                cursor,
            };
            let page = service.list_news(&request).await;
            print_records(&page.records);
            println!("-- {:?}, next cursor: {}", page.mode, page.next_cursor.as_deref().unwrap_or("none"));
        }
        Command::Breaking { limit } => {
            let service = QueryService::new(store, fetcher, sources, options).with_cancellation(shutdown);
            print_records(&service.list_breaking(limit).await);
        }
        Command::Counts => {
            let service = QueryService::new(store, fetcher, sources, options);
            for (category, count) in service.counts().await {
                println!("{:<10} {}", category, count);
            }
        }
        Command::Serve { bind, sync_interval } => {
            let state = AppState::new(store.clone(), fetcher.clone(), sources.clone(), options, shutdown.clone());

            if sync_interval > 0 {
                let engine = SyncEngine::new(store, fetcher, options);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(Duration::from_secs(sync_interval));
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = ticker.tick() => {
                                if let Err(e) = engine.sync(&sources, &shutdown).await {
                                    warn!("Scheduled sync failed: {}", e);
                                }
                            }
                        }
                    }
                });
            }

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {}", bind))?;
            info!("Listening on {}", bind);

            axum::serve(listener, api::router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;
        }
    }

    Ok(())
}

fn print_records(records: &[NewsRecord]) {
    let now = chrono::Utc::now();
    for record in records {
        println!(
            "[{}] {:<6} {}{} ({}, {})",
            record.category,
            record.severity,
            if record.is_breaking { "BREAKING " } else { "" },
            record.title,
            record.source,
            recency_label(record.published_at, now)
        );
    }
}
