pub mod types;
pub mod registry;
pub mod traits;
pub mod parser;
pub mod fetcher;
pub mod normalizer;
pub mod live;
pub mod store;
pub mod sync;
pub mod counts;
pub mod query;
pub mod api;
pub mod config;

pub use types::*;
pub use registry::FeedRegistry;
pub use traits::FeedFetcher;
pub use parser::FeedParser;
pub use fetcher::HttpFeedFetcher;
pub use normalizer::ItemNormalizer;
pub use live::{LiveBatch, LiveOptions, SourceFailure};
pub use store::{MemoryStore, NewsStore, PgNewsStore, RecordFilter};
pub use sync::{SyncEngine, SyncReport};
pub use counts::CountAggregator;
pub use query::{Cursor, ListRequest, NewsPage, QueryService, ServeMode, StoreRead};
pub use config::AppConfig;
