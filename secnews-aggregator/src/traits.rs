use crate::types::{FeedSource, FetchError, RawEntry};
use async_trait::async_trait;

/// Retrieves the raw entries of one feed source.
///
/// Implementations perform a single outbound fetch per call and never fail
/// because of one bad entry; only transport, status or whole-document
/// errors surface as `FetchError`.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawEntry>, FetchError>;
}
