use crate::parser::FeedParser;
use crate::traits::FeedFetcher;
use crate::types::{FeedSource, FetchConfig, FetchError, RawEntry};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Fetches feed documents over HTTP, directly or through a relay
pub struct HttpFeedFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFeedFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(attempt_timeout(&config))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// URL actually requested for a feed: the feed itself, or the relay
    /// with the feed passed as its `url` query parameter.
    pub fn request_url(&self, feed_url: &str) -> Result<Url, FetchError> {
        match &self.config.relay_url {
            Some(relay) => Ok(Url::parse_with_params(relay, &[("url", feed_url)])?),
            None => Ok(Url::parse(feed_url)?),
        }
    }

    async fn fetch_document(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_millis(self.config.retry_delay_ms),
            initial_interval: Duration::from_millis(self.config.retry_delay_ms),
            max_interval: Duration::from_millis(self.config.retry_delay_ms * 8),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_seconds)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}, retrying in {:?}: {}", attempt, url, delay, e);
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let limit = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(FetchError::TooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        let body = response.bytes().await?;
        if body.len() > limit {
            return Err(FetchError::TooLarge {
                size_mb: body.len() / (1024 * 1024),
            });
        }

        Ok(body.to_vec())
    }
}

/// Budget for one request, so every retry fits inside the per-source deadline
fn attempt_timeout(config: &FetchConfig) -> Duration {
    Duration::from_secs(config.timeout_seconds.max(1)) / config.max_retries.saturating_add(1)
}

fn is_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        FetchError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        _ => false,
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawEntry>, FetchError> {
        let start_time = Instant::now();
        let url = self.request_url(&source.endpoint_url)?;

        debug!("Fetching feed: {} via {}", source.name, url);

        let body = self.fetch_document(&url).await?;
        let entries = FeedParser::parse_document(&body)?;

        info!(
            "Fetched {} entries from {} ({} bytes, {} ms)",
            entries.len(),
            source.name,
            body.len(),
            start_time.elapsed().as_millis()
        );
        Ok(entries)
    }
}
