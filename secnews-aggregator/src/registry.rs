use crate::types::{AggregatorError, Category, FeedSource, Result};
use std::path::Path;
use tracing::info;
use url::Url;

/// Static table of feed sources.
///
/// Built once at startup and handed to the fetch/sync/query components
/// explicitly, so tests can swap in synthetic sources.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    sources: Vec<FeedSource>,
}

impl FeedRegistry {
    pub fn new(sources: Vec<FeedSource>) -> Self {
        Self { sources }
    }

    /// Curated security news feeds used when no table is configured
    pub fn builtin() -> Self {
        Self::new(vec![
            FeedSource::new(
                "The Hacker News",
                "https://feeds.feedburner.com/TheHackersNews",
                Category::Threats,
                "en",
            ),
            FeedSource::new(
                "BleepingComputer",
                "https://www.bleepingcomputer.com/feed/",
                Category::Threats,
                "en",
            ),
            FeedSource::new(
                "Krebs on Security",
                "https://krebsonsecurity.com/feed/",
                Category::Threats,
                "en",
            ),
            FeedSource::new(
                "Dark Reading",
                "https://www.darkreading.com/rss.xml",
                Category::Reports,
                "en",
            ),
            FeedSource::new(
                "SecurityWeek",
                "https://www.securityweek.com/feed/",
                Category::Threats,
                "en",
            ),
            FeedSource::new(
                "CISA Advisories",
                "https://www.cisa.gov/cybersecurity-advisories/all.xml",
                Category::Updates,
                "en",
            ),
            FeedSource::new(
                "SANS Internet Storm Center",
                "https://isc.sans.edu/rssfeed_full.xml",
                Category::Education,
                "en",
            ),
            FeedSource::new(
                "Schneier on Security",
                "https://www.schneier.com/feed/atom/",
                Category::Reports,
                "en",
            ),
            FeedSource::new(
                "Kali Linux Blog",
                "https://www.kali.org/rss.xml",
                Category::Tools,
                "en",
            ),
            FeedSource::new(
                "PortSwigger Research",
                "https://portswigger.net/research/rss",
                Category::Tools,
                "en",
            ),
            FeedSource::new(
                "Google Project Zero",
                "https://googleprojectzero.blogspot.com/feeds/posts/default",
                Category::Reports,
                "en",
            ),
            FeedSource::new(
                "Microsoft Security Response Center",
                "https://msrc.microsoft.com/blog/feed",
                Category::Updates,
                "en",
            ),
        ])
    }

    /// Load the feed table from a JSON array of sources
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_json_str(&content)?;
        info!("Loaded {} feed sources from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let sources: Vec<FeedSource> = serde_json::from_str(content)?;

        for (index, source) in sources.iter().enumerate() {
            if source.name.trim().is_empty() {
                return Err(AggregatorError::Config(format!(
                    "feed #{} has an empty name",
                    index
                )));
            }
            match Url::parse(&source.endpoint_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => {
                    return Err(AggregatorError::Config(format!(
                        "feed '{}' has an invalid endpoint: '{}'",
                        source.name, source.endpoint_url
                    )))
                }
            }
        }

        Ok(Self::new(sources))
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&FeedSource> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeedSource> {
        self.sources.iter()
    }
}
