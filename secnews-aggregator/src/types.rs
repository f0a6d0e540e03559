use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Editorial bucket a record is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Threats,
    Updates,
    Tools,
    Education,
    Reports,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Threats,
        Category::Updates,
        Category::Tools,
        Category::Education,
        Category::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Threats => "threats",
            Category::Updates => "updates",
            Category::Tools => "tools",
            Category::Education => "education",
            Category::Reports => "reports",
        }
    }

    /// Illustration shown when an article carries no image of its own
    pub fn emoji(&self) -> &'static str {
        match self {
            Category::Threats => "🚨",
            Category::Updates => "🔄",
            Category::Tools => "🛠️",
            Category::Education => "🎓",
            Category::Reports => "📊",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threats" => Ok(Category::Threats),
            "updates" => Ok(Category::Updates),
            "tools" => Ok(Category::Tools),
            "education" => Ok(Category::Education),
            "reports" => Ok(Category::Reports),
            other => Err(UnknownVariant {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// One entry of the feed table. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSource {
    pub name: String,
    #[serde(alias = "url")]
    pub endpoint_url: String,
    pub default_category: Category,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl FeedSource {
    pub fn new(name: &str, endpoint_url: &str, default_category: Category, language: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint_url: endpoint_url.to_string(),
            default_category,
            language: language.to_string(),
        }
    }
}

/// A feed entry as it came off the wire, before classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub description_html: String,
    pub link: String,
    pub published_at_raw: Option<String>,
    /// Category terms the feed itself attached to the entry
    pub categories: Vec<String>,
}

/// Canonical article record, persisted by the sync path or built transiently
/// by the live fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: Category,
    pub severity: Severity,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub is_breaking: bool,
    pub is_published: bool,
    pub view_count: u64,
    pub image_url: String,
    pub read_time_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewsRecord {
    /// Image URL if the article has one, otherwise the category emoji
    pub fn illustration(&self) -> &str {
        if self.image_url.is_empty() {
            self.category.emoji()
        } else {
            &self.image_url
        }
    }

    /// Case-insensitive substring match on title, summary or any tag.
    /// `needle` must already be lower-cased.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.summary.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

/// Partial update applied through the admin boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub severity: Option<Severity>,
    pub tags: Option<Vec<String>>,
    pub is_breaking: Option<bool>,
    pub is_published: Option<bool>,
    pub image_url: Option<String>,
}

impl RecordPatch {
    pub fn apply(&self, record: &mut NewsRecord, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(summary) = &self.summary {
            record.summary = summary.clone();
        }
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(category) = self.category {
            record.category = category;
        }
        if let Some(severity) = self.severity {
            record.severity = severity;
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(is_breaking) = self.is_breaking {
            record.is_breaking = is_breaking;
        }
        if let Some(is_published) = self.is_published {
            record.is_published = is_published;
        }
        if let Some(image_url) = &self.image_url {
            record.image_url = image_url.clone();
        }
        record.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Hard deadline for one source, retries included
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_feed_size_mb: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Passthrough endpoint, called as `GET relay?url=<feed url>`
    pub relay_url: Option<String>,
    /// Upper bound on feeds fetched at the same time
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "SecNews-Aggregator/1.0".to_string(),
            timeout_seconds: 8,
            max_retries: 1,
            retry_delay_ms: 500,
            max_feed_size_mb: 10,
            follow_redirects: true,
            max_redirects: 5,
            relay_url: None,
            concurrency: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("fetch of {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Feed parse error: {0}")]
    Malformed(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    TooLarge { size_mb: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("fetch cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("a record with url {url} already exists")]
    Conflict { url: String },

    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sync cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
