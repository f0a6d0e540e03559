//! Turns raw feed entries into canonical `NewsRecord`s.
//!
//! Everything here is pure: the same entry, source and clock always yield the
//! same record. Classification is a keyword scan over the lower-cased title
//! and content, so every record always lands in a definite category and
//! severity.

use crate::types::{Category, FeedSource, NewsRecord, RawEntry, Severity};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

const HOST_FRAGMENT_LEN: usize = 20;
const PATH_FRAGMENT_LEN: usize = 40;
const TITLE_FRAGMENT_LEN: usize = 40;
const TITLE_ONLY_LEN: usize = 60;
pub const SUMMARY_LEN: usize = 240;
const WORDS_PER_MINUTE: usize = 200;

/// Tier 1, checked first
const HIGH_SEVERITY: &[&str] = &[
    "critical",
    "exploit",
    "vulnerability",
    "breach",
    "attack",
    "malware",
    "ransomware",
    "zero-day",
    "urgent",
    "emergency",
];

const MEDIUM_SEVERITY: &[&str] = &["update", "patch", "security", "warning", "alert", "important"];

const BREAKING: &[&str] = &["breaking", "urgent", "critical", "zero-day"];

// Category scan order matters: threats wins over everything else.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Threats,
        &[
            "threat",
            "malware",
            "ransomware",
            "exploit",
            "attack",
            "breach",
            "zero-day",
            "phishing",
            "backdoor",
            "botnet",
            "trojan",
            "spyware",
        ],
    ),
    (
        Category::Updates,
        &["patch", "hotfix", "fix", "cve", "update", "advisory", "security release"],
    ),
    (
        Category::Tools,
        &["tool", "framework", "open-source", "open source", "scanner", "plugin"],
    ),
    (
        Category::Education,
        &[
            "training",
            "certification",
            "course",
            "tutorial",
            "guide",
            "learn",
            "webinar",
            "workshop",
        ],
    ),
    (
        Category::Reports,
        &["report", "study", "research", "survey", "analysis", "whitepaper"],
    ),
];

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src="([^"]+)""#).expect("image src pattern"));
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("html tag pattern"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemNormalizer;

impl ItemNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, entry: &RawEntry, source: &FeedSource) -> NewsRecord {
        self.normalize_at(entry, source, Utc::now())
    }

    /// Normalize against an explicit clock
    pub fn normalize_at(&self, entry: &RawEntry, source: &FeedSource, now: DateTime<Utc>) -> NewsRecord {
        let content = html_to_text(&entry.description_html);
        let title = if entry.title.is_empty() {
            smart_truncate(&content, 80)
        } else {
            html_to_text(&entry.title)
        };
        let haystack = format!("{} {}", title, content).to_lowercase();

        NewsRecord {
            id: derive_id(&entry.link, &title),
            summary: smart_truncate(&content, SUMMARY_LEN),
            category: classify_category(&haystack, source.default_category),
            severity: classify_severity(&haystack),
            source: source.name.clone(),
            url: entry.link.clone(),
            published_at: parse_published(entry.published_at_raw.as_deref(), now),
            tags: extract_tags(&entry.categories, &haystack),
            is_breaking: is_breaking(&haystack),
            is_published: true,
            view_count: 0,
            image_url: extract_image(&entry.description_html),
            read_time_minutes: read_time_minutes(&content),
            created_at: now,
            updated_at: now,
            title,
            content,
        }
    }
}

/// Stable record id built from the link's host and path plus the title.
///
/// Fragments are lower-cased, stripped to ASCII alphanumerics and capped in
/// length, so two long titles sharing a prefix on the same host and path can
/// collide. Links that do not parse as absolute URLs fall back to a
/// title-only id.
pub fn derive_id(link: &str, title: &str) -> String {
    let parsed = Url::parse(link.trim())
        .ok()
        .and_then(|url| url.host_str().map(|h| (h.to_string(), url.path().to_string())));

    match parsed {
        Some((host, path)) => {
            let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
            [
                sanitize_fragment(&host, HOST_FRAGMENT_LEN),
                sanitize_fragment(&path, PATH_FRAGMENT_LEN),
                sanitize_fragment(title, TITLE_FRAGMENT_LEN),
            ]
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join("-")
        }
        None => {
            let fragment = sanitize_fragment(title, TITLE_ONLY_LEN);
            if fragment.is_empty() {
                "title-untitled".to_string()
            } else {
                format!("title-{}", fragment)
            }
        }
    }
}

fn sanitize_fragment(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(max_len)
        .collect()
}

/// `text` must be lower-cased
pub fn classify_severity(text: &str) -> Severity {
    if HIGH_SEVERITY.iter().any(|k| text.contains(k)) {
        Severity::High
    } else if MEDIUM_SEVERITY.iter().any(|k| text.contains(k)) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Keyword override first, source default otherwise. `text` must be lower-cased.
pub fn classify_category(text: &str, default: Category) -> Category {
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(default)
}

pub fn is_breaking(text: &str) -> bool {
    BREAKING.iter().any(|k| text.contains(k))
}

/// First `src="..."` in the description, or an empty string
pub fn extract_image(html: &str) -> String {
    IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn extract_tags(feed_categories: &[String], text: &str) -> Vec<String> {
    let mut tags = BTreeSet::new();
    for category in feed_categories {
        let tag = category.trim().to_lowercase();
        if !tag.is_empty() {
            tags.insert(tag);
        }
    }
    for keyword in HIGH_SEVERITY.iter().chain(CATEGORY_KEYWORDS[0].1.iter()) {
        if text.contains(keyword) {
            tags.insert(keyword.to_string());
        }
    }
    tags.into_iter().collect()
}

/// Strip tags, decode the common entities and collapse whitespace
pub fn html_to_text(html: &str) -> String {
    let stripped = TAGS.replace_all(html, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a sentence boundary if possible, then a word boundary
pub fn smart_truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    if let Some(last_sentence) = truncated.rfind(". ") {
        truncated[..last_sentence + 1].to_string()
    } else if let Some(last_space) = truncated.rfind(' ') {
        format!("{}...", &truncated[..last_space])
    } else {
        format!("{}...", truncated)
    }
}

pub fn read_time_minutes(content: &str) -> u32 {
    let word_count = content.split_whitespace().count();
    (word_count.div_ceil(WORDS_PER_MINUTE) as u32).max(1)
}

/// RFC 3339 first, then RFC 2822; anything else counts as "now"
pub fn parse_published(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.map(str::trim)
        .and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .or_else(|_| DateTime::parse_from_rfc2822(s))
                .ok()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Human-readable age of a record, bucketed into minutes, hours or days
pub fn recency_label(published_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(published_at).max(Duration::zero());

    let (n, unit) = if age < Duration::minutes(1) {
        return "just now".to_string();
    } else if age < Duration::hours(1) {
        (age.num_minutes(), "minute")
    } else if age < Duration::days(1) {
        (age.num_hours(), "hour")
    } else {
        (age.num_days(), "day")
    };

    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source(default_category: Category) -> FeedSource {
        FeedSource::new("Example", "https://example.com/feed", default_category, "en")
    }

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn id_is_stable_and_built_from_host_path_title() {
        let a = derive_id("https://www.example.com/a/b", "Critical Zero-Day in Example Router");
        let b = derive_id("https://www.example.com/a/b", "Critical Zero-Day in Example Router");
        assert_eq!(a, b);
        assert_eq!(a, "examplecom-ab-criticalzerodayinexamplerouter");
    }

    #[test]
    fn unparsable_link_falls_back_to_title_only() {
        assert_eq!(derive_id("", "Hello, World!"), "title-helloworld");
        assert_eq!(derive_id("/relative/path", "Hello"), "title-hello");
        assert_eq!(derive_id("", "!!!"), "title-untitled");
    }

    #[test]
    fn long_titles_with_shared_prefix_collide() {
        let prefix = "a".repeat(TITLE_FRAGMENT_LEN);
        let one = derive_id("https://x.test/p", &format!("{}one", prefix));
        let two = derive_id("https://x.test/p", &format!("{}two", prefix));
        assert_eq!(one, two);
    }

    #[test]
    fn tier_one_beats_tier_two() {
        assert_eq!(classify_severity("critical update released"), Severity::High);
        assert_eq!(classify_severity("monthly patch roundup"), Severity::Medium);
        assert_eq!(classify_severity("conference recap"), Severity::Low);
    }

    #[test]
    fn category_override_and_default() {
        assert_eq!(classify_category("new ransomware strain", Category::Tools), Category::Threats);
        assert_eq!(classify_category("patch for cve-2025-1", Category::Reports), Category::Updates);
        assert_eq!(classify_category("annual survey results", Category::Tools), Category::Reports);
        assert_eq!(classify_category("podcast episode 12", Category::Education), Category::Education);
    }

    #[test]
    fn scenario_router_zero_day() {
        let entry = RawEntry {
            title: "Critical Zero-Day in Example Router".to_string(),
            description_html: "<p>Details inside.</p>".to_string(),
            link: "https://example.com/a/b".to_string(),
            published_at_raw: None,
            categories: vec![],
        };
        let record = ItemNormalizer::new().normalize_at(&entry, &source(Category::Tools), clock());
        assert_eq!(record.severity, Severity::High);
        assert!(record.is_breaking);
        assert_eq!(record.category, Category::Threats);
        assert_eq!(record.published_at, clock());
        assert_eq!(record.url, "https://example.com/a/b");
        assert!(record.is_published);
        assert_eq!(record.view_count, 0);
    }

    #[test]
    fn image_is_first_src_attribute() {
        let html = r#"<p>x</p><img src="https://img.test/1.png"><img src="https://img.test/2.png">"#;
        assert_eq!(extract_image(html), "https://img.test/1.png");
        assert_eq!(extract_image("<p>no image</p>"), "");
    }

    #[test]
    fn html_is_flattened_to_text() {
        assert_eq!(
            html_to_text("<p>Tom &amp; Jerry&nbsp;&nbsp;<b>strike</b>\n again</p>"),
            "Tom & Jerry strike again"
        );
    }

    #[test]
    fn tags_merge_feed_terms_and_keywords() {
        let tags = extract_tags(&["Malware".to_string(), " ".to_string()], "new ransomware attack");
        assert!(tags.contains(&"malware".to_string()));
        assert!(tags.contains(&"ransomware".to_string()));
        assert!(tags.contains(&"attack".to_string()));
        let unique: BTreeSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
    }

    #[test]
    fn read_time_rounds_up() {
        assert_eq!(read_time_minutes(""), 1);
        assert_eq!(read_time_minutes(&"word ".repeat(200)), 1);
        assert_eq!(read_time_minutes(&"word ".repeat(201)), 2);
    }

    #[test]
    fn recency_buckets() {
        let now = clock();
        assert_eq!(recency_label(now, now), "just now");
        assert_eq!(recency_label(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(recency_label(now - Duration::minutes(42), now), "42 minutes ago");
        assert_eq!(recency_label(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(recency_label(now - Duration::days(3), now), "3 days ago");
        assert_eq!(recency_label(now + Duration::hours(2), now), "just now");
    }

    #[test]
    fn dates_parse_or_default_to_now() {
        let now = clock();
        let rfc2822 = parse_published(Some("Tue, 14 Oct 2025 09:30:00 GMT"), now);
        assert_eq!(rfc2822, Utc.with_ymd_and_hms(2025, 10, 14, 9, 30, 0).unwrap());
        let rfc3339 = parse_published(Some("2025-10-13T08:00:00+02:00"), now);
        assert_eq!(rfc3339, Utc.with_ymd_and_hms(2025, 10, 13, 6, 0, 0).unwrap());
        assert_eq!(parse_published(Some("yesterday-ish"), now), now);
        assert_eq!(parse_published(None, now), now);
    }

    #[test]
    fn summary_is_truncated_on_boundaries() {
        let text = "First sentence here. Second sentence that runs on and on";
        assert_eq!(smart_truncate(text, 30), "First sentence here.");
        assert_eq!(smart_truncate("alpha beta gamma", 12), "alpha beta...");
        assert_eq!(smart_truncate("short", 30), "short");
    }
}
