use crate::types::{FetchError, RawEntry};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

/// Maps a fetched feed document (RSS, Atom or JSON Feed) onto `RawEntry`s.
pub struct FeedParser;

impl FeedParser {
    /// Parse a whole document. Fails only when the document itself is
    /// unreadable; individual entries that cannot be mapped are skipped.
    pub fn parse_document(content: &[u8]) -> Result<Vec<RawEntry>, FetchError> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| FetchError::Malformed(format!("Failed to parse feed: {}", e)))?;

        let total = feed.entries.len();
        let mut seen_links = HashSet::new();
        let mut entries = Vec::with_capacity(total);

        for entry in feed.entries {
            let Some(raw) = Self::parse_entry(entry) else {
                continue;
            };

            // Same article listed twice in one document
            if !raw.link.is_empty() && !seen_links.insert(raw.link.clone()) {
                debug!("Skipping duplicate entry with link: {}", raw.link);
                continue;
            }
            entries.push(raw);
        }

        debug!("Parsed {} of {} entries", entries.len(), total);
        Ok(entries)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<RawEntry> {
        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();

        // Prefer the summary; full content is the fallback for feeds that only ship a body
        let description_html = entry
            .summary
            .map(|s| s.content)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        if title.is_empty() && description_html.trim().is_empty() {
            debug!("Dropping entry {} with neither title nor description", entry.id);
            return None;
        }

        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();

        let published_at_raw = entry.published.or(entry.updated).map(|dt| dt.to_rfc3339());

        let categories = entry
            .categories
            .into_iter()
            .map(|c| c.label.unwrap_or(c.term))
            .filter(|c| !c.trim().is_empty())
            .collect();

        Some(RawEntry {
            title,
            description_html,
            link,
            published_at_raw,
            categories,
        })
    }
}
