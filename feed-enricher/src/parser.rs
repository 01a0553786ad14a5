use crate::types::{EnricherError, Result, SourceItem};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS/Atom/JSON feed body into raw source items.
    ///
    /// Items keep whatever timestamp the feed carried; `published_at` is None
    /// when the item had no publish date or it could not be parsed. Repeated
    /// links inside one document are dropped after the first occurrence.
    pub fn parse_items(content: &str) -> Result<Vec<SourceItem>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let normalized = Self::normalize_encoding(content)?;
        let feed = parser::parse(normalized.as_bytes())
            .map_err(|e| EnricherError::Parse(format!("Failed to parse feed: {}", e)))?;

        let mut seen_links = HashSet::new();
        let mut items = Vec::with_capacity(feed.entries.len());

        for entry in feed.entries {
            let item = Self::convert_entry(entry);
            if let Some(ref link) = item.link {
                if !seen_links.insert(link.clone()) {
                    debug!("Skipping repeated entry with link: {}", link);
                    continue;
                }
            }
            items.push(item);
        }

        debug!("Parsed feed with {} entries", items.len());
        Ok(items)
    }

    fn convert_entry(entry: feed_rs::model::Entry) -> SourceItem {
        let title = entry.title.map(|t| t.content).unwrap_or_default();

        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty());

        // RSS <description> lands in `summary`; fall back to full content
        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        SourceItem {
            title,
            link,
            description,
            published_at: entry.published,
        }
    }

    fn normalize_encoding(content: &str) -> Result<String> {
        let normalized = content.trim_start_matches('\u{feff}').trim().to_string();

        if normalized.is_empty() {
            return Err(EnricherError::Parse("Empty content after normalization".to_string()));
        }

        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <description>Example feed</description>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/1</link>
      <description>&lt;p&gt;Body one&lt;/p&gt;</description>
      <pubDate>Tue, 04 Mar 2025 10:00:00 +0100</pubDate>
    </item>
    <item>
      <title>Undated</title>
      <link>https://example.com/2</link>
      <description>No date here</description>
    </item>
    <item>
      <title>Repeat</title>
      <link>https://example.com/1</link>
      <pubDate>Wed, 05 Mar 2025 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items_with_utc_dates() {
        let items = FeedParser::parse_items(RSS).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "First & foremost");
        assert_eq!(first.link.as_deref(), Some("https://example.com/1"));
        assert!(first.description.contains("Body one"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap())
        );

        assert_eq!(items[1].title, "Undated");
        assert_eq!(items[1].published_at, None);
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(FeedParser::parse_items("   ").is_err());
        assert!(FeedParser::parse_items("this is not a feed").is_err());
    }
}
