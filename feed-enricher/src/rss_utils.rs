/// Feed-specific utility functions for the ingester

/// URL utilities for feed sources
pub mod url {
    use url::Url;

    /// Validate feed URL format: http(s) with a host
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
            Err(_) => false,
        }
    }

    /// Extract host from URL, used as the per-host rate limit key
    pub fn extract_host(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_string()))
    }
}

/// Time utilities for watermarks
pub mod time {
    use chrono::{DateTime, Duration, Utc};

    /// Watermark used for a source that has nothing stored yet
    pub fn lookback_watermark(now: DateTime<Utc>, lookback_days: i64) -> DateTime<Utc> {
        now - Duration::days(lookback_days.max(0))
    }
}

/// Text normalization for feed content
pub mod feed {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));

    /// Decode entities, strip markup tags, collapse whitespace.
    pub fn normalize_text(raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        let decoded = html_escape::decode_html_entities(raw);
        let stripped = RE_TAGS.replace_all(&decoded, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Cut `text` to at most `max_chars` characters, preferring a word boundary.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_chars).collect();
        match cut.rfind(' ') {
            Some(pos) if pos > max_chars / 2 => cut[..pos].trim_end().to_string(),
            _ => cut,
        }
    }
}
