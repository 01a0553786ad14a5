use crate::rss_utils::{feed::normalize_text, time::lookback_watermark};
use crate::store::EntryStore;
use crate::traits::FeedSource;
use crate::types::{CandidateEntry, Result, SourceItem};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Watermark for a source: its latest stored `pub_date`, or `now` minus the
/// source's lookback when nothing has been stored yet.
pub async fn watermark(
    store: &dyn EntryStore,
    source: &dyn FeedSource,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let stored = store.latest_pub_date(source.source_url()).await?;
    Ok(stored.unwrap_or_else(|| lookback_watermark(now, source.lookback_days())))
}

/// Turn raw source items into candidates strictly newer than `watermark`.
///
/// Items without a publish timestamp or a link are skipped. Title and
/// description go through the same normalization.
pub fn filter_and_normalize(
    items: Vec<SourceItem>,
    source_url: &str,
    watermark: DateTime<Utc>,
) -> Vec<CandidateEntry> {
    let mut candidates = Vec::new();

    for item in items {
        let Some(pub_date) = item.published_at else {
            debug!("Skipping undated item '{}' from {}", item.title, source_url);
            continue;
        };

        let link = match item.link.as_deref().map(str::trim) {
            Some(link) if !link.is_empty() => link.to_string(),
            _ => {
                debug!("Skipping item without link '{}' from {}", item.title, source_url);
                continue;
            }
        };

        if pub_date <= watermark {
            continue;
        }

        candidates.push(CandidateEntry {
            link,
            source_url: source_url.to_string(),
            title: normalize_text(&item.title),
            description: normalize_text(&item.description),
            pub_date,
        });
    }

    candidates
}

/// Pull one source and return its new candidates. Has no side effects on
/// the store.
pub async fn fetch_candidates(
    store: &dyn EntryStore,
    source: &dyn FeedSource,
    now: DateTime<Utc>,
) -> Result<Vec<CandidateEntry>> {
    let mark = watermark(store, source, now).await?;
    let items = source.pull().await?;
    let total = items.len();

    let candidates = filter_and_normalize(items, source.source_url(), mark);
    info!(
        "Source {}: {} of {} items newer than {}",
        source.source_url(),
        candidates.len(),
        total,
        mark
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(title: &str, link: Option<&str>, published_at: Option<DateTime<Utc>>) -> SourceItem {
        SourceItem {
            title: title.to_string(),
            link: link.map(str::to_string),
            description: "<p>Body &amp; more</p>".to_string(),
            published_at,
        }
    }

    #[test]
    fn keeps_only_strictly_newer_items() {
        let mark = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let items = vec![
            item("at watermark", Some("https://a.test/1"), Some(mark)),
            item("newer", Some("https://a.test/2"), Some(mark + Duration::seconds(1))),
            item("older", Some("https://a.test/3"), Some(mark - Duration::days(1))),
        ];

        let candidates = filter_and_normalize(items, "https://a.test/feed", mark);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].link, "https://a.test/2");
        assert_eq!(candidates[0].description, "Body & more");
    }

    #[test]
    fn skips_undated_and_linkless_items() {
        let mark = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let later = Some(mark + Duration::hours(1));
        let items = vec![
            item("undated", Some("https://a.test/1"), None),
            item("no link", None, later),
            item("blank link", Some("  "), later),
            item("ok", Some(" https://a.test/4 "), later),
        ];

        let candidates = filter_and_normalize(items, "https://a.test/feed", mark);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].link, "https://a.test/4");
        assert_eq!(candidates[0].source_url, "https://a.test/feed");
    }
}
