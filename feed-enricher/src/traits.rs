use crate::types::{Result, SourceItem};
use async_trait::async_trait;

/// Trait for pulling raw items from a feed endpoint
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Source URL; half of every entry's identity and the watermark key
    fn source_url(&self) -> &str;

    /// Days to look back when nothing from this source is stored yet
    fn lookback_days(&self) -> i64;

    /// Fetch and parse the current feed document.
    /// A network or parse failure is an error for the whole source.
    async fn pull(&self) -> Result<Vec<SourceItem>>;
}
