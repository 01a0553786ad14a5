use crate::traits::FeedSource;
use crate::types::{LiveSourceSpec, Result, SourceItem};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Feed source backed by an HTTP endpoint
pub struct RssFeedSource {
    spec: LiveSourceSpec,
    fetcher: Arc<Fetcher>,
}

impl RssFeedSource {
    pub fn new(spec: LiveSourceSpec, fetcher: Arc<Fetcher>) -> Self {
        Self { spec, fetcher }
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    fn source_url(&self) -> &str {
        &self.spec.uri
    }

    fn lookback_days(&self) -> i64 {
        self.spec.lookback_days
    }

    async fn pull(&self) -> Result<Vec<SourceItem>> {
        let content = self.fetcher.fetch_feed(&self.spec.uri).await?;
        let items = FeedParser::parse_items(&content)?;
        info!("Pulled {} items from feed {}", items.len(), self.spec.uri);
        Ok(items)
    }
}
