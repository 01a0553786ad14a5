use crate::rss_utils;
use crate::types::{EnricherError, FetchConfig, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Download a feed body. Network errors and non-success statuses are
    /// retried on an exponential schedule; the final failure is returned as
    /// `SourceFetch` so the caller can skip this source for the cycle.
    pub async fn fetch_feed(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        self.apply_rate_limit(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let content = self.read_body(response).await?;
                        info!(
                            "Fetched feed: {} ({} bytes in {}ms)",
                            url,
                            content.len(),
                            start_time.elapsed().as_millis()
                        );
                        return Ok(content);
                    }

                    last_error = Some(format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    ));

                    if !Self::is_retryable(status) {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        Err(EnricherError::SourceFetch {
            url: url.to_string(),
            reason: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    async fn read_body(&self, response: Response) -> Result<String> {
        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_feed_size_mb {
                return Err(EnricherError::FeedTooLarge { size_mb });
            }
        }

        let content = response.text().await?;
        let size_mb = content.len() / (1024 * 1024);
        if size_mb > self.config.max_feed_size_mb {
            return Err(EnricherError::FeedTooLarge { size_mb });
        }
        Ok(content)
    }

    fn is_retryable(status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let host = rss_utils::url::extract_host(url)
            .ok_or_else(|| EnricherError::General(format!("No host in feed URL {}", url)))?;

        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        // Reserve the next slot for this host, then wait outside the lock
        let slot = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(last_slot) => (*last_slot + min_interval).max(now),
                None => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot
        };

        let wait_time = slot.saturating_duration_since(Instant::now());
        if !wait_time.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep(wait_time).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(Fetcher::is_retryable(StatusCode::BAD_GATEWAY));
        assert!(Fetcher::is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!Fetcher::is_retryable(StatusCode::NOT_FOUND));
        assert!(!Fetcher::is_retryable(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn host_pacing_does_not_hold_up_other_hosts() {
        let fetcher = Arc::new(
            Fetcher::new(FetchConfig {
                min_host_interval_ms: 400,
                ..Default::default()
            })
            .unwrap(),
        );
        let start = Instant::now();
        fetcher.apply_rate_limit("https://a.test/rss").await.unwrap();

        let same_host = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.apply_rate_limit("https://a.test/atom").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let other = Instant::now();
        fetcher.apply_rate_limit("https://b.test/rss").await.unwrap();
        assert!(other.elapsed() < Duration::from_millis(200));

        same_host.await.unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test]
    async fn rejects_url_without_host() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher.fetch_feed("file:///tmp/feed.xml").await.unwrap_err();
        assert!(matches!(err, EnricherError::General(_)));
    }
}
