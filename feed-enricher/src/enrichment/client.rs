use super::{GenerateError, ModelParams, TextGenerator};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between two dispatched requests.
    pub min_interval_ms: u64,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    /// Upper bound on the sum of backoff sleeps for one request.
    pub max_total_backoff_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            base_delay_ms: 1000,
            max_attempts: 3,
            max_total_backoff_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_total_backoff(&self) -> Duration {
        Duration::from_millis(self.max_total_backoff_ms)
    }
}

/// Cumulative counters since the client was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub requests: u64,
    pub backoff_sleeps: u64,
    pub total_backoff: Duration,
    pub failures: u64,
}

/// Wraps a `TextGenerator` with request pacing and bounded retries.
///
/// Every dispatched attempt, successful or not, waits until at least
/// `min_interval` has passed since the previous dispatch. Rate-limited and
/// transient failures are retried with delays `base * 2^(n-1)` until either
/// `max_attempts` is reached or the next delay would push the summed sleep
/// past `max_total_backoff`. Fatal failures are returned immediately.
pub struct RateLimitedClient {
    generator: Arc<dyn TextGenerator>,
    params: ModelParams,
    config: RateLimitConfig,
    last_dispatch: Mutex<Option<Instant>>,
    stats: Mutex<ClientStats>,
}

impl RateLimitedClient {
    pub fn new(generator: Arc<dyn TextGenerator>, params: ModelParams, config: RateLimitConfig) -> Self {
        Self {
            generator,
            params,
            config,
            last_dispatch: Mutex::new(None),
            stats: Mutex::new(ClientStats::default()),
        }
    }

    pub async fn stats(&self) -> ClientStats {
        self.stats.lock().await.clone()
    }

    pub async fn request(&self, prompt: &str) -> Result<String, GenerateError> {
        let mut schedule = self.backoff_schedule();
        let max_attempts = self.config.max_attempts.max(1);
        let budget = self.config.max_total_backoff();
        let mut slept = Duration::ZERO;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.pace().await;
            self.stats.lock().await.requests += 1;

            let err = match self.generator.generate(prompt, &self.params).await {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(self.give_up(err, attempt).await);
            }

            if attempt >= max_attempts {
                return Err(self.give_up(err, attempt).await);
            }

            // Whole milliseconds; the schedule can carry a nanosecond of jitter
            let next = schedule
                .next_backoff()
                .map(|d| Duration::from_millis(d.as_millis() as u64));
            let delay = match next {
                Some(delay) if slept + delay <= budget => delay,
                _ => {
                    debug!("Backoff budget of {:?} exhausted after {:?}", budget, slept);
                    return Err(self.give_up(err, attempt).await);
                }
            };

            warn!(
                "Attempt {}/{} failed ({}), retrying in {:?}",
                attempt, max_attempts, err, delay
            );
            sleep(delay).await;
            slept += delay;

            let mut stats = self.stats.lock().await;
            stats.backoff_sleeps += 1;
            stats.total_backoff += delay;
        }
    }

    /// Exponential schedule without jitter: base, 2*base, 4*base, ...
    fn backoff_schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.config.base_delay(),
            initial_interval: self.config.base_delay(),
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_secs(24 * 60 * 60),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn pace(&self) {
        let min_interval = self.config.min_interval();
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                debug!("Pacing next request by {:?}", wait);
                sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }

    async fn give_up(&self, err: GenerateError, attempts: u32) -> GenerateError {
        self.stats.lock().await.failures += 1;
        warn!("Giving up after {} attempt(s): {}", attempts, err);
        err
    }
}
