mod common;

use common::*;
use feed_enricher::enrichment::{GenerateError, ModelParams, RateLimitConfig, RateLimitedClient};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

fn client(generator: Arc<ScriptedGenerator>, config: RateLimitConfig) -> RateLimitedClient {
    RateLimitedClient::new(generator, ModelParams::default(), config)
}

fn config(min_interval_ms: u64, max_attempts: u32, max_total_backoff_ms: u64) -> RateLimitConfig {
    RateLimitConfig {
        min_interval_ms,
        base_delay_ms: 1000,
        max_attempts,
        max_total_backoff_ms,
    }
}

#[tokio::test(start_paused = true)]
async fn test_retries_rate_limits_then_succeeds() {
    init_tracing();

    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerateError::RateLimited),
        Err(GenerateError::RateLimited),
        Ok("done".to_string()),
    ]));
    let client = client(generator.clone(), config(0, 3, 60_000));

    let started = Instant::now();
    let result = client.request("prompt").await;

    assert_eq!(result, Ok("done".to_string()));
    assert_eq!(generator.calls(), 3);

    let stats = client.stats().await;
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.backoff_sleeps, 2);
    assert_eq!(stats.total_backoff, Duration::from_secs(3));
    assert_eq!(stats.failures, 0);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_total_backoff_budget_stops_retries() {
    let generator = Arc::new(ScriptedGenerator::new(
        (0..10).map(|_| Err(GenerateError::RateLimited)).collect(),
    ));
    // Delays 1s and 2s fit in 5s; the 4s delay would not
    let client = client(generator.clone(), config(0, 10, 5_000));

    let result = client.request("prompt").await;

    assert_eq!(result, Err(GenerateError::RateLimited));
    let stats = client.stats().await;
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.backoff_sleeps, 2);
    assert!(stats.total_backoff <= Duration::from_secs(5));
    assert_eq!(stats.failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_are_bounded() {
    let generator = Arc::new(ScriptedGenerator::new(
        (0..10)
            .map(|_| Err(GenerateError::Transient("HTTP 503".to_string())))
            .collect(),
    ));
    let client = client(generator.clone(), config(0, 3, 600_000));

    let result = client.request("prompt").await;

    assert!(matches!(result, Err(GenerateError::Transient(_))));
    assert_eq!(generator.calls(), 3);
    assert_eq!(client.stats().await.backoff_sleeps, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_errors_are_not_retried() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerateError::Fatal("HTTP 401".to_string())),
        Ok("never reached".to_string()),
    ]));
    let client = client(generator.clone(), config(0, 3, 60_000));

    let result = client.request("prompt").await;

    assert_eq!(result, Err(GenerateError::Fatal("HTTP 401".to_string())));
    assert_eq!(generator.calls(), 1);
    let stats = client.stats().await;
    assert_eq!(stats.backoff_sleeps, 0);
    assert_eq!(stats.failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_paced() {
    let generator = Arc::new(ScriptedGenerator::new(
        (0..3).map(|i| Ok(format!("answer {}", i))).collect(),
    ));
    let client = client(generator.clone(), config(500, 1, 0));

    let started = Instant::now();
    for _ in 0..3 {
        client.request("prompt").await.unwrap();
    }

    // First dispatch is immediate, the next two wait for the interval
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(client.stats().await.backoff_sleeps, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempts_count_toward_pacing() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerateError::Transient("reset".to_string())),
        Ok("ok".to_string()),
    ]));
    // Backoff of 1s is shorter than the 3s pacing interval
    let client = client(generator.clone(), config(3_000, 2, 60_000));

    let started = Instant::now();
    client.request("prompt").await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3));
}
