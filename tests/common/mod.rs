//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use resilient_http::{ClientConfig, RetryPolicy};
use std::time::Duration;

/// Install a `RUST_LOG`-driven subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retry policy with millisecond backoff so retry tests stay fast.
pub fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(attempts)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
}

/// Client config without priming, fast retries and a generous rate limit.
pub fn test_config(attempts: u32) -> ClientConfig {
    ClientConfig::new()
        .without_priming()
        .with_rate_limit(1000.0)
        .with_timeout(Duration::from_secs(5))
        .with_retry(fast_retry(attempts))
}

pub fn test_async_config(attempts: u32) -> ClientConfig {
    ClientConfig::async_defaults()
        .without_priming()
        .with_rate_limit(1000.0)
        .with_timeout(Duration::from_secs(5))
        .with_retry(fast_retry(attempts))
}
