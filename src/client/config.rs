use crate::resilience::{CircuitBreakerConfig, RetryPolicy, TokenBucketConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration shared by [`HttpClient`](super::HttpClient) and
/// [`AsyncHttpClient`](super::AsyncHttpClient).
///
/// Keep this surface area small and predictable; the defaults are tuned for a single
/// flaky, throttling upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per transport call timeout.
    #[serde(with = "crate::config::duration_secs", rename = "timeout_secs")]
    pub timeout: Duration,
    /// Maximum idle keep-alive connections kept per host.
    pub max_connections: usize,
    /// Token bucket refill rate; the bucket holds one second worth of tokens.
    pub rate_limit_per_sec: f64,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    /// Upper bound for honouring a 429 `Retry-After` header.
    #[serde(with = "crate::config::duration_secs", rename = "max_retry_after_secs")]
    pub max_retry_after: Duration,
    /// Path requested to obtain session cookies; `None` disables priming.
    pub prime_path: Option<String>,
    pub user_agent: Option<String>,
    pub extra_headers: BTreeMap<String, String>,
    pub proxy_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_connections: 20,
            rate_limit_per_sec: 10.0,
            // High threshold: anti-bot upstreams fail often without being down.
            circuit_breaker: CircuitBreakerConfig::new().with_failure_threshold(50),
            retry: RetryPolicy::default(),
            max_retry_after: Duration::from_secs(5),
            prime_path: Some("/".to_string()),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            proxy_url: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the async client: more connections and a higher request rate.
    pub fn async_defaults() -> Self {
        Self {
            max_connections: 50,
            rate_limit_per_sec: 20.0,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n.max(1);
        self
    }

    pub fn with_rate_limit(mut self, per_sec: f64) -> Self {
        self.rate_limit_per_sec = per_sec;
        self
    }

    pub fn with_circuit_breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = cfg;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_retry_after(mut self, cap: Duration) -> Self {
        self.max_retry_after = cap;
        self
    }

    pub fn with_prime_path(mut self, path: impl Into<String>) -> Self {
        self.prime_path = Some(path.into());
        self
    }

    pub fn without_priming(mut self) -> Self {
        self.prime_path = None;
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub(crate) fn token_bucket(&self) -> Result<TokenBucketConfig> {
        TokenBucketConfig::from_rps(self.rate_limit_per_sec).ok_or_else(|| {
            Error::configuration_with_context(
                "rate limit must be a positive number of requests per second",
                ErrorContext::new()
                    .with_field_path("client.rate_limit_per_sec")
                    .with_details(self.rate_limit_per_sec.to_string())
                    .with_source("client_config"),
            )
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.token_bucket()?.validate()?;
        if self.timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "timeout must be greater than zero",
                ErrorContext::new()
                    .with_field_path("client.timeout_secs")
                    .with_source("client_config"),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "retry.max_attempts must be at least 1",
                ErrorContext::new()
                    .with_field_path("client.retry.max_attempts")
                    .with_source("client_config"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(15));
        assert_eq!(cfg.max_connections, 20);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 50);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.max_retry_after, Duration::from_secs(5));
        assert!(cfg.validate().is_ok());

        let async_cfg = ClientConfig::async_defaults();
        assert_eq!(async_cfg.max_connections, 50);
        assert_eq!(async_cfg.rate_limit_per_sec, 20.0);
    }

    #[test]
    fn test_client_config_rejects_bad_rate() {
        let cfg = ClientConfig::default().with_rate_limit(0.0);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("client.rate_limit_per_sec"));
    }

    #[test]
    fn test_client_config_token_bucket() {
        let bucket = ClientConfig::default().with_rate_limit(4.0).token_bucket().unwrap();
        assert_eq!(bucket.capacity, 4);
        assert_eq!(bucket.refill_rate, 4.0);
    }
}
