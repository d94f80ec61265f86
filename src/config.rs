//! Settings aggregation: YAML file first, environment overrides second.
//!
//! ```yaml
//! client:
//!   timeout_secs: 10
//!   rate_limit_per_sec: 5
//!   circuit_breaker:
//!     failure_threshold: 20
//! pool:
//!   session_ttl_secs: 120
//!   max_sessions: 4
//! batch:
//!   strategy: parallel
//! ```
//!
//! Environment knobs (applied to both client configs where relevant):
//! - `RESILIENT_HTTP_TIMEOUT_SECS`
//! - `RESILIENT_HTTP_MAX_CONNECTIONS`
//! - `RESILIENT_HTTP_RPS`
//! - `RESILIENT_HTTP_BREAKER_FAILURE_THRESHOLD`
//! - `RESILIENT_HTTP_BREAKER_RESET_SECS`
//! - `RESILIENT_HTTP_MAX_ATTEMPTS`
//! - `RESILIENT_HTTP_PROXY_URL`
//! - `RESILIENT_HTTP_SESSION_TTL_SECS`
//! - `RESILIENT_HTTP_MAX_SESSIONS`
//! - `RESILIENT_HTTP_BATCH_SIZE`
//! - `RESILIENT_HTTP_CONCURRENT_BATCHES`

use crate::batch::{BatcherConfig, RequestBatcher};
use crate::client::ClientConfig;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Serde adapter storing a `Duration` as fractional seconds.
pub(crate) mod duration_secs {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "expected a non-negative number of seconds, got {}",
                secs
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub async_client: ClientConfig,
    pub pool: PoolConfig,
    pub batch: BatcherConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            async_client: ClientConfig::async_defaults(),
            pool: PoolConfig::default(),
            batch: BatcherConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading settings");
        Self::from_yaml_str(&raw)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `RESILIENT_HTTP_*` overrides read through `lookup`.
    ///
    /// Unparseable values are configuration errors rather than silently ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = parse_var::<f64, _>(&lookup, "RESILIENT_HTTP_TIMEOUT_SECS")? {
            let timeout = secs_to_duration(secs, "RESILIENT_HTTP_TIMEOUT_SECS")?;
            self.for_each_client(|c| c.timeout = timeout);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "RESILIENT_HTTP_MAX_CONNECTIONS")? {
            self.for_each_client(|c| c.max_connections = n.max(1));
        }
        if let Some(rps) = parse_var::<f64, _>(&lookup, "RESILIENT_HTTP_RPS")? {
            self.for_each_client(|c| c.rate_limit_per_sec = rps);
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "RESILIENT_HTTP_BREAKER_FAILURE_THRESHOLD")? {
            self.for_each_client(|c| c.circuit_breaker.failure_threshold = n.max(1));
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "RESILIENT_HTTP_BREAKER_RESET_SECS")? {
            let reset = secs_to_duration(secs, "RESILIENT_HTTP_BREAKER_RESET_SECS")?;
            self.for_each_client(|c| c.circuit_breaker.reset_timeout = reset);
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "RESILIENT_HTTP_MAX_ATTEMPTS")? {
            self.for_each_client(|c| c.retry.max_attempts = n.max(1));
        }
        if let Some(url) = lookup("RESILIENT_HTTP_PROXY_URL").filter(|s| !s.trim().is_empty()) {
            self.for_each_client(|c| c.proxy_url = Some(url.trim().to_string()));
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "RESILIENT_HTTP_SESSION_TTL_SECS")? {
            self.pool.session_ttl = secs_to_duration(secs, "RESILIENT_HTTP_SESSION_TTL_SECS")?;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "RESILIENT_HTTP_MAX_SESSIONS")? {
            self.pool.max_sessions = n;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "RESILIENT_HTTP_BATCH_SIZE")? {
            self.batch.max_batch_size = n;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "RESILIENT_HTTP_CONCURRENT_BATCHES")? {
            self.batch.max_concurrent_batches = n;
        }
        self.validate()
    }

    fn for_each_client(&mut self, mut f: impl FnMut(&mut ClientConfig)) {
        f(&mut self.client);
        f(&mut self.async_client);
    }

    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.async_client.validate()?;
        self.pool.validate()?;
        self.batch.validate()?;
        Ok(())
    }

    pub fn build_pool(&self) -> ConnectionPool {
        ConnectionPool::with_client_configs(
            self.pool.clone(),
            self.client.clone(),
            self.async_client.clone(),
        )
    }

    pub fn build_batcher(&self) -> RequestBatcher {
        RequestBatcher::new(self.batch.clone())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| {
        Error::configuration_with_context(
            format!("invalid value for {}", key),
            ErrorContext::new()
                .with_field_path(key)
                .with_details(raw.to_string())
                .with_source("settings"),
        )
    })
}

fn secs_to_duration(secs: f64, key: &str) -> Result<Duration> {
    let invalid = || {
        Error::configuration_with_context(
            "duration must be a non-negative number of seconds",
            ErrorContext::new()
                .with_field_path(key)
                .with_details(secs.to_string())
                .with_source("settings"),
        )
    };
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}
