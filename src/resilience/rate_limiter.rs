use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Fixed pause between acquire attempts while the bucket is empty.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketSnapshot {
    pub capacity: f64,
    pub refill_rate: f64,
    pub tokens: f64,
    /// Estimated wait until one token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBucketConfig {
    /// Maximum burst size (tokens).
    pub capacity: u32,
    /// Tokens per second.
    pub refill_rate: f64,
}

impl TokenBucketConfig {
    pub fn new() -> Self {
        Self {
            capacity: 10,
            refill_rate: 10.0,
        }
    }

    /// Bucket holding one second worth of requests, at least one token.
    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return None;
        }
        Some(Self {
            capacity: (rps.ceil() as u32).max(1),
            refill_rate: rps,
        })
    }

    /// Set the maximum tokens (burst size)
    pub fn with_capacity(mut self, tokens: u32) -> Self {
        self.capacity = tokens;
        self
    }

    /// Set the refill rate (tokens per second)
    pub fn with_refill_rate(mut self, rate: f64) -> Self {
        self.refill_rate = rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::configuration_with_context(
                "token bucket capacity must be at least 1",
                ErrorContext::new()
                    .with_field_path("capacity")
                    .with_source("token_bucket"),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(Error::configuration_with_context(
                "token bucket refill rate must be a positive number",
                ErrorContext::new()
                    .with_field_path("refill_rate")
                    .with_details(self.refill_rate.to_string())
                    .with_source("token_bucket"),
            ));
        }
        Ok(())
    }
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter private to one client.
///
/// Refill is lazy: every attempt credits `elapsed * refill_rate` tokens, capped at
/// capacity. Waiters poll at [`POLL_INTERVAL`]; there is no FIFO fairness between them.
pub struct TokenBucket {
    cfg: TokenBucketConfig,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(cfg: TokenBucketConfig) -> Self {
        let state = Mutex::new(State {
            tokens: cfg.capacity as f64,
            last_refill: Instant::now(),
        });
        Self { cfg, state }
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn refill_locked(cfg: &TokenBucketConfig, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * cfg.refill_rate).min(cfg.capacity as f64);
            st.last_refill = now;
        }
    }

    fn ensure_satisfiable(&self, cost: u32) -> Result<()> {
        if cost > self.cfg.capacity {
            return Err(Error::configuration_with_context(
                format!(
                    "acquire cost {} exceeds bucket capacity {}",
                    cost, self.cfg.capacity
                ),
                ErrorContext::new().with_source("token_bucket"),
            ));
        }
        Ok(())
    }

    /// Take `cost` tokens if they are available right now.
    pub fn try_acquire(&self, cost: u32) -> bool {
        let mut st = self.lock();
        Self::refill_locked(&self.cfg, &mut st);
        let cost = cost as f64;
        if st.tokens >= cost {
            st.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Block the calling thread until `cost` tokens are available, then take them.
    pub fn acquire(&self, cost: u32) -> Result<()> {
        self.ensure_satisfiable(cost)?;
        while !self.try_acquire(cost) {
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Suspend the calling task until `cost` tokens are available, then take them.
    pub async fn acquire_async(&self, cost: u32) -> Result<()> {
        self.ensure_satisfiable(cost)?;
        while !self.try_acquire(cost) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> TokenBucketSnapshot {
        let mut st = self.lock();
        Self::refill_locked(&self.cfg, &mut st);
        let estimated_wait_ms = if st.tokens < 1.0 {
            let missing = 1.0 - st.tokens;
            Some((missing / self.cfg.refill_rate * 1000.0).ceil() as u64)
        } else {
            None
        };
        TokenBucketSnapshot {
            capacity: self.cfg.capacity as f64,
            refill_rate: self.cfg.refill_rate,
            tokens: st.tokens,
            estimated_wait_ms,
        }
    }
}
