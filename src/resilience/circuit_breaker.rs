use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub failure_count: u32,
    /// Remaining open time in ms, if currently open (zero once half-open).
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "crate::config::duration_secs", rename = "reset_timeout_secs")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set how long the circuit stays open before trial requests are admitted
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Failure-triggered fast-fail gate.
///
/// Closed, Open and Half-Open are folded into two fields:
/// - Closed: `opened_at` unset
/// - Open: `opened_at` set and younger than `reset_timeout`
/// - Half-Open: `opened_at` set but older than `reset_timeout`; every caller is admitted
///   as a trial until a success closes the circuit or a failure re-opens it.
///
/// Half-Open trials are not single-flight.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    // A poisoned breaker still holds consistent counters; keep serving it.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Whether a request may go out right now.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// [`allow`](Self::allow) evaluated against an explicit clock reading.
    pub fn allow_at(&self, now: Instant) -> bool {
        let st = self.lock();
        match st.opened_at {
            None => true,
            Some(opened) => now.saturating_duration_since(opened) >= self.cfg.reset_timeout,
        }
    }

    /// Gate a request, returning [`Error::CircuitOpen`] when the circuit rejects it.
    pub fn check(&self) -> Result<()> {
        let now = Instant::now();
        let st = self.lock();
        if let Some(opened) = st.opened_at {
            let elapsed = now.saturating_duration_since(opened);
            if elapsed < self.cfg.reset_timeout {
                warn!(
                    failures = st.failure_count,
                    retry_in_ms = (self.cfg.reset_timeout - elapsed).as_millis() as u64,
                    "circuit open, rejecting request"
                );
                return Err(Error::CircuitOpen {
                    failures: st.failure_count,
                    retry_in: self.cfg.reset_timeout - elapsed,
                });
            }
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut st = self.lock();
        st.failure_count = 0;
        st.opened_at = None;
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// [`record_failure`](Self::record_failure) stamped with an explicit clock reading.
    pub fn record_failure_at(&self, now: Instant) {
        let mut st = self.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        if st.failure_count >= self.cfg.failure_threshold {
            st.opened_at = Some(now);
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = Instant::now();
        let st = self.lock();
        let open_remaining_ms = st.opened_at.map(|opened| {
            self.cfg
                .reset_timeout
                .saturating_sub(now.saturating_duration_since(opened))
                .as_millis() as u64
        });
        CircuitBreakerSnapshot {
            failure_threshold: self.cfg.failure_threshold,
            reset_timeout_ms: self.cfg.reset_timeout.as_millis() as u64,
            failure_count: st.failure_count,
            open_remaining_ms,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
