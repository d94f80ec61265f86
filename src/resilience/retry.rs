//! Bounded retry with exponential backoff and jitter.
//!
//! The policy is an explicit object applied through [`RetryPolicy::run`] (blocking) or
//! [`RetryPolicy::run_async`] (suspending). Each attempt either fails with an
//! [`Error`](crate::Error), which is retried when
//! [`Error::is_retryable`](crate::Error::is_retryable) says so, or produces a value that
//! the caller-supplied `retry_if` predicate may still reject (e.g. a 503 response).

use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Statuses that signal throttling, anti-bot blocking or transient upstream failure.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 7] = [302, 403, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    #[serde(with = "crate::config::duration_secs", rename = "initial_backoff_secs")]
    pub initial_backoff: Duration,
    #[serde(with = "crate::config::duration_secs", rename = "max_backoff_secs")]
    pub max_backoff: Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            jitter: true,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retryable_statuses = statuses.into();
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay after the failed attempt `attempt` (0-based): `initial * 2^attempt`, plus up
    /// to `initial` of random jitter, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64();
        let exp = base * 2f64.powi(attempt.min(30) as i32);
        let jitter = if self.jitter {
            fastrand::f64() * base
        } else {
            0.0
        };
        let capped = (exp + jitter).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn next_step<T>(
        &self,
        attempt: u32,
        outcome: &Result<T>,
        retry_if: &impl Fn(&T) -> bool,
    ) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let retry = match outcome {
            Ok(value) => retry_if(value),
            Err(e) => e.is_retryable(),
        };
        if !retry {
            return None;
        }
        let delay = self.backoff(attempt);
        match outcome {
            Err(e) => debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "attempt failed, backing off"
            ),
            Ok(_) => debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retryable result, backing off"
            ),
        }
        Some(delay)
    }

    /// Run `op` until it succeeds with a value `retry_if` accepts, fails with a
    /// non-retryable error, or the attempt ceiling is reached.
    ///
    /// On exhaustion the last outcome is returned unchanged: the last error, or the last
    /// value even if `retry_if` still rejects it.
    pub fn run<T, F, R>(&self, mut op: F, retry_if: R) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        R: Fn(&T) -> bool,
    {
        let mut attempt = 0;
        loop {
            let outcome = op(attempt);
            match self.next_step(attempt, &outcome, &retry_if) {
                Some(delay) => std::thread::sleep(delay),
                None => return outcome,
            }
            attempt += 1;
        }
    }

    /// Async counterpart of [`run`](Self::run); backoff suspends instead of blocking.
    pub async fn run_async<T, F, Fut, R>(&self, mut op: F, retry_if: R) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Fn(&T) -> bool,
    {
        let mut attempt = 0;
        loop {
            let outcome = op(attempt).await;
            match self.next_step(attempt, &outcome, &retry_if) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return outcome,
            }
            attempt += 1;
        }
    }
}

/// Convenience predicate for operations with no "retryable success" notion.
pub fn never<T>(_: &T) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::Error;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy::new()
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
            .with_jitter(false)
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(5));
        for status in [302, 403, 429, 500, 502, 503, 504] {
            assert!(policy.is_retryable_status(status));
        }
        assert!(!policy.is_retryable_status(200));
        assert!(!policy.is_retryable_status(404));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new().with_jitter(false);
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let policy = RetryPolicy::new();
        for attempt in 0..6 {
            let d = policy.backoff(attempt);
            let floor = policy.initial_backoff.as_secs_f64() * 2f64.powi(attempt as i32);
            assert!(d.as_secs_f64() >= floor.min(5.0) - 1e-9);
            assert!(d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_run_retries_transport_errors_then_succeeds() {
        let calls = Cell::new(0);
        let out = fast().run(
            |_| {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(Error::Transport(TransportError::ClientClosed))
                } else {
                    Ok(42)
                }
            },
            never,
        );
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_run_stops_at_ceiling_and_surfaces_last_error() {
        let calls = Cell::new(0);
        let out: Result<()> = fast().with_max_attempts(4).run(
            |_| {
                calls.set(calls.get() + 1);
                Err(Error::UnexpectedContentType {
                    status: 200,
                    content_type: "text/html".into(),
                })
            },
            never,
        );
        assert!(matches!(out, Err(Error::UnexpectedContentType { .. })));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_run_does_not_retry_circuit_open() {
        let calls = Cell::new(0);
        let out: Result<()> = fast().run(
            |_| {
                calls.set(calls.get() + 1);
                Err(Error::CircuitOpen {
                    failures: 50,
                    retry_in: Duration::from_secs(1),
                })
            },
            never,
        );
        assert!(out.unwrap_err().is_circuit_open());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_run_retries_rejected_values_and_returns_last() {
        let calls = Cell::new(0);
        let out = fast().with_max_attempts(3).run(
            |attempt| {
                calls.set(calls.get() + 1);
                Ok(attempt)
            },
            |_| true,
        );
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_run_passes_through_accepted_values_first_time() {
        let calls = Cell::new(0);
        let out = fast().run(
            |_| {
                calls.set(calls.get() + 1);
                Ok(404u16)
            },
            |status| fast().is_retryable_status(*status),
        );
        assert_eq!(out.unwrap(), 404);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_run_async_retries() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let out = fast()
            .run_async(
                |_| {
                    let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(Error::Status {
                                status: 503,
                                retryable: true,
                                body: String::new(),
                            })
                        } else {
                            Ok("ok")
                        }
                    }
                },
                never,
            )
            .await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_async_surfaces_non_retryable_error_immediately() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let out: Result<()> = tokio_test::block_on(fast().run_async(
            |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err(Error::Status {
                        status: 404,
                        retryable: false,
                        body: String::new(),
                    })
                }
            },
            never,
        ));
        assert!(matches!(out, Err(Error::Status { status: 404, .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
