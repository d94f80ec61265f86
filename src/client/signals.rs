use crate::resilience::circuit_breaker::CircuitBreakerSnapshot;
use crate::resilience::rate_limiter::TokenBucketSnapshot;

/// A lightweight snapshot of a client's runtime "signals".
///
/// Facts only (no policy); callers can build their own pacing or health views on top.
#[derive(Debug, Clone)]
pub struct ClientSignals {
    pub base_url: String,
    pub circuit_breaker: CircuitBreakerSnapshot,
    pub rate_limiter: TokenBucketSnapshot,
    /// Whether the underlying connection object is currently closed.
    pub closed: bool,
}

impl ClientSignals {
    /// The circuit currently rejects requests.
    pub fn circuit_open(&self) -> bool {
        self.circuit_breaker
            .open_remaining_ms
            .map(|ms| ms > 0)
            .unwrap_or(false)
    }
}
