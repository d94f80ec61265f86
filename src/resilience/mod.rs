//! # Resilience Primitives Module
//!
//! Per-client building blocks that every request passes through:
//! circuit check, then rate limiter, then transport, all inside the retry policy.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Failure-triggered fast-fail gate |
//! | [`rate_limiter`] | Token bucket limiting request rate |
//! | [`retry`] | Bounded retry with exponential backoff and jitter |
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use resilient_http::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(3)
//!         .with_reset_timeout(Duration::from_secs(30)),
//! );
//!
//! if breaker.allow() {
//!     // Make the call...
//!     breaker.record_success();
//! }
//! ```
//!
//! ## Token Bucket
//!
//! ```rust
//! use resilient_http::resilience::rate_limiter::{TokenBucket, TokenBucketConfig};
//!
//! let bucket = TokenBucket::new(
//!     TokenBucketConfig::new()
//!         .with_capacity(10)
//!         .with_refill_rate(10.0),
//! );
//! bucket.acquire(1).unwrap();
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
pub use rate_limiter::{TokenBucket, TokenBucketConfig, TokenBucketSnapshot};
pub use retry::RetryPolicy;
