//! # resilient-http
//!
//! Client-side resilience layer for a single rate-limiting, anti-bot protected HTTP
//! upstream.
//!
//! ## Overview
//!
//! Many logical data requests are multiplexed over a few reusable connections. Each
//! request passes through a circuit breaker, a token-bucket rate limiter, the transport
//! and a bounded retry policy; bulk work is fanned out by a batcher with bounded
//! concurrency that reports one outcome per request.
//!
//! ## Key Features
//!
//! - **Resilient clients**: [`HttpClient`] (blocking) and [`AsyncHttpClient`] with
//!   session priming, browser-like default headers and typed JSON helpers
//! - **Connection pool**: [`ConnectionPool`] keyed by host with TTL expiry and
//!   least-recently-used fallback at capacity
//! - **Batching**: [`RequestBatcher`] with Sequential, Parallel and Adaptive strategies
//! - **Resilience primitives**: circuit breaker, token bucket and retry policy in
//!   [`resilience`]
//! - **Configuration**: YAML settings with `RESILIENT_HTTP_*` environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_http::{ConnectionPool, PoolConfig};
//!
//! fn main() -> resilient_http::Result<()> {
//!     let pool = ConnectionPool::new(PoolConfig::default());
//!     let client = pool.get_client("https://www.example.com")?;
//!
//!     let quote: serde_json::Value =
//!         client.get_json("/api/quote-equity", &[("symbol", "INFY")])?;
//!     println!("{}", quote);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Blocking and async resilient clients |
//! | [`pool`] | Per-host client pool and the global convenience pool |
//! | [`batch`] | Request batching and statistics |
//! | [`resilience`] | Circuit breaker, token bucket and retry policy |
//! | [`transport`] | reqwest construction, default headers, cookie jar |
//! | [`config`] | YAML and environment settings |

pub mod batch;
pub mod client;
pub mod config;
pub mod pool;
pub mod resilience;
pub mod transport;

// Re-export main types for convenience
pub use batch::{BatchResult, BatchStats, BatchStrategy, BatcherConfig, Params, RequestBatcher};
pub use client::{AsyncHttpClient, ClientConfig, ClientSignals, HttpClient};
pub use config::Settings;
pub use pool::{
    get_async_client, get_client, global_pool, reset_global_pool, ConnectionPool, PoolConfig,
    PoolStats,
};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, TokenBucket};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
