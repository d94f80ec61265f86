//! Request batching: fan logical requests out over a caller-supplied function.
//!
//! # Request Batching Module
//!
//! The batcher knows nothing about HTTP. It takes a list of parameter maps, a set of
//! fixed parameters merged into each of them, and a `perform` function (usually a
//! closure over a pooled client), and returns one [`BatchResult`] per input, in input
//! order. A failing (or panicking) item never aborts the batch.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RequestBatcher`] | Executes batches and keeps cumulative [`BatchStats`] |
//! | [`BatcherConfig`] | Chunk size, worker count, strategy and adaptive throttle knobs |
//! | [`BatchStrategy`] | Sequential, Parallel or Adaptive |
//! | [`BatchResult`] | Per-item outcome: `success`, `data`, `error`, `duration` |
//!
//! ## Example
//!
//! ```rust
//! use resilient_http::batch::{BatchStrategy, BatcherConfig, Params, RequestBatcher};
//! use serde_json::json;
//!
//! let batcher = RequestBatcher::new(
//!     BatcherConfig::new()
//!         .with_max_batch_size(2)
//!         .with_strategy(BatchStrategy::Parallel),
//! );
//!
//! let requests: Vec<Params> = ["INFY", "TCS", "WIPRO"]
//!     .iter()
//!     .map(|s| json!({ "symbol": s }).as_object().cloned().unwrap_or_default())
//!     .collect();
//! let fixed = json!({ "series": "EQ" }).as_object().cloned().unwrap_or_default();
//!
//! let results = batcher.batch_requests(&requests, &fixed, |params| {
//!     let symbol = params["symbol"].as_str().unwrap_or_default().to_string();
//!     Ok::<_, String>(format!("{}-{}", symbol, params["series"].as_str().unwrap_or_default()))
//! });
//!
//! assert_eq!(results.len(), 3);
//! assert_eq!(results[1].data.as_deref(), Some("TCS-EQ"));
//! ```
//!
//! ## Strategies
//!
//! - **Sequential**: chunks one after another, items one after another
//! - **Parallel**: chunks spread over `max_concurrent_batches` worker threads
//! - **Adaptive**: Parallel for few chunks, otherwise Sequential with a throttle under
//!   sustained slow chunks

mod config;
mod executor;
mod result;

pub use config::{BatchStrategy, BatcherConfig};
pub use executor::RequestBatcher;
pub use result::{BatchResult, BatchStats};

/// Parameters of one logical request.
pub type Params = serde_json::Map<String, serde_json::Value>;
