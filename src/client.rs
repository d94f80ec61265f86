//! Resilient HTTP clients bound to a single upstream host.
//!
//! Keep the public surface small and predictable: two clients (blocking and async) with
//! the same pipeline, one shared configuration type and a signals snapshot.
//! Implementation details are split into submodules under `src/client/`.

mod blocking;
mod config;
mod nonblocking;
pub(crate) mod response;
pub mod signals;

pub use blocking::HttpClient;
pub use config::ClientConfig;
pub use nonblocking::AsyncHttpClient;
pub use signals::ClientSignals;
