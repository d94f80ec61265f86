//! Process-wide pool for callers that do not want to thread a pool through their code.

use super::ConnectionPool;
use crate::client::{AsyncHttpClient, HttpClient};
use crate::config::Settings;
use crate::Result;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use tracing::info;

static GLOBAL_POOL: Lazy<Mutex<Option<Arc<ConnectionPool>>>> = Lazy::new(|| Mutex::new(None));

/// Returns the global pool, creating it from [`Settings::from_env`] on first use.
pub fn global_pool() -> Result<Arc<ConnectionPool>> {
    let mut slot = GLOBAL_POOL.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(pool) = slot.as_ref() {
        return Ok(pool.clone());
    }
    let pool = Arc::new(Settings::from_env()?.build_pool());
    info!(config = ?pool.config(), "global connection pool created");
    *slot = Some(pool.clone());
    Ok(pool)
}

/// Tear down the global pool; the next [`global_pool`] call builds a fresh one.
pub fn reset_global_pool() {
    let previous = GLOBAL_POOL
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take();
    if let Some(pool) = previous {
        pool.close_all();
    }
}

/// Blocking client from the global pool.
pub fn get_client(base_url: &str) -> Result<Arc<HttpClient>> {
    global_pool()?.get_client(base_url)
}

/// Async client from the global pool.
pub fn get_async_client(base_url: &str) -> Result<Arc<AsyncHttpClient>> {
    global_pool()?.get_async_client(base_url)
}
