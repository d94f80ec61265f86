//! Per-host client pool with TTL expiry and a bounded number of clients per host.
//!
//! The pool hands out shared [`HttpClient`] / [`AsyncHttpClient`] handles keyed by
//! the origin (`scheme://host[:port]`) of the requested base URL, and builds each client
//! against that origin so callers pass full paths on every request. Lookup, expiry and
//! insertion happen under one pool-wide lock; using a returned client does not.
//!
//! | Step | Behaviour |
//! |------|-----------|
//! | purge | entries older than `session_ttl` are dropped and closed (both kinds) |
//! | reuse | a live entry for the host is returned and its `last_used` bumped |
//! | create | below `max_sessions`, a new client is built and registered |
//! | fallback | at capacity, the least-recently-used entry is shared |
//!
//! Construct a [`ConnectionPool`] explicitly and pass it around; [`global_pool`] is a
//! convenience wrapper over a lazily created process-wide instance.

mod global;

pub use global::{get_async_client, get_client, global_pool, reset_global_pool};

use crate::client::{AsyncHttpClient, ClientConfig, HttpClient};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum age of a pooled client; older entries are closed on the next lookup.
    #[serde(with = "crate::config::duration_secs", rename = "session_ttl_secs")]
    pub session_ttl: Duration,
    /// Upper bound of clients per host and per kind (blocking / async).
    pub max_sessions: usize,
    /// Reuse only entries nobody else currently holds before creating new ones.
    pub prefer_idle: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(300),
            max_sessions: 10,
            prefer_idle: false,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_max_sessions(mut self, n: usize) -> Self {
        self.max_sessions = n;
        self
    }

    pub fn with_prefer_idle(mut self, prefer_idle: bool) -> Self {
        self.prefer_idle = prefer_idle;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(Error::configuration_with_context(
                "max_sessions must be at least 1",
                ErrorContext::new()
                    .with_field_path("pool.max_sessions")
                    .with_source("connection_pool"),
            ));
        }
        if self.session_ttl.is_zero() {
            return Err(Error::configuration_with_context(
                "session_ttl must be greater than zero",
                ErrorContext::new()
                    .with_field_path("pool.session_ttl_secs")
                    .with_source("connection_pool"),
            ));
        }
        Ok(())
    }
}

/// Observability view of the pool; plain counts and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub sync_clients: usize,
    pub async_clients: usize,
    pub hosts_sync: usize,
    pub hosts_async: usize,
    pub max_per_host: usize,
    pub ttl_secs: u64,
}

/// Anything the pool can build for a host and close on eviction.
trait PooledClient: Sized {
    const KIND: &'static str;
    fn connect(base_url: &str, config: &ClientConfig) -> Result<Self>;
    fn close(&self);
}

impl PooledClient for HttpClient {
    const KIND: &'static str = "sync";

    fn connect(base_url: &str, config: &ClientConfig) -> Result<Self> {
        HttpClient::with_config(base_url, config.clone())
    }

    fn close(&self) {
        HttpClient::close(self);
    }
}

impl PooledClient for AsyncHttpClient {
    const KIND: &'static str = "async";

    fn connect(base_url: &str, config: &ClientConfig) -> Result<Self> {
        AsyncHttpClient::with_config(base_url, config.clone())
    }

    fn close(&self) {
        AsyncHttpClient::close(self);
    }
}

struct ClientEntry<C> {
    client: Arc<C>,
    created_at: Instant,
    last_used: Instant,
}

impl<C> ClientEntry<C> {
    fn new(client: C, now: Instant) -> Self {
        Self {
            client: Arc::new(client),
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }

    /// Only the pool holds this client.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.client) == 1
    }

    fn touch(&mut self, now: Instant) -> Arc<C> {
        self.last_used = now;
        self.client.clone()
    }
}

type Buckets<C> = HashMap<String, Vec<ClientEntry<C>>>;

#[derive(Default)]
struct PoolState {
    sync: Buckets<HttpClient>,
    asynchronous: Buckets<AsyncHttpClient>,
}

pub struct ConnectionPool {
    config: PoolConfig,
    client_config: ClientConfig,
    async_client_config: ClientConfig,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_client_configs(config, ClientConfig::default(), ClientConfig::async_defaults())
    }

    /// Pool whose clients are built from the given configurations.
    pub fn with_client_configs(
        config: PoolConfig,
        client_config: ClientConfig,
        async_client_config: ClientConfig,
    ) -> Self {
        Self {
            config,
            client_config,
            async_client_config,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Shared blocking client for the host of `base_url`.
    pub fn get_client(&self, base_url: &str) -> Result<Arc<HttpClient>> {
        let host = host_key(base_url)?;
        let now = Instant::now();
        let mut state = self.lock();
        self.purge_expired(&mut state, now);
        checkout(
            &mut state.sync,
            &self.config,
            &host,
            &self.client_config,
            now,
        )
    }

    /// Shared async client for the host of `base_url`; same policy, separate buckets.
    pub fn get_async_client(&self, base_url: &str) -> Result<Arc<AsyncHttpClient>> {
        let host = host_key(base_url)?;
        let now = Instant::now();
        let mut state = self.lock();
        self.purge_expired(&mut state, now);
        checkout(
            &mut state.asynchronous,
            &self.config,
            &host,
            &self.async_client_config,
            now,
        )
    }

    fn purge_expired(&self, state: &mut PoolState, now: Instant) {
        let ttl = self.config.session_ttl;
        let evicted = purge(&mut state.sync, ttl, now) + purge(&mut state.asynchronous, ttl, now);
        if evicted > 0 {
            info!(evicted, ttl_secs = ttl.as_secs_f64(), "evicted expired pooled clients");
        }
    }

    /// Close every tracked client and forget them.
    ///
    /// Handles still held by callers stay usable; their next request rebuilds the
    /// connection object.
    pub fn close_all(&self) {
        let mut state = self.lock();
        let mut closed = 0usize;
        for entry in state.sync.drain().flat_map(|(_, v)| v) {
            entry.client.close();
            closed += 1;
        }
        for entry in state.asynchronous.drain().flat_map(|(_, v)| v) {
            entry.client.close();
            closed += 1;
        }
        info!(closed, "connection pool closed");
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            sync_clients: state.sync.values().map(Vec::len).sum(),
            async_clients: state.asynchronous.values().map(Vec::len).sum(),
            hosts_sync: state.sync.len(),
            hosts_async: state.asynchronous.len(),
            max_per_host: self.config.max_sessions,
            ttl_secs: self.config.session_ttl.as_secs(),
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &self.get_pool_stats())
            .finish()
    }
}

fn purge<C: PooledClient>(buckets: &mut Buckets<C>, ttl: Duration, now: Instant) -> usize {
    let mut evicted = 0;
    buckets.retain(|_, entries| {
        entries.retain(|entry| {
            if entry.is_expired(ttl, now) {
                entry.client.close();
                evicted += 1;
                false
            } else {
                true
            }
        });
        !entries.is_empty()
    });
    evicted
}

fn checkout<C: PooledClient>(
    buckets: &mut Buckets<C>,
    config: &PoolConfig,
    host: &str,
    client_config: &ClientConfig,
    now: Instant,
) -> Result<Arc<C>> {
    let entries = buckets.entry(host.to_string()).or_default();

    let reusable = if config.prefer_idle {
        entries.iter_mut().find(|e| e.is_idle())
    } else {
        entries.first_mut()
    };
    if let Some(entry) = reusable {
        debug!(host, kind = C::KIND, "reusing pooled client");
        return Ok(entry.touch(now));
    }

    if entries.len() < config.max_sessions.max(1) {
        let client = match C::connect(host, client_config) {
            Ok(client) => client,
            Err(e) => {
                if entries.is_empty() {
                    buckets.remove(host);
                }
                return Err(e);
            }
        };
        let entry = ClientEntry::new(client, now);
        let handle = entry.client.clone();
        entries.push(entry);
        debug!(host, kind = C::KIND, size = entries.len(), "created pooled client");
        return Ok(handle);
    }

    // At capacity: share the least-recently-used entry rather than reject.
    let lru = entries
        .iter_mut()
        .min_by_key(|e| e.last_used)
        .ok_or_else(|| {
            Error::runtime_with_context(
                "pool bucket unexpectedly empty",
                ErrorContext::new()
                    .with_field_path(host)
                    .with_source("connection_pool"),
            )
        })?;
    debug!(host, kind = C::KIND, "pool at capacity, sharing least-recently-used client");
    Ok(lru.touch(now))
}

/// `scheme://host[:port]` of an http(s) URL.
pub(crate) fn host_key(base_url: &str) -> Result<String> {
    let invalid = |details: String| {
        Error::configuration_with_context(
            "base_url must be an absolute http(s) URL",
            ErrorContext::new()
                .with_field_path("base_url")
                .with_details(details)
                .with_source("connection_pool"),
        )
    };
    let url = url::Url::parse(base_url).map_err(|e| invalid(format!("{}: {}", base_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid(base_url.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}
