//! HTTP transport: reqwest client construction and the browser-like header set.
//!
//! Each resilient client owns exactly one transport. The transport keeps its reqwest
//! client behind an [`arc_swap::ArcSwapOption`] so it can be closed and rebuilt while
//! other threads hold handles, and keeps the cookie jar outside the client so priming
//! cookies survive a rebuild.

pub mod http;

pub use http::{BlockingTransport, HttpTransport};

use crate::client::ClientConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
];

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("client has been closed")]
    ClientClosed,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the underlying connection object should be thrown away and rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        match self {
            TransportError::ClientClosed => true,
            TransportError::Http(e) => e.is_connect(),
            TransportError::Other(_) => false,
        }
    }
}

/// Headers sent with every request: a rotated desktop User-Agent plus the XHR-style
/// headers anti-bot front ends expect, then any `extra_headers` from the config.
pub fn default_headers(base_url: &str, config: &ClientConfig) -> HeaderMap {
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| USER_AGENTS[fastrand::usize(..USER_AGENTS.len())].to_string());
    let referer = format!("{}/", base_url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    let fixed: [(&str, &str); 10] = [
        ("user-agent", ua.as_str()),
        ("referer", referer.as_str()),
        ("x-requested-with", "XMLHttpRequest"),
        ("accept", "*/*"),
        ("accept-language", "en-GB,en-US;q=0.9,en;q=0.8"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("sec-fetch-dest", "empty"),
    ];
    for (name, value) in fixed {
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), v);
        }
    }

    for (name, value) in &config.extra_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                headers.insert(n, v);
            }
            _ => warn!(header = name.as_str(), "skipping invalid extra header"),
        }
    }
    headers
}

/// Rebuild the connection object if `err` calls for it, then hand `err` back.
///
/// A failed rebuild is logged and otherwise swallowed; the caller surfaces the original
/// transport failure and the next attempt retries the rebuild via `ClientClosed`.
pub(crate) fn recover<F>(err: TransportError, base_url: &str, rebuild: F) -> TransportError
where
    F: FnOnce() -> crate::Result<()>,
{
    if err.needs_rebuild() {
        warn!(base_url, "rebuilding connection object");
        if let Err(e) = rebuild() {
            warn!(base_url, error = %e, "rebuild failed");
        }
    }
    err
}

/// Join a base URL and a request path; absolute URLs pass through.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://h.example/", "/api/x"), "https://h.example/api/x");
        assert_eq!(join_url("https://h.example", "api/x"), "https://h.example/api/x");
        assert_eq!(join_url("https://h.example", ""), "https://h.example");
        assert_eq!(
            join_url("https://h.example", "https://other.example/p"),
            "https://other.example/p"
        );
    }

    #[test]
    fn test_default_headers() {
        let mut config = ClientConfig::default();
        config
            .extra_headers
            .insert("x-custom".to_string(), "1".to_string());
        config
            .extra_headers
            .insert("accept".to_string(), "application/json".to_string());
        let headers = default_headers("https://h.example/", &config);

        assert_eq!(headers["referer"], "https://h.example/");
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers["x-custom"], "1");
        assert_eq!(headers["accept"], "application/json");
        let ua = headers["user-agent"].to_str().unwrap();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[test]
    fn test_user_agent_override() {
        let config = ClientConfig::default().with_user_agent("scraper/1.0");
        let headers = default_headers("https://h.example", &config);
        assert_eq!(headers["user-agent"], "scraper/1.0");
    }

    #[test]
    fn test_closed_client_needs_rebuild() {
        assert!(TransportError::ClientClosed.needs_rebuild());
        assert!(!TransportError::Other("x".into()).needs_rebuild());
    }

    #[test]
    fn test_recover_keeps_original_error_when_rebuild_fails() {
        let err = recover(TransportError::ClientClosed, "https://h.example", || {
            Err(crate::Error::Transport(TransportError::Other(
                "tls backend unavailable".into(),
            )))
        });
        assert!(matches!(err, TransportError::ClientClosed));
    }

    #[test]
    fn test_recover_rebuilds_only_when_needed() {
        let mut rebuilt = 0;
        let err = recover(TransportError::Other("x".into()), "https://h.example", || {
            rebuilt += 1;
            Ok(())
        });
        assert!(matches!(err, TransportError::Other(_)));
        assert_eq!(rebuilt, 0);

        recover(TransportError::ClientClosed, "https://h.example", || {
            rebuilt += 1;
            Ok(())
        });
        assert_eq!(rebuilt, 1);
    }
}
