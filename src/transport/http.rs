use super::{default_headers, join_url, TransportError};
use crate::client::ClientConfig;
use crate::Result;
use arc_swap::ArcSwapOption;
use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use reqwest::{redirect, Method, Proxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

fn proxy(config: &ClientConfig) -> Result<Option<Proxy>> {
    match &config.proxy_url {
        Some(url) => Ok(Some(Proxy::all(url).map_err(TransportError::Http)?)),
        None => Ok(None),
    }
}

/// Async transport over a swappable [`reqwest::Client`].
pub struct HttpTransport {
    base_url: String,
    config: ClientConfig,
    headers: HeaderMap,
    jar: Arc<Jar>,
    client: ArcSwapOption<reqwest::Client>,
}

impl HttpTransport {
    pub fn new(base_url: &str, config: &ClientConfig) -> Result<Self> {
        let transport = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            headers: default_headers(base_url, config),
            jar: Arc::new(Jar::default()),
            client: ArcSwapOption::empty(),
        };
        transport.rebuild()?;
        Ok(transport)
    }

    fn build(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(self.config.max_connections)
            .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .default_headers(self.headers.clone())
            .cookie_provider(self.jar.clone())
            .redirect(redirect::Policy::none());
        if let Some(proxy) = proxy(&self.config)? {
            builder = builder.proxy(proxy);
        }
        Ok(builder.build().map_err(TransportError::Http)?)
    }

    /// Replace the connection object with a fresh one; cookies are kept.
    pub fn rebuild(&self) -> Result<()> {
        let client = self.build()?;
        self.client.store(Some(Arc::new(client)));
        debug!(base_url = self.base_url.as_str(), "async transport built");
        Ok(())
    }

    pub fn close(&self) {
        self.client.store(None);
    }

    pub fn is_closed(&self) -> bool {
        self.client.load().is_none()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let client = self.client.load_full().ok_or(TransportError::ClientClosed)?;
        let mut request = client.request(method, self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// Blocking transport over a swappable [`reqwest::blocking::Client`].
pub struct BlockingTransport {
    base_url: String,
    config: ClientConfig,
    headers: HeaderMap,
    jar: Arc<Jar>,
    client: ArcSwapOption<reqwest::blocking::Client>,
}

impl BlockingTransport {
    pub fn new(base_url: &str, config: &ClientConfig) -> Result<Self> {
        let transport = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            headers: default_headers(base_url, config),
            jar: Arc::new(Jar::default()),
            client: ArcSwapOption::empty(),
        };
        transport.rebuild()?;
        Ok(transport)
    }

    fn build(&self) -> Result<reqwest::blocking::Client> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(self.config.max_connections)
            .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .default_headers(self.headers.clone())
            .cookie_provider(self.jar.clone())
            .redirect(redirect::Policy::none());
        if let Some(proxy) = proxy(&self.config)? {
            builder = builder.proxy(proxy);
        }
        Ok(builder.build().map_err(TransportError::Http)?)
    }

    /// Replace the connection object with a fresh one; cookies are kept.
    pub fn rebuild(&self) -> Result<()> {
        let client = self.build()?;
        self.client.store(Some(Arc::new(client)));
        debug!(base_url = self.base_url.as_str(), "blocking transport built");
        Ok(())
    }

    pub fn close(&self) {
        self.client.store(None);
    }

    pub fn is_closed(&self) -> bool {
        self.client.load().is_none()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<reqwest::blocking::Response, TransportError> {
        let client = self.client.load_full().ok_or(TransportError::ClientClosed)?;
        let mut request = client.request(method, self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send()?)
    }
}
