use super::response::{classify_json, retry_after};
use super::{ClientConfig, ClientSignals};
use crate::resilience::{CircuitBreaker, TokenBucket};
use crate::transport::{recover, HttpTransport};
use crate::{Error, Result};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Async resilient client for one upstream host.
///
/// Same pipeline as [`HttpClient`](super::HttpClient), but rate-limiter waits, backoff
/// and `Retry-After` pauses suspend the task instead of blocking the thread. Priming
/// runs lazily on the first request; concurrent first callers share a single prime.
pub struct AsyncHttpClient {
    config: ClientConfig,
    transport: HttpTransport,
    circuit: Arc<CircuitBreaker>,
    bucket: TokenBucket,
    primed: Mutex<bool>,
}

impl AsyncHttpClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::async_defaults())
    }

    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self> {
        let circuit = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        Self::with_circuit_breaker(base_url, config, circuit)
    }

    pub fn with_circuit_breaker(
        base_url: &str,
        config: ClientConfig,
        circuit: Arc<CircuitBreaker>,
    ) -> Result<Self> {
        config.validate()?;
        let bucket = TokenBucket::new(config.token_bucket()?);
        let transport = HttpTransport::new(base_url, &config)?;
        let primed = Mutex::new(config.prime_path.is_none());
        Ok(Self {
            config,
            transport,
            circuit,
            bucket,
            primed,
        })
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn signals(&self) -> ClientSignals {
        ClientSignals {
            base_url: self.base_url().to_string(),
            circuit_breaker: self.circuit.snapshot(),
            rate_limiter: self.bucket.snapshot(),
            closed: self.transport.is_closed(),
        }
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Prime once; callers arriving while a prime is running wait for it.
    async fn ensure_primed(&self) {
        let mut primed = self.primed.lock().await;
        if *primed {
            return;
        }
        self.prime_locked().await;
        *primed = true;
    }

    /// Force a new prime, e.g. after the upstream answered 403.
    async fn reprime(&self) {
        if self.config.prime_path.is_none() {
            return;
        }
        let mut primed = self.primed.lock().await;
        self.prime_locked().await;
        *primed = true;
    }

    async fn prime_locked(&self) {
        let Some(path) = self.config.prime_path.as_deref() else {
            return;
        };
        match self.transport.send(Method::GET, path, &[], None).await {
            Ok(resp) => debug!(
                base_url = self.base_url(),
                http_status = resp.status().as_u16(),
                "session primed"
            ),
            Err(e) => debug!(base_url = self.base_url(), error = %e, "session priming failed"),
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        attempt: u32,
    ) -> Result<Response> {
        self.circuit.check()?;
        self.bucket.acquire_async(1).await?;
        self.ensure_primed().await;

        let request_id = Uuid::new_v4();
        let start = Instant::now();
        let resp = match self.transport.send(method.clone(), path, query, body).await {
            Ok(resp) => resp,
            Err(e) => {
                self.circuit.record_failure();
                warn!(
                    method = %method,
                    url = %self.transport.url(path),
                    request_id = %request_id,
                    attempt = attempt + 1,
                    error = %e,
                    "request failed"
                );
                let e = recover(e, self.base_url(), || self.transport.rebuild());
                return Err(e.into());
            }
        };

        let status = resp.status().as_u16();
        if self.config.retry.is_retryable_status(status) {
            if status == 429 {
                if let Some(delay) = retry_after(resp.headers(), self.config.max_retry_after) {
                    debug!(delay_ms = delay.as_millis() as u64, "honouring Retry-After");
                    tokio::time::sleep(delay).await;
                }
            }
            if status == 403 {
                warn!(base_url = self.base_url(), "forbidden, re-priming session");
                self.reprime().await;
            }
        } else {
            self.circuit.record_success();
        }

        info!(
            method = %method,
            url = resp.url().as_str(),
            http_status = status,
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = %request_id,
            attempt = attempt + 1,
            "request completed"
        );
        Ok(resp)
    }

    /// Issue a request under the retry policy; see
    /// [`HttpClient::request_with_retry`](super::HttpClient::request_with_retry).
    pub async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let policy = &self.config.retry;
        policy
            .run_async(
                |attempt| self.attempt(&method, path, query, body, attempt),
                |resp: &Response| policy.is_retryable_status(resp.status().as_u16()),
            )
            .await
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        self.request_with_retry(Method::GET, path, query, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.request_with_retry(Method::POST, path, &[], Some(&body))
            .await
    }

    async fn json_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        attempt: u32,
    ) -> Result<T> {
        let resp = self.attempt(method, path, query, body, attempt).await?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let text = resp.text().await.map_err(|e| Error::Transport(e.into()))?;
        classify_json(
            status,
            &headers,
            self.config.retry.is_retryable_status(status),
            &text,
        )?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let method = Method::GET;
        self.config
            .retry
            .run_async(
                |attempt| self.json_once(&method, path, query, None, attempt),
                crate::resilience::retry::never,
            )
            .await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let method = Method::POST;
        self.config
            .retry
            .run_async(
                |attempt| self.json_once(&method, path, &[], Some(&body), attempt),
                crate::resilience::retry::never,
            )
            .await
    }
}

impl std::fmt::Debug for AsyncHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncHttpClient")
            .field("base_url", &self.base_url())
            .field("closed", &self.is_closed())
            .finish()
    }
}
