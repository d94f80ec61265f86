use super::response::{classify_json, retry_after};
use super::{ClientConfig, ClientSignals};
use crate::resilience::{CircuitBreaker, TokenBucket};
use crate::transport::{recover, BlockingTransport};
use crate::{Error, Result};
use reqwest::blocking::Response;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Blocking resilient client for one upstream host.
///
/// Every attempt passes through the circuit check, rate limiter and transport, under the
/// retry policy. Construction primes the session (best-effort).
pub struct HttpClient {
    config: ClientConfig,
    transport: BlockingTransport,
    circuit: Arc<CircuitBreaker>,
    bucket: TokenBucket,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self> {
        let circuit = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        Self::with_circuit_breaker(base_url, config, circuit)
    }

    /// Build a client around an externally owned circuit breaker.
    pub fn with_circuit_breaker(
        base_url: &str,
        config: ClientConfig,
        circuit: Arc<CircuitBreaker>,
    ) -> Result<Self> {
        config.validate()?;
        let bucket = TokenBucket::new(config.token_bucket()?);
        let transport = BlockingTransport::new(base_url, &config)?;
        let client = Self {
            config,
            transport,
            circuit,
            bucket,
        };
        client.prime_session();
        Ok(client)
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

    /// Close the underlying connection object. A later request rebuilds it.
    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Best-effort request that collects anti-bot cookies; never fails.
    fn prime_session(&self) {
        let Some(path) = self.config.prime_path.as_deref() else {
            return;
        };
        match self.transport.send(Method::GET, path, &[], None) {
            Ok(resp) => debug!(
                base_url = self.base_url(),
                http_status = resp.status().as_u16(),
                "session primed"
            ),
            Err(e) => debug!(base_url = self.base_url(), error = %e, "session priming failed"),
        }
    }

    /// One pass through circuit, rate limiter, transport and status handling.
    fn attempt(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        attempt: u32,
    ) -> Result<Response> {
        self.circuit.check()?;
        self.bucket.acquire(1)?;

        let request_id = Uuid::new_v4();
        let start = Instant::now();
        let resp = match self.transport.send(method.clone(), path, query, body) {
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
                    std::thread::sleep(delay);
                }
            }
            if status == 403 {
                warn!(base_url = self.base_url(), "forbidden, re-priming session");
                self.prime_session();
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

    /// Issue a request under the retry policy.
    ///
    /// Responses with a retryable status are re-attempted; once attempts are exhausted
    /// the last response is returned as-is. Other responses pass through untouched.
    pub fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let policy = &self.config.retry;
        policy.run(
            |attempt| self.attempt(&method, path, query, body, attempt),
            |resp: &Response| policy.is_retryable_status(resp.status().as_u16()),
        )
    }

    pub fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        self.request_with_retry(Method::GET, path, query, None)
    }

    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.request_with_retry(Method::POST, path, &[], Some(&body))
    }

    fn json_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let policy = &self.config.retry;
        policy.run(
            |attempt| {
                let resp = self.attempt(&method, path, query, body, attempt)?;
                let status = resp.status().as_u16();
                let headers = resp.headers().clone();
                let text = resp.text().map_err(|e| Error::Transport(e.into()))?;
                classify_json(status, &headers, policy.is_retryable_status(status), &text)?;
                Ok(serde_json::from_str(&text)?)
            },
            crate::resilience::retry::never,
        )
    }

    /// GET and decode a JSON body; non-JSON responses are retried, then surfaced.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.json_with_retry(Method::GET, path, query, None)
    }

    /// POST a JSON body and decode a JSON response.
    pub fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.json_with_retry(Method::POST, path, &[], Some(&body))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url())
            .field("closed", &self.is_closed())
            .finish()
    }
}
