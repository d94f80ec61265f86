use serde::Serialize;
use std::time::Duration;

/// Outcome of one logical request, stored at the request's input index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub duration: Duration,
    /// Retries are owned by the client inside `perform`; the batcher itself never retries.
    pub retries: u32,
}

impl<T> BatchResult<T> {
    pub fn ok(data: T, duration: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration,
            retries: 0,
        }
    }

    pub fn failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration,
            retries: 0,
        }
    }

    /// Convert into a plain `Result`, dropping timing information.
    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.data, self.error) {
            (Some(data), _) if self.success => Ok(data),
            (_, Some(err)) => Err(err),
            _ => Err("missing batch data".to_string()),
        }
    }
}

/// Cumulative counters since construction or the last `reset_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_duration: Duration,
    pub avg_request_time: Duration,
    pub requests_per_second: f64,
}

impl BatchStats {
    pub(crate) fn record<T>(&mut self, results: &[BatchResult<T>], elapsed: Duration) {
        let succeeded = results.iter().filter(|r| r.success).count() as u64;
        self.total_requests += results.len() as u64;
        self.successful_requests += succeeded;
        self.failed_requests += results.len() as u64 - succeeded;
        self.total_duration += elapsed;

        if self.total_requests > 0 {
            self.avg_request_time = self.total_duration.div_f64(self.total_requests as f64);
        }
        let secs = self.total_duration.as_secs_f64();
        self.requests_per_second = if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        };
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}
