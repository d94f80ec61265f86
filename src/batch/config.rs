use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStrategy {
    Sequential,
    Parallel,
    #[default]
    Adaptive,
}

impl BatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStrategy::Sequential => "sequential",
            BatchStrategy::Parallel => "parallel",
            BatchStrategy::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Requests per chunk; chunks are contiguous slices of the input.
    pub max_batch_size: usize,
    /// Worker threads for Parallel; async concurrency is this times `max_batch_size`.
    pub max_concurrent_batches: usize,
    pub strategy: BatchStrategy,
    /// Number of recent chunk durations averaged by the adaptive throttle.
    pub adaptive_window: usize,
    /// Average chunk duration above which the adaptive throttle engages.
    #[serde(with = "crate::config::duration_secs", rename = "slow_batch_threshold_secs")]
    pub slow_batch_threshold: Duration,
    #[serde(with = "crate::config::duration_secs", rename = "adaptive_delay_secs")]
    pub adaptive_delay: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_concurrent_batches: 3,
            strategy: BatchStrategy::Adaptive,
            adaptive_window: 5,
            slow_batch_threshold: Duration::from_secs(10),
            adaptive_delay: Duration::from_millis(100),
        }
    }
}

impl BatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn with_max_concurrent_batches(mut self, n: usize) -> Self {
        self.max_concurrent_batches = n;
        self
    }

    pub fn with_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_adaptive_throttle(
        mut self,
        window: usize,
        threshold: Duration,
        delay: Duration,
    ) -> Self {
        self.adaptive_window = window;
        self.slow_batch_threshold = threshold;
        self.adaptive_delay = delay;
        self
    }

    /// Default in-flight limit for async batches.
    pub fn async_concurrency(&self) -> usize {
        self.max_concurrent_batches
            .saturating_mul(self.max_batch_size)
            .max(1)
    }

    pub fn validate(&self) -> Result<()> {
        for (value, field) in [
            (self.max_batch_size, "batch.max_batch_size"),
            (self.max_concurrent_batches, "batch.max_concurrent_batches"),
            (self.adaptive_window, "batch.adaptive_window"),
        ] {
            if value == 0 {
                return Err(Error::configuration_with_context(
                    format!("{} must be at least 1", field),
                    ErrorContext::new()
                        .with_field_path(field)
                        .with_source("request_batcher"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batcher_config_defaults() {
        let cfg = BatcherConfig::default();
        assert_eq!(cfg.max_batch_size, 10);
        assert_eq!(cfg.max_concurrent_batches, 3);
        assert_eq!(cfg.strategy, BatchStrategy::Adaptive);
        assert_eq!(cfg.async_concurrency(), 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_batcher_config_rejects_zero_sizes() {
        let err = BatcherConfig::new()
            .with_max_batch_size(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("batch.max_batch_size"));
        assert!(BatcherConfig::new()
            .with_max_concurrent_batches(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_strategy_serde_names() {
        let s: BatchStrategy = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(s, BatchStrategy::Sequential);
        assert_eq!(
            serde_json::to_string(&BatchStrategy::Adaptive).unwrap(),
            "\"adaptive\""
        );
        assert_eq!(BatchStrategy::Parallel.to_string(), "parallel");
    }
}
