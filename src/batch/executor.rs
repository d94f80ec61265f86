//! Batch executor.

use super::{BatchResult, BatchStats, BatchStrategy, BatcherConfig, Params};
use futures::FutureExt;
use rayon::prelude::*;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub struct RequestBatcher {
    config: BatcherConfig,
    stats: Mutex<BatchStats>,
}

impl RequestBatcher {
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(BatchStats::default()),
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    fn lock_stats(&self) -> MutexGuard<'_, BatchStats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get_stats(&self) -> BatchStats {
        self.lock_stats().clone()
    }

    pub fn reset_stats(&self) {
        *self.lock_stats() = BatchStats::default();
    }

    /// Run `perform` once per request, `fixed` merged over each parameter map.
    ///
    /// Returns exactly one result per request, in input order, whatever the strategy.
    pub fn batch_requests<T, E, F>(
        &self,
        requests: &[Params],
        fixed: &Params,
        perform: F,
    ) -> Vec<BatchResult<T>>
    where
        F: Fn(Params) -> std::result::Result<T, E> + Sync,
        T: Send,
        E: Display,
    {
        if requests.is_empty() {
            return Vec::new();
        }
        let start = Instant::now();
        let chunks: Vec<&[Params]> = requests
            .chunks(self.config.max_batch_size.max(1))
            .collect();

        info!(
            strategy = %self.config.strategy,
            requests = requests.len(),
            batches = chunks.len(),
            max_batch_size = self.config.max_batch_size,
            "batch_start"
        );

        let results = match self.config.strategy {
            BatchStrategy::Sequential => self.run_sequential(&chunks, fixed, &perform),
            BatchStrategy::Parallel => self.run_parallel(&chunks, fixed, &perform),
            BatchStrategy::Adaptive => {
                if chunks.len() <= self.config.max_concurrent_batches {
                    self.run_parallel(&chunks, fixed, &perform)
                } else {
                    self.run_adaptive(&chunks, fixed, &perform)
                }
            }
        };

        self.finish(&results, start.elapsed());
        results
    }

    /// Async variant: one future per request, at most `max_concurrency` in flight.
    ///
    /// `max_concurrency` defaults to `max_concurrent_batches * max_batch_size`.
    pub async fn abatch_requests<T, E, F, Fut>(
        &self,
        requests: &[Params],
        fixed: &Params,
        max_concurrency: Option<usize>,
        perform: F,
    ) -> Vec<BatchResult<T>>
    where
        F: Fn(Params) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        if requests.is_empty() {
            return Vec::new();
        }
        let start = Instant::now();
        let limit = max_concurrency
            .filter(|n| *n > 0)
            .unwrap_or_else(|| self.config.async_concurrency());
        let semaphore = Semaphore::new(limit);

        info!(
            requests = requests.len(),
            max_concurrency = limit,
            "async batch_start"
        );

        let perform = &perform;
        let semaphore = &semaphore;
        let tasks = requests.iter().map(|params| {
            let merged = merge_params(params, fixed);
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return BatchResult::failed(e.to_string(), Duration::ZERO),
                };
                let started = Instant::now();
                let outcome = AssertUnwindSafe(async move { perform(merged).await })
                    .catch_unwind()
                    .await;
                into_batch_result(outcome, started.elapsed())
            }
        });
        let results = futures::future::join_all(tasks).await;

        self.finish(&results, start.elapsed());
        results
    }

    fn finish<T>(&self, results: &[BatchResult<T>], elapsed: Duration) {
        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            requests = results.len(),
            duration_ms = elapsed.as_millis() as u64,
            success = succeeded,
            failed = results.len() - succeeded,
            "batch_complete"
        );
        self.lock_stats().record(results, elapsed);
    }

    fn run_chunk<T, E, F>(
        &self,
        chunk: &[Params],
        fixed: &Params,
        perform: &F,
    ) -> Vec<BatchResult<T>>
    where
        F: Fn(Params) -> std::result::Result<T, E>,
        E: Display,
    {
        chunk
            .iter()
            .map(|params| {
                let merged = merge_params(params, fixed);
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| perform(merged)));
                into_batch_result(outcome, started.elapsed())
            })
            .collect()
    }

    fn run_sequential<T, E, F>(
        &self,
        chunks: &[&[Params]],
        fixed: &Params,
        perform: &F,
    ) -> Vec<BatchResult<T>>
    where
        F: Fn(Params) -> std::result::Result<T, E>,
        E: Display,
    {
        chunks
            .iter()
            .flat_map(|chunk| self.run_chunk(chunk, fixed, perform))
            .collect()
    }

    fn run_parallel<T, E, F>(
        &self,
        chunks: &[&[Params]],
        fixed: &Params,
        perform: &F,
    ) -> Vec<BatchResult<T>>
    where
        F: Fn(Params) -> std::result::Result<T, E> + Sync,
        T: Send,
        E: Display,
    {
        let workers = self.config.max_concurrent_batches.max(1);
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("batch-worker-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "worker pool unavailable, running batch sequentially");
                return self.run_sequential(chunks, fixed, perform);
            }
        };

        // Indexed collect keeps chunk order regardless of completion order.
        let per_chunk: Vec<Vec<BatchResult<T>>> = pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| self.run_chunk(chunk, fixed, perform))
                .collect()
        });
        per_chunk.into_iter().flatten().collect()
    }

    /// Sequential with a cooperative pause when recent chunks are slow.
    fn run_adaptive<T, E, F>(
        &self,
        chunks: &[&[Params]],
        fixed: &Params,
        perform: &F,
    ) -> Vec<BatchResult<T>>
    where
        F: Fn(Params) -> std::result::Result<T, E>,
        E: Display,
    {
        let window = self.config.adaptive_window.max(1);
        let mut recent: VecDeque<Duration> = VecDeque::with_capacity(window);
        let mut results = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let started = Instant::now();
            results.extend(self.run_chunk(chunk, fixed, perform));

            if recent.len() == window {
                recent.pop_front();
            }
            recent.push_back(started.elapsed());

            // Re-evaluated every `window` chunks.
            if i > 0 && i % window == 0 {
                let avg = recent.iter().sum::<Duration>() / recent.len() as u32;
                debug!(chunk = i, avg_ms = avg.as_millis() as u64, "adaptive check");
                if avg > self.config.slow_batch_threshold {
                    warn!(
                        avg_ms = avg.as_millis() as u64,
                        delay_ms = self.config.adaptive_delay.as_millis() as u64,
                        "slow batches, throttling"
                    );
                    std::thread::sleep(self.config.adaptive_delay);
                }
            }
        }
        results
    }
}

impl Default for RequestBatcher {
    fn default() -> Self {
        Self::new(BatcherConfig::default())
    }
}

impl std::fmt::Debug for RequestBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBatcher")
            .field("config", &self.config)
            .finish()
    }
}

/// Fixed parameters win over per-request ones.
fn merge_params(params: &Params, fixed: &Params) -> Params {
    let mut merged = params.clone();
    for (k, v) in fixed {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

fn into_batch_result<T, E: Display>(
    outcome: std::thread::Result<std::result::Result<T, E>>,
    duration: Duration,
) -> BatchResult<T> {
    match outcome {
        Ok(Ok(data)) => BatchResult::ok(data, duration),
        Ok(Err(e)) => BatchResult::failed(e.to_string(), duration),
        Err(payload) => {
            BatchResult::failed(format!("panicked: {}", panic_message(&*payload)), duration)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
