//! Benchmarks for the token bucket hot path
//!
//! This benchmark measures:
//! - Non-blocking `try_acquire` against a full and an empty bucket
//! - Contended `try_acquire` from several threads
//! - `snapshot` cost (used by client signals)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resilient_http::resilience::{TokenBucket, TokenBucketConfig};
use std::sync::Arc;

fn bench_try_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket");

    let full = TokenBucket::new(
        TokenBucketConfig::new()
            .with_capacity(u32::MAX)
            .with_refill_rate(1e12),
    );
    group.bench_function("try_acquire_available", |b| {
        b.iter(|| black_box(full.try_acquire(black_box(1))))
    });

    let empty = TokenBucket::new(
        TokenBucketConfig::new()
            .with_capacity(1)
            .with_refill_rate(1e-9),
    );
    empty.try_acquire(1);
    group.bench_function("try_acquire_exhausted", |b| {
        b.iter(|| black_box(empty.try_acquire(black_box(1))))
    });

    group.bench_function("snapshot", |b| b.iter(|| black_box(full.snapshot())));
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket_contended");
    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &n| {
            let bucket = Arc::new(TokenBucket::new(
                TokenBucketConfig::new()
                    .with_capacity(u32::MAX)
                    .with_refill_rate(1e12),
            ));
            b.iter(|| {
                std::thread::scope(|s| {
                    for _ in 0..n {
                        let bucket = bucket.clone();
                        s.spawn(move || {
                            for _ in 0..100 {
                                black_box(bucket.try_acquire(1));
                            }
                        });
                    }
                });
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_try_acquire, bench_contended);
criterion_main!(benches);
