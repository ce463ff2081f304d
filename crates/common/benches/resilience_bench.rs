//! Resilience benchmarks
//!
//! Run with: `cargo bench --bench resilience_bench -p partsource-common
//! --features runtime`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use partsource_common::resilience::{
    policies, BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, Jitter, MockClock,
    RetryConfig, RetryExecutor, TokenBucket, TokenBucketConfig,
};
use tokio::runtime::Builder as RuntimeBuilder;

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("can_execute_closed", |b| {
        let breaker = CircuitBreaker::with_clock(CircuitBreakerConfig::default(), MockClock::new())
            .expect("breaker");
        b.iter(|| black_box(breaker.can_execute()));
    });

    group.bench_function("record_failure_to_open", |b| {
        b.iter(|| {
            let breaker =
                CircuitBreaker::with_clock(CircuitBreakerConfig::default(), MockClock::new())
                    .expect("breaker");
            for _ in 0..5 {
                black_box(breaker.record_failure());
            }
        });
    });

    group.finish();
}

fn bench_token_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket");

    for capacity in [10_u64, 1_000] {
        group.bench_with_input(BenchmarkId::new("try_acquire", capacity), &capacity, |b, &cap| {
            let clock = MockClock::new();
            let bucket = TokenBucket::with_clock(
                TokenBucketConfig::per_window(cap, Duration::from_secs(60)),
                clock.clone(),
            )
            .expect("bucket");
            b.iter(|| {
                if !bucket.try_acquire(1) {
                    clock.advance_secs(60);
                }
            });
        });
    }

    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let backoff = BackoffStrategy::Exponential {
        initial_delay: Duration::from_millis(100),
        multiplier: 2.0,
        max_delay: Duration::from_secs(30),
    };
    c.bench_function("backoff_exponential_with_jitter", |b| {
        b.iter(|| {
            for retry in 0..8 {
                black_box(Jitter::Equal.apply(backoff.delay_for(retry)));
            }
        });
    });
}

fn bench_retry_executor(c: &mut Criterion) {
    let runtime = RuntimeBuilder::new_current_thread().enable_time().build().expect("runtime");
    let executor = RetryExecutor::new(
        RetryConfig::builder().max_attempts(3).fixed_backoff(Duration::ZERO).build(),
        policies::AlwaysRetry,
    );

    c.bench_function("retry_execute_first_try", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let result: Result<u32, _> =
                    executor.execute(|attempt| async move { Ok::<_, ()>(attempt) }).await;
                black_box(result.is_ok())
            })
        });
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker,
    bench_token_bucket,
    bench_backoff,
    bench_retry_executor
);
criterion_main!(benches);
