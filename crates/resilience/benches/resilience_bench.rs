//! Resilience benchmarks
//!
//! Hot paths of the limiter and breaker registries plus backoff math and the
//! retry executor.
//!
//! Run with: `cargo bench --bench resilience_bench -p flowguard-resilience`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowguard_resilience::{
    calculate_delay, CircuitBreakerRegistry, LimiterConfig, MockClock, RateLimiterRegistry,
    RetryExecutor, RetryOptions,
};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Rate Limiter Benchmarks
// ============================================================================

fn bench_limiter_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_acquire");
    let window = Duration::from_secs(1);
    let configs = [
        ("token_bucket", LimiterConfig::token_bucket(1_000.0, 1_000_000.0)),
        ("sliding_window", LimiterConfig::sliding_window(1_000, window)),
        ("fixed_window", LimiterConfig::fixed_window(1_000, window)),
    ];

    for (name, config) in configs {
        group.bench_with_input(BenchmarkId::new("acquire", name), &config, |b, config| {
            let clock = MockClock::new();
            let limiters = RateLimiterRegistry::with_clock(clock.clone());
            limiters.create("bench", *config).expect("valid limiter config for benchmarks");

            b.iter(|| {
                // keep windows rolling so the limiter never saturates
                clock.advance(Duration::from_millis(2));
                black_box(limiters.acquire("bench").expect("limiter registered"));
            });
        });

        group.bench_with_input(BenchmarkId::new("check", name), &config, |b, config| {
            let limiters = RateLimiterRegistry::with_clock(MockClock::new());
            limiters.create("bench", *config).expect("valid limiter config for benchmarks");

            b.iter(|| black_box(limiters.check("bench").expect("limiter registered")));
        });
    }

    group.finish();
}

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_breaker_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("breaker_paths");

    group.bench_function("allow_closed", |b| {
        let breakers = CircuitBreakerRegistry::with_clock(MockClock::new());
        breakers.create_with("bench", 5, Duration::from_secs(30)).expect("valid breaker");
        b.iter(|| black_box(breakers.allow("bench")));
    });

    group.bench_function("allow_open_short_circuit", |b| {
        let breakers = CircuitBreakerRegistry::with_clock(MockClock::new());
        breakers.create_with("bench", 1, Duration::from_secs(60)).expect("valid breaker");
        breakers.record("bench", false).expect("breaker registered");
        b.iter(|| black_box(breakers.allow("bench")));
    });

    group.bench_function("record_success", |b| {
        let breakers = CircuitBreakerRegistry::with_clock(MockClock::new());
        breakers.create_with("bench", 5, Duration::from_secs(30)).expect("valid breaker");
        b.iter(|| black_box(breakers.record("bench", true).expect("breaker registered")));
    });

    group.bench_function("trip_and_recover", |b| {
        let clock = MockClock::new();
        let breakers = CircuitBreakerRegistry::with_clock(clock.clone());
        breakers.create_with("bench", 3, Duration::from_millis(10)).expect("valid breaker");
        b.iter(|| {
            for _ in 0..3 {
                let _ = black_box(breakers.record("bench", false));
            }
            clock.advance(Duration::from_millis(10));
            black_box(breakers.allow("bench"));
            let _ = black_box(breakers.record("bench", true));
        });
    });

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff");
    let initial = Duration::from_millis(100);
    let cap = Duration::from_secs(30);

    for (name, jitter) in [("no_jitter", false), ("jitter", true)] {
        group.bench_with_input(BenchmarkId::new("calculate_delay", name), &jitter, |b, &jitter| {
            b.iter(|| {
                for attempt in 0..10 {
                    black_box(calculate_delay(attempt, initial, 2.0, cap, jitter));
                }
            });
        });
    }

    group.finish();
}

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn bench_retry_executor(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_executor");
    let runtime = build_runtime();
    let options = RetryOptions::builder()
        .max_attempts(4)
        .initial_delay(Duration::ZERO)
        .max_delay(Duration::ZERO)
        .no_jitter()
        .build()
        .expect("retry options should build for benchmarks");
    let executor = RetryExecutor::new(options).expect("valid retry options");
    let executor = &executor;

    group.bench_function("immediate_success", |b| {
        b.to_async(&runtime).iter(|| async move {
            let result: Result<u32, String> = executor.execute(|| async { Ok(1) }).await;
            black_box(result)
        });
    });

    group.bench_function("transient_failures_then_success", |b| {
        b.to_async(&runtime).iter(|| async move {
            let mut remaining_failures = 3u32;
            let result: Result<(), String> = executor
                .execute(move || {
                    let fail_now = remaining_failures > 0;
                    remaining_failures = remaining_failures.saturating_sub(1);
                    async move {
                        if fail_now {
                            Err("transient failure".to_string())
                        } else {
                            Ok(())
                        }
                    }
                })
                .await;
            if let Err(err) = result {
                panic!("retry transient failure path exhausted: {err}");
            }
        });
    });

    group.finish();
}

criterion_group!(
    resilience,
    bench_limiter_acquire,
    bench_breaker_paths,
    bench_backoff,
    bench_retry_executor
);
criterion_main!(resilience);
