//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use flowguard_resilience::RetryOptions;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route crate logs through the test writer; `RUST_LOG` picks the level
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Deterministic retry options with a 1s base delay
pub fn retry_options(max_attempts: u32) -> RetryOptions {
    RetryOptions::builder()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(30))
        .no_jitter()
        .build()
        .expect("valid retry options")
}
