//! In-process flow control for callers of remote services.
//!
//! Three independent subsystems, each keyed by a caller-chosen name:
//! - **Rate limiting** ([`rate_limiter`]): token bucket, sliding window and
//!   fixed window admission
//! - **Circuit breaking** ([`circuit_breaker`]): failure counting with a
//!   time-based half-open probe
//! - **Retry** ([`retry`]): bounded attempts with exponential backoff and
//!   jitter
//!
//! None of them calls another. The usual composition, which
//! [`Registry::call`] packages up, is: check the breaker, acquire from the
//! limiter, run the operation under the retry executor, report the outcome
//! to the breaker.
//!
//! # Feature Flags
//!
//! - `settings` (default): TOML-declared limiters and breakers
//!   ([`settings::ResilienceSettings`])
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//!
//! use flowguard_resilience::{LimiterConfig, Registry, RetryOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new();
//! registry.limiters().create("github", LimiterConfig::token_bucket(10.0, 2.0))?;
//! registry.breakers().create_with("github", 5, Duration::from_secs(60))?;
//!
//! let options = RetryOptions::builder().max_attempts(3).retry_on("timeout").build()?;
//! let body = registry
//!     .call("github", &options, || async { Ok::<_, String>("pong".to_string()) })
//!     .await?;
//! assert_eq!(body, "pong");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod rate_limiter;
pub mod registry;
pub mod retry;
#[cfg(feature = "settings")]
pub mod settings;
pub mod utils;

// Re-export commonly used types and traits for convenience
pub use circuit_breaker::{
    BreakerConfig, BreakerConfigBuilder, BreakerSnapshot, CircuitBreakerRegistry, CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock, TokioClock};
pub use error::{ErrorClassification, ErrorSeverity, ResilienceError, ResilienceResult};
pub use rate_limiter::{
    AcquireOutcome, Algorithm, LimiterConfig, LimiterParams, LimiterStatus, RateLimiterRegistry,
    TokenBucketConfig, WaitOptions, WindowConfig,
};
pub use registry::{GuardError, Registry};
pub use retry::{
    attempts, calculate_delay, execute, is_retryable, RetryExecutor, RetryOptions, RetryOutcome,
};
#[cfg(feature = "settings")]
pub use settings::ResilienceSettings;
