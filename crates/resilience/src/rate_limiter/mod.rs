//! Named rate limiters
//!
//! A [`RateLimiterRegistry`] maps caller-chosen names to limiter state. Three
//! algorithms are available:
//! - **Token bucket**: bursts up to `max_tokens`, refilled continuously at
//!   `refill_rate` tokens per second
//! - **Sliding window**: at most `max_requests` in any trailing window
//! - **Fixed window**: at most `max_requests` per window, counter reset
//!   wholesale when the window elapses
//!
//! Denials are ordinary values (`allowed: false`), never errors. Errors are
//! reserved for unknown names and bad configuration.
//!
//! # Examples
//!
//! ```rust
//! use flowguard_resilience::rate_limiter::{LimiterConfig, RateLimiterRegistry};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiters = RateLimiterRegistry::new();
//! limiters.create("api", LimiterConfig::token_bucket(2.0, 1.0))?;
//!
//! assert!(limiters.acquire("api")?.allowed);
//! assert!(limiters.acquire("api")?.allowed);
//!
//! let third = limiters.acquire("api")?;
//! assert!(!third.allowed);
//! assert_eq!(third.retry_after_ms(), Some(1000));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod algorithm;
mod config;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

pub use self::algorithm::{AcquireOutcome, Limiter, LimiterStatus};
pub use self::config::{
    Algorithm, LimiterConfig, LimiterParams, TokenBucketConfig, TokenBucketConfigBuilder,
    WindowConfig, WindowConfigBuilder,
};
use crate::clock::{millis_ceil, Clock, SystemClock};
use crate::error::{ResilienceError, ResilienceResult};
use crate::utils::duration_millis;

/// Tuning for [`RateLimiterRegistry::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Shortest sleep between two polls
    #[serde(rename = "min_poll_interval_ms", with = "duration_millis")]
    pub min_poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self { min_poll_interval: Duration::from_millis(10) }
    }
}

/// Registry of named rate limiters
///
/// Each entry sits behind its own shard lock, so a refresh/compare/consume
/// sequence is atomic with respect to concurrent callers on other threads.
/// No lock is held across an `.await`.
pub struct RateLimiterRegistry<C: Clock = SystemClock> {
    limiters: DashMap<String, Limiter>,
    clock: Arc<C>,
    wait_options: WaitOptions,
}

impl RateLimiterRegistry<SystemClock> {
    /// Create an empty registry on the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiterRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiterRegistry<C> {
    /// Create an empty registry with a custom clock (for testing)
    pub fn with_clock(clock: C) -> Self {
        Self::with_shared_clock(Arc::new(clock))
    }

    /// Create an empty registry reading time from an already shared clock
    pub fn with_shared_clock(clock: Arc<C>) -> Self {
        Self { limiters: DashMap::new(), clock, wait_options: WaitOptions::default() }
    }

    /// Replace the polling options used by [`wait`](Self::wait)
    #[must_use]
    pub fn with_wait_options(mut self, wait_options: WaitOptions) -> Self {
        self.wait_options = wait_options;
        self
    }

    pub fn wait_options(&self) -> WaitOptions {
        self.wait_options
    }

    /// Register `name`, replacing any limiter already registered under it
    pub fn create(
        &self,
        name: impl Into<String>,
        config: LimiterConfig,
    ) -> ResilienceResult<LimiterConfig> {
        config.validate()?;
        let name = name.into();
        let limiter = Limiter::new(config, self.clock.now());
        if self.limiters.insert(name.clone(), limiter).is_some() {
            info!(limiter = %name, algorithm = %config.algorithm(), "Rate limiter replaced");
        } else {
            info!(limiter = %name, algorithm = %config.algorithm(), "Rate limiter created");
        }
        Ok(config)
    }

    /// Register `name` from an algorithm name and loose parameters
    ///
    /// Fails with [`ResilienceError::UnsupportedAlgorithm`] unless `algorithm`
    /// is one of `token-bucket`, `sliding-window` or `fixed-window`.
    pub fn create_from_parts(
        &self,
        name: impl Into<String>,
        algorithm: &str,
        params: LimiterParams,
    ) -> ResilienceResult<LimiterConfig> {
        let algorithm: Algorithm = algorithm.parse()?;
        self.create(name, params.into_config(algorithm)?)
    }

    /// Try to take a single unit
    pub fn acquire(&self, name: &str) -> ResilienceResult<AcquireOutcome> {
        self.acquire_many(name, 1)
    }

    /// Try to take `count` units at once; all or nothing
    pub fn acquire_many(&self, name: &str, count: u32) -> ResilienceResult<AcquireOutcome> {
        let mut limiter =
            self.limiters.get_mut(name).ok_or_else(|| ResilienceError::limiter_not_found(name))?;
        let outcome = limiter.acquire(count, self.clock.now());
        if !outcome.allowed {
            debug!(
                limiter = %name,
                count,
                remaining = outcome.remaining,
                retry_after_ms = outcome.retry_after_ms(),
                "Rate limit denied"
            );
        }
        Ok(outcome)
    }

    /// Would a single unit be admitted right now? Never consumes capacity.
    pub fn check(&self, name: &str) -> ResilienceResult<AcquireOutcome> {
        let limiter =
            self.limiters.get(name).ok_or_else(|| ResilienceError::limiter_not_found(name))?;
        Ok(limiter.check(self.clock.now()))
    }

    /// Capacity currently available
    pub fn remaining(&self, name: &str) -> ResilienceResult<u64> {
        let mut limiter =
            self.limiters.get_mut(name).ok_or_else(|| ResilienceError::limiter_not_found(name))?;
        Ok(limiter.remaining(self.clock.now()))
    }

    /// Poll until a unit is admitted or `max_wait` is used up
    ///
    /// Sleeps for the reported `retry_after`, never less than
    /// [`WaitOptions::min_poll_interval`] and never more than what is left of
    /// the budget. The budget counts whichever is larger: time measured on the
    /// registry clock or total time slept.
    #[instrument(skip(self), fields(limiter = %name))]
    pub async fn wait(&self, name: &str, max_wait: Duration) -> ResilienceResult<AcquireOutcome> {
        let started = self.clock.now();
        let mut slept = Duration::ZERO;

        loop {
            let outcome = self.acquire(name)?;
            if outcome.allowed {
                return Ok(outcome);
            }

            let waited = self.clock.now().saturating_duration_since(started).max(slept);
            let budget_left = max_wait.saturating_sub(waited);
            if budget_left.is_zero() {
                warn!(waited_ms = millis_ceil(waited), "Timed out waiting for rate limiter");
                return Err(ResilienceError::RateLimitTimeout { name: name.to_string(), waited });
            }

            let pause = outcome
                .retry_after
                .unwrap_or_default()
                .max(self.wait_options.min_poll_interval)
                .min(budget_left);
            debug!(pause_ms = millis_ceil(pause), "Waiting for rate limiter capacity");
            tokio::time::sleep(pause).await;
            slept += pause;
        }
    }

    /// Restore full capacity, keeping the configuration
    pub fn reset(&self, name: &str) -> ResilienceResult<()> {
        let mut limiter =
            self.limiters.get_mut(name).ok_or_else(|| ResilienceError::limiter_not_found(name))?;
        limiter.reset(self.clock.now());
        info!(limiter = %name, "Rate limiter reset");
        Ok(())
    }

    pub fn status(&self, name: &str) -> ResilienceResult<LimiterStatus> {
        let limiter =
            self.limiters.get(name).ok_or_else(|| ResilienceError::limiter_not_found(name))?;
        Ok(limiter.status(self.clock.now()))
    }

    pub fn config(&self, name: &str) -> ResilienceResult<LimiterConfig> {
        self.limiters
            .get(name)
            .map(|limiter| limiter.config())
            .ok_or_else(|| ResilienceError::limiter_not_found(name))
    }

    /// Remove `name`; returns whether it existed
    pub fn destroy(&self, name: &str) -> bool {
        let existed = self.limiters.remove(name).is_some();
        if existed {
            info!(limiter = %name, "Rate limiter destroyed");
        }
        existed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.limiters.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.limiters.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

impl<C: Clock> std::fmt::Debug for RateLimiterRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterRegistry")
            .field("limiters", &self.limiters.len())
            .field("wait_options", &self.wait_options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{MockClock, TokioClock};

    fn registry() -> (RateLimiterRegistry<MockClock>, MockClock) {
        let clock = MockClock::new();
        (RateLimiterRegistry::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let (limiters, _) = registry();

        assert!(matches!(limiters.acquire("nope"), Err(ResilienceError::LimiterNotFound { .. })));
        assert!(limiters.check("nope").is_err());
        assert!(limiters.remaining("nope").is_err());
        assert!(limiters.reset("nope").is_err());
        assert!(limiters.status("nope").is_err());
        assert!(!limiters.destroy("nope"));
    }

    #[test]
    fn test_create_from_parts() {
        let (limiters, _) = registry();

        let config = limiters
            .create_from_parts("api", "sliding-window", LimiterParams::default().max_requests(3))
            .unwrap();
        assert_eq!(config, LimiterConfig::sliding_window(3, Duration::from_secs(60)));
        assert_eq!(limiters.remaining("api").unwrap(), 3);

        let err =
            limiters.create_from_parts("api", "leaky-bucket", LimiterParams::default()).unwrap_err();
        assert!(matches!(err, ResilienceError::UnsupportedAlgorithm { .. }));
        // the failed create leaves the existing limiter alone
        assert_eq!(limiters.config("api").unwrap(), config);
    }

    #[test]
    fn test_create_overwrites_state() {
        let (limiters, _) = registry();
        limiters.create("api", LimiterConfig::fixed_window(1, Duration::from_secs(1))).unwrap();
        assert!(limiters.acquire("api").unwrap().allowed);
        assert!(!limiters.acquire("api").unwrap().allowed);

        limiters.create("api", LimiterConfig::token_bucket(5.0, 1.0)).unwrap();
        assert_eq!(limiters.remaining("api").unwrap(), 5);
        assert_eq!(limiters.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (limiters, _) = registry();
        let err = limiters.create("api", LimiterConfig::token_bucket(0.0, 1.0)).unwrap_err();
        assert!(err.is_configuration());
        assert!(limiters.is_empty());
    }

    #[test]
    fn test_remaining_applies_refill() {
        let (limiters, clock) = registry();
        limiters.create("api", LimiterConfig::token_bucket(10.0, 2.0)).unwrap();
        assert!(limiters.acquire_many("api", 10).unwrap().allowed);
        assert_eq!(limiters.remaining("api").unwrap(), 0);

        clock.advance_millis(1500);
        assert_eq!(limiters.remaining("api").unwrap(), 3);
    }

    #[test]
    fn test_reset_and_destroy() {
        let (limiters, _) = registry();
        limiters.create("api", LimiterConfig::sliding_window(2, Duration::from_secs(1))).unwrap();
        limiters.acquire_many("api", 2).unwrap();
        assert_eq!(limiters.remaining("api").unwrap(), 0);

        limiters.reset("api").unwrap();
        assert_eq!(limiters.remaining("api").unwrap(), 2);

        assert!(limiters.destroy("api"));
        assert!(!limiters.destroy("api"));
        assert!(!limiters.contains("api"));
    }

    #[test]
    fn test_names_sorted() {
        let (limiters, _) = registry();
        for name in ["zeta", "alpha", "mid"] {
            limiters.create(name, LimiterConfig::token_bucket(1.0, 1.0)).unwrap();
        }
        assert_eq!(limiters.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_status_serializes_with_algorithm_tag() {
        let (limiters, clock) = registry();
        limiters.create("api", LimiterConfig::fixed_window(5, Duration::from_secs(1))).unwrap();
        limiters.acquire_many("api", 2).unwrap();
        clock.advance_millis(250);

        let status = serde_json::to_value(limiters.status("api").unwrap()).unwrap();
        assert_eq!(status["algorithm"], "fixed-window");
        assert_eq!(status["count"], 2);
        assert_eq!(status["window_age_ms"], 250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_until_refill() {
        let limiters = RateLimiterRegistry::with_clock(TokioClock);
        limiters.create("api", LimiterConfig::token_bucket(1.0, 1.0)).unwrap();
        assert!(limiters.acquire("api").unwrap().allowed);

        let start = tokio::time::Instant::now();
        let outcome = limiters.wait("api", Duration::from_secs(5)).await.unwrap();

        assert!(outcome.allowed);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_within_budget() {
        let limiters = RateLimiterRegistry::with_clock(TokioClock);
        limiters.create("api", LimiterConfig::token_bucket(1.0, 1.0)).unwrap();
        limiters.acquire("api").unwrap();

        let err = limiters.wait("api", Duration::from_millis(500)).await.unwrap_err();

        match err {
            ResilienceError::RateLimitTimeout { name, waited } => {
                assert_eq!(name, "api");
                assert!(waited >= Duration::from_millis(500));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_terminates_on_frozen_clock() {
        // MockClock never moves during the sleeps
        let (limiters, _clock) = registry();
        let limiters = limiters
            .with_wait_options(WaitOptions { min_poll_interval: Duration::from_millis(50) });
        limiters.create("api", LimiterConfig::fixed_window(1, Duration::from_secs(1))).unwrap();
        limiters.acquire("api").unwrap();

        let err = limiters.wait("api", Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ResilienceError::RateLimitTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_unknown_name_fails_fast() {
        let limiters = RateLimiterRegistry::with_clock(TokioClock);
        let err = limiters.wait("missing", Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
