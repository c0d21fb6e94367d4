//! Named circuit breakers
//!
//! A [`CircuitBreakerRegistry`] tracks caller-reported outcomes per name and
//! gates new attempts. The breaker never runs the operation itself: callers
//! ask [`allow`](CircuitBreakerRegistry::allow) before an attempt and report
//! the result with [`record`](CircuitBreakerRegistry::record) afterwards.
//!
//! Unconfigured names fail open: `allow` returns `true` for them.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//!
//! use flowguard_resilience::circuit_breaker::{BreakerConfig, CircuitBreakerRegistry, CircuitState};
//! use flowguard_resilience::clock::MockClock;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = MockClock::new();
//! let breakers = CircuitBreakerRegistry::with_clock(clock.clone());
//! breakers.create(
//!     "payments",
//!     BreakerConfig::builder().failure_threshold(2).reset_timeout(Duration::from_secs(30)).build()?,
//! )?;
//!
//! breakers.record("payments", false)?;
//! breakers.record("payments", false)?;
//! assert!(!breakers.allow("payments"));
//!
//! clock.advance(Duration::from_secs(30));
//! assert!(breakers.allow("payments"));
//! assert_eq!(breakers.state("payments")?.state, CircuitState::HalfOpen);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod config;
mod state;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

pub use self::config::{BreakerConfig, BreakerConfigBuilder};
pub use self::state::{maybe_transition_to_half_open, BreakerSnapshot, BreakerState, CircuitState};
use crate::clock::{Clock, SystemClock};
use crate::error::{ResilienceError, ResilienceResult};
use crate::retry::is_retryable;

/// Registry of named circuit breakers
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    breakers: DashMap<String, BreakerState>,
    clock: Arc<C>,
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Create an empty registry on the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for CircuitBreakerRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Create an empty registry with a custom clock (for testing)
    pub fn with_clock(clock: C) -> Self {
        Self::with_shared_clock(Arc::new(clock))
    }

    pub fn with_shared_clock(clock: Arc<C>) -> Self {
        Self { breakers: DashMap::new(), clock }
    }

    /// Register `name` in the `Closed` state, replacing any existing breaker
    pub fn create(
        &self,
        name: impl Into<String>,
        config: BreakerConfig,
    ) -> ResilienceResult<BreakerConfig> {
        config.validate()?;
        let name = name.into();
        self.breakers.insert(name.clone(), BreakerState::new(config));
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = u64::try_from(config.reset_timeout.as_millis()).unwrap_or(u64::MAX),
            "Circuit breaker created"
        );
        Ok(config)
    }

    /// Register `name` with a failure threshold and reset timeout, other
    /// settings at their defaults
    pub fn create_with(
        &self,
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
    ) -> ResilienceResult<BreakerConfig> {
        self.create(
            name,
            BreakerConfig { failure_threshold, reset_timeout, ..BreakerConfig::default() },
        )
    }

    /// May an attempt go ahead under `name`?
    ///
    /// `true` for unknown names. An open breaker whose reset timeout has
    /// elapsed moves to `HalfOpen` here, and this call's attempt is the probe.
    pub fn allow(&self, name: &str) -> bool {
        let Some(mut breaker) = self.breakers.get_mut(name) else {
            return true;
        };
        let now = self.clock.now();
        if maybe_transition_to_half_open(&mut breaker, now) {
            info!(breaker = %name, "Circuit breaker half-open, allowing probe");
        }
        let allowed = breaker.allow(now);
        if !allowed {
            debug!(breaker = %name, "Circuit breaker rejecting call");
        }
        allowed
    }

    /// Report the outcome of an attempt
    pub fn record(&self, name: &str, success: bool) -> ResilienceResult<BreakerSnapshot> {
        let mut breaker =
            self.breakers.get_mut(name).ok_or_else(|| ResilienceError::breaker_not_found(name))?;
        let now = self.clock.now();
        match breaker.record(success, now) {
            Some(CircuitState::Open) => warn!(
                breaker = %name,
                failures = breaker.failure_count(),
                "Circuit breaker opened"
            ),
            Some(CircuitState::HalfOpen) => {
                info!(breaker = %name, "Circuit breaker half-open");
            }
            Some(CircuitState::Closed) => info!(breaker = %name, "Circuit breaker closed"),
            None => {}
        }
        Ok(breaker.snapshot(now))
    }

    /// Report an HTTP response: retryable statuses count as failures
    pub fn record_status(&self, name: &str, status: u16) -> ResilienceResult<BreakerSnapshot> {
        self.record(name, !is_retryable(status))
    }

    /// Current snapshot, after applying any due `Open → HalfOpen` transition
    pub fn state(&self, name: &str) -> ResilienceResult<BreakerSnapshot> {
        let mut breaker =
            self.breakers.get_mut(name).ok_or_else(|| ResilienceError::breaker_not_found(name))?;
        let now = self.clock.now();
        if maybe_transition_to_half_open(&mut breaker, now) {
            info!(breaker = %name, "Circuit breaker half-open");
        }
        Ok(breaker.snapshot(now))
    }

    /// Force `name` back to `Closed`; returns whether it existed
    pub fn reset(&self, name: &str) -> bool {
        let Some(mut breaker) = self.breakers.get_mut(name) else {
            return false;
        };
        breaker.reset();
        info!(breaker = %name, "Circuit breaker manually reset to closed state");
        true
    }

    pub fn config(&self, name: &str) -> ResilienceResult<BreakerConfig> {
        self.breakers
            .get(name)
            .map(|breaker| *breaker.config())
            .ok_or_else(|| ResilienceError::breaker_not_found(name))
    }

    /// Remove `name`; returns whether it existed
    pub fn destroy(&self, name: &str) -> bool {
        let existed = self.breakers.remove(name).is_some();
        if existed {
            info!(breaker = %name, "Circuit breaker destroyed");
        }
        existed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.breakers.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl<C: Clock> std::fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}
