//! One limiter registry and one breaker registry on a shared clock
//!
//! [`Registry`] is the caller-owned home for both kinds of named state. Its
//! [`call`](Registry::call) helper runs the usual guarded sequence for one
//! name:
//!
//! 1. `breakers.allow(name)`, rejecting with [`GuardError::CircuitOpen`]
//! 2. `limiters.acquire(name)`, rejecting with [`GuardError::RateLimited`]
//! 3. the operation under [`retry::execute`](crate::retry::execute)
//! 4. `breakers.record(name, success)`
//!
//! Names without a limiter or breaker skip the matching step. The subsystems
//! themselves stay unaware of each other.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::clock::{Clock, SystemClock};
use crate::error::ResilienceError;
use crate::rate_limiter::{RateLimiterRegistry, WaitOptions};
use crate::retry::{self, RetryOptions};

/// Failure of a guarded [`Registry::call`]
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The breaker for this name is open
    #[error("Circuit breaker '{name}' is open, rejecting calls")]
    CircuitOpen { name: String },

    /// The limiter for this name has no capacity left
    #[error("Rate limit exceeded for '{name}', retry after {retry_after:?}")]
    RateLimited { name: String, retry_after: Duration },

    /// The operation itself failed, after any retries
    #[error("Operation failed: {0}")]
    Operation(E),

    /// Registry or configuration problem
    #[error(transparent)]
    Registry(#[from] ResilienceError),
}

impl<E> GuardError<E> {
    /// Was the call turned away before the operation ran?
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::RateLimited { .. })
    }

    /// The operation's error, if that is what failed
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }
}

/// Caller-owned bundle of named limiters and breakers
pub struct Registry<C: Clock = SystemClock> {
    limiters: RateLimiterRegistry<C>,
    breakers: CircuitBreakerRegistry<C>,
}

impl Registry<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Registry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Registry<C> {
    /// Both registries read time from `clock`
    pub fn with_clock(clock: C) -> Self {
        let clock = Arc::new(clock);
        Self {
            limiters: RateLimiterRegistry::with_shared_clock(Arc::clone(&clock)),
            breakers: CircuitBreakerRegistry::with_shared_clock(clock),
        }
    }

    /// Replace the polling options of the limiter registry
    #[must_use]
    pub fn with_wait_options(self, wait_options: WaitOptions) -> Self {
        Self { limiters: self.limiters.with_wait_options(wait_options), breakers: self.breakers }
    }

    pub const fn limiters(&self) -> &RateLimiterRegistry<C> {
        &self.limiters
    }

    pub const fn breakers(&self) -> &CircuitBreakerRegistry<C> {
        &self.breakers
    }

    /// Drop the limiter and the breaker registered under `name`
    ///
    /// Returns whether either existed.
    pub fn destroy(&self, name: &str) -> bool {
        let limiter = self.limiters.destroy(name);
        let breaker = self.breakers.destroy(name);
        limiter || breaker
    }

    /// Run `operation` behind the breaker and limiter registered as `name`
    pub async fn call<F, Fut, T, E>(
        &self,
        name: &str,
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, GuardError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if !self.breakers.allow(name) {
            return Err(GuardError::CircuitOpen { name: name.to_string() });
        }

        match self.limiters.acquire(name) {
            Ok(outcome) if !outcome.allowed => {
                return Err(GuardError::RateLimited {
                    name: name.to_string(),
                    retry_after: outcome.retry_after.unwrap_or_default(),
                });
            }
            Ok(_) | Err(ResilienceError::LimiterNotFound { .. }) => {}
            Err(other) => return Err(other.into()),
        }

        let result = retry::execute(operation, options).await;

        match self.breakers.record(name, result.is_ok()) {
            Ok(_) | Err(ResilienceError::BreakerNotFound { .. }) => {}
            Err(other) => {
                debug!(breaker = %name, error = %other, "Could not record outcome");
            }
        }

        result.map_err(GuardError::Operation)
    }
}

impl<C: Clock> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("limiters", &self.limiters)
            .field("breakers", &self.breakers)
            .finish()
    }
}
