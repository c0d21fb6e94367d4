//! Bounded retries with exponential backoff

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::backoff::calculate_delay;
use crate::clock::millis_ceil;
use crate::error::{ResilienceError, ResilienceResult};
use crate::utils::duration_millis;

/// Retry behaviour for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// When non-empty, only errors whose message contains one of these are
    /// retried
    pub retry_on_substrings: BTreeSet<String>,
    /// Scale each delay by a random factor in `[0.5, 1.0)`
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            retry_on_substrings: BTreeSet::new(),
            jitter: true,
        }
    }
}

impl RetryOptions {
    /// Create an options builder
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::new()
    }

    /// Validate the options
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_attempts == 0 {
            return Err(ResilienceError::config("max_attempts must be greater than 0"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(ResilienceError::config("backoff_factor must be a positive number"));
        }
        if self.initial_delay > self.max_delay {
            return Err(ResilienceError::config("initial_delay must not exceed max_delay"));
        }
        Ok(())
    }

    /// Delay after the failed attempt with zero-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_delay(
            attempt,
            self.initial_delay,
            self.backoff_factor,
            self.max_delay,
            self.jitter,
        )
    }

    /// Does an error with this message qualify for another attempt?
    pub fn should_retry(&self, message: &str) -> bool {
        self.retry_on_substrings.is_empty()
            || self.retry_on_substrings.iter().any(|needle| message.contains(needle.as_str()))
    }
}

/// Builder for [`RetryOptions`] with fluent API
#[derive(Debug, Default)]
pub struct RetryOptionsBuilder {
    options: RetryOptions,
}

impl RetryOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.options.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.options.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.options.max_delay = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.options.backoff_factor = factor;
        self
    }

    /// Add a substring that marks an error as retryable
    pub fn retry_on(mut self, substring: impl Into<String>) -> Self {
        self.options.retry_on_substrings.insert(substring.into());
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.options.jitter = jitter;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(false)
    }

    pub fn build(self) -> ResilienceResult<RetryOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Outcome of a retry execution including result and summary statistics
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The last attempt's result, error returned as the operation produced it
    pub result: Result<T, E>,
    /// Number of times the operation ran
    pub attempts: u32,
    /// Sum of the backoff sleeps
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }

    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Average sleep between attempts
    pub fn average_delay(&self) -> Duration {
        if self.attempts <= 1 {
            return Duration::ZERO;
        }
        self.total_delay / (self.attempts - 1)
    }
}

/// Runs fallible async operations under a fixed set of [`RetryOptions`]
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use flowguard_resilience::retry::{RetryExecutor, RetryOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = RetryOptions::builder()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(50))
///     .retry_on("timeout")
///     .build()?;
/// let executor = RetryExecutor::new(options)?;
///
/// let value: Result<u32, String> = executor.execute(|| async { Ok(7) }).await;
/// assert_eq!(value, Ok(7));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    options: RetryOptions,
}

impl RetryExecutor {
    /// Create an executor, validating `options`
    pub fn new(options: RetryOptions) -> ResilienceResult<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub const fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached
    ///
    /// The returned error is the operation's own, unchanged.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Like [`execute`](Self::execute), also reporting attempts and delays
    #[instrument(skip(self, operation), fields(max_attempts = self.options.max_attempts))]
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            let attempts = attempt + 1;
            debug!(attempt = attempts, max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts, total_delay };
                }
                Err(error) => error,
            };

            let message = error.to_string();
            if !self.options.should_retry(&message) {
                debug!(attempt = attempts, error = %message, "Error is not retryable");
                return RetryOutcome { result: Err(error), attempts, total_delay };
            }
            if attempts >= max_attempts {
                warn!(attempts, error = %message, "All retry attempts exhausted");
                return RetryOutcome { result: Err(error), attempts, total_delay };
            }

            let delay = self.options.delay_for(attempt);
            warn!(
                attempt = attempts,
                delay_ms = millis_ceil(delay),
                error = %message,
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            total_delay += delay;
            attempt += 1;
        }
    }
}

/// Run `operation` under `options` without building an executor
///
/// `options` are used as given; `max_attempts = 0` still runs once.
pub async fn execute<F, Fut, T, E>(operation: F, options: &RetryOptions) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    RetryExecutor { options: options.clone() }.execute(operation).await
}
