//! Retry with exponential backoff
//!
//! - **[`backoff`]**: the delay formula, a schedule preview and HTTP status
//!   classification
//! - **[`executor`]**: [`RetryExecutor`] and the free [`execute`] function,
//!   which run an async operation up to `max_attempts` times and hand back the
//!   operation's own error when they give up
//!
//! The executor is stateless. It never consults a breaker or limiter; callers
//! that want both use [`Registry::call`](crate::registry::Registry::call) or
//! compose the pieces themselves.

pub mod backoff;
pub mod executor;

pub use self::backoff::{
    attempts, calculate_delay, is_retryable, PlannedAttempt, RETRYABLE_STATUS_CODES,
};
pub use self::executor::{execute, RetryExecutor, RetryOptions, RetryOptionsBuilder, RetryOutcome};
