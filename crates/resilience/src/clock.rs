//! Time abstraction for the limiter and breaker registries
//!
//! Every registry reads "now" through a [`Clock`] so the timing arithmetic
//! (refill, window expiry, open → half-open) can be driven deterministically
//! in tests:
//!
//! - [`SystemClock`]: real monotonic time, the default for production.
//! - [`MockClock`]: time only moves when the test calls `advance`.
//! - [`TokioClock`]: follows tokio's timer, so a runtime started with
//!   `start_paused = true` auto-advances the clock while `wait`/`execute`
//!   sleep.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use flowguard_resilience::clock::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(clock.now().duration_since(start), Duration::from_millis(250));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of monotonic time for the registries
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock driven by tokio's timer wheel
///
/// Identical to [`SystemClock`] on a normal runtime. Under a paused runtime
/// (`#[tokio::test(start_paused = true)]`) it advances exactly as far as the
/// sleeps performed by the code under test.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed counter, so a test can hand one clone to a
/// registry and keep another to advance time.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by milliseconds
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }
}

/// Whole milliseconds in `duration`, rounded up.
///
/// Used for every `retry_after` so that sleeping the reported value is always
/// long enough for the slot to free up.
#[must_use]
pub fn millis_ceil(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    let rounded = if duration.subsec_nanos() % 1_000_000 == 0 { millis } else { millis + 1 };
    u64::try_from(rounded).unwrap_or(u64::MAX)
}

/// Milliseconds elapsed from `earlier` to `now`, saturating at zero.
#[must_use]
pub fn elapsed_millis(now: Instant, earlier: Instant) -> u64 {
    u64::try_from(now.saturating_duration_since(earlier).as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_now() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();
        assert!(now2 >= now1, "System clock should advance");
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
    }

    #[test]
    fn test_mock_clock_set_elapsed() {
        let clock = MockClock::new();

        clock.set_elapsed(Duration::from_secs(10));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));

        clock.set_elapsed(Duration::from_secs(20));
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
    }

    #[test]
    fn test_mock_clock_clones_share_time() {
        let clock1 = MockClock::new();
        clock1.advance_millis(10_000);

        let clock2 = clock1.clone();
        clock2.advance_millis(5_000);

        assert_eq!(clock1.elapsed(), Duration::from_secs(15));
        assert_eq!(clock2.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_sleep() {
        let clock = TokioClock;
        let start = clock.now();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(clock.now().duration_since(start) >= Duration::from_millis(1500));
    }

    #[test]
    fn test_millis_ceil_rounds_up_partial_millis() {
        assert_eq!(millis_ceil(Duration::ZERO), 0);
        assert_eq!(millis_ceil(Duration::from_millis(1000)), 1000);
        assert_eq!(millis_ceil(Duration::from_micros(1)), 1);
        assert_eq!(millis_ceil(Duration::from_micros(999_001)), 1000);
    }

    #[test]
    fn test_elapsed_millis_saturates() {
        let clock = MockClock::new();
        let earlier = clock.now();
        clock.advance_millis(42);
        let later = clock.now();

        assert_eq!(elapsed_millis(later, earlier), 42);
        assert_eq!(elapsed_millis(earlier, later), 0);
    }
}
