//! Breaker state machine
//!
//! ```text
//!            failures >= threshold
//!   Closed ───────────────────────► Open
//!     ▲                              │ reset_timeout since last failure
//!     │ half-open successes          ▼
//!     └────────────────────────── HalfOpen
//!                                    │ any failure
//!                                    └──────► Open
//! ```
//!
//! The failure count is cleared only on the way back to `Closed`, never on
//! entry to `HalfOpen`. A single failure during the half-open probe therefore
//! reopens the circuit at once.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::config::BreakerConfig;
use crate::clock::{elapsed_millis, millis_ceil};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, the next attempt is a recovery probe
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Mutable state of one named breaker
#[derive(Debug, Clone)]
pub struct BreakerState {
    config: BreakerConfig,
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_success_count: u32,
}

impl BreakerState {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_success_count: 0,
        }
    }

    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub const fn state(&self) -> CircuitState {
        self.state
    }

    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether an attempt may proceed; may move `Open` to `HalfOpen`
    pub fn allow(&mut self, now: Instant) -> bool {
        maybe_transition_to_half_open(self, now);
        self.state != CircuitState::Open
    }

    /// Apply an outcome reported by the caller
    ///
    /// Returns the new state when this call changed it, including a probe that
    /// went `Open → HalfOpen → Open` within the call.
    pub fn record(&mut self, success: bool, now: Instant) -> Option<CircuitState> {
        let before = self.state;
        let probed = maybe_transition_to_half_open(self, now);

        if success {
            match self.state {
                CircuitState::HalfOpen => {
                    self.half_open_success_count = self.half_open_success_count.saturating_add(1);
                    if self.half_open_success_count >= self.config.half_open_success_threshold {
                        self.state = CircuitState::Closed;
                        self.failure_count = 0;
                    }
                }
                CircuitState::Closed => self.failure_count = 0,
                // still within reset_timeout; a late success says nothing new
                CircuitState::Open => {}
            }
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
            self.last_failure = Some(now);
            if self.failure_count >= self.config.failure_threshold {
                self.state = CircuitState::Open;
            }
        }

        (probed || self.state != before).then_some(self.state)
    }

    /// Back to `Closed` with every counter cleared
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure = None;
        self.half_open_success_count = 0;
    }

    pub fn snapshot(&self, now: Instant) -> BreakerSnapshot {
        let retry_after_ms = match (self.state, self.last_failure) {
            (CircuitState::Open, Some(last_failure)) => Some(millis_ceil(
                last_failure
                    .checked_add(self.config.reset_timeout)
                    .map_or(Duration::MAX, |probe_at| probe_at.saturating_duration_since(now)),
            )),
            _ => None,
        };
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            failure_threshold: self.config.failure_threshold,
            half_open_success_count: self.half_open_success_count,
            half_open_success_threshold: self.config.half_open_success_threshold,
            last_failure_age_ms: self.last_failure.map(|t| elapsed_millis(now, t)),
            retry_after_ms,
        }
    }
}

/// Move an `Open` breaker to `HalfOpen` once `reset_timeout` has elapsed
/// since the last failure.
///
/// Every public breaker operation calls this first. Entering `HalfOpen` clears
/// the half-open success count and leaves `failure_count` untouched. Returns
/// whether the transition fired.
pub fn maybe_transition_to_half_open(breaker: &mut BreakerState, now: Instant) -> bool {
    if breaker.state != CircuitState::Open {
        return false;
    }
    let elapsed = match breaker.last_failure {
        Some(last_failure) => now.saturating_duration_since(last_failure),
        None => Duration::MAX,
    };
    if elapsed < breaker.config.reset_timeout {
        return false;
    }
    breaker.state = CircuitState::HalfOpen;
    breaker.half_open_success_count = 0;
    true
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub half_open_success_count: u32,
    pub half_open_success_threshold: u32,
    /// Time since the last recorded failure
    pub last_failure_age_ms: Option<u64>,
    /// While open, time left until a probe is let through
    pub retry_after_ms: Option<u64>,
}

impl BreakerSnapshot {
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};

    fn breaker(failure_threshold: u32, reset_ms: u64) -> BreakerState {
        BreakerState::new(BreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_millis(reset_ms),
            half_open_success_threshold: 1,
        })
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_opens_at_threshold() {
        let clock = MockClock::new();
        let mut cb = breaker(3, 1000);

        assert_eq!(cb.record(false, clock.now()), None);
        assert_eq!(cb.record(false, clock.now()), None);
        assert_eq!(cb.record(false, clock.now()), Some(CircuitState::Open));
        assert!(!cb.allow(clock.now()));
    }

    #[test]
    fn test_success_in_closed_clears_failures() {
        let clock = MockClock::new();
        let mut cb = breaker(2, 1000);

        cb.record(false, clock.now());
        cb.record(true, clock.now());
        assert_eq!(cb.failure_count(), 0);

        cb.record(false, clock.now());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_transition_is_exact_at_reset_timeout() {
        let clock = MockClock::new();
        let mut cb = breaker(1, 1000);
        cb.record(false, clock.now());

        clock.advance_millis(999);
        assert!(!maybe_transition_to_half_open(&mut cb, clock.now()));
        assert_eq!(cb.snapshot(clock.now()).retry_after_ms, Some(1));

        clock.advance_millis(1);
        assert!(maybe_transition_to_half_open(&mut cb, clock.now()));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!maybe_transition_to_half_open(&mut cb, clock.now()));
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let clock = MockClock::new();
        let mut cb = breaker(2, 1000);
        cb.record(false, clock.now());
        cb.record(false, clock.now());

        clock.advance_millis(1000);
        assert!(cb.allow(clock.now()));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.failure_count(), 2);

        assert_eq!(cb.record(false, clock.now()), Some(CircuitState::Open));
        assert_eq!(cb.failure_count(), 3);
    }

    #[test]
    fn test_half_open_successes_close() {
        let clock = MockClock::new();
        let mut cb = BreakerState::new(BreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(100),
            half_open_success_threshold: 2,
        });
        cb.record(false, clock.now());
        clock.advance_millis(100);

        // record applies the transition itself, no allow() needed
        assert_eq!(cb.record(true, clock.now()), Some(CircuitState::HalfOpen));
        assert_eq!(cb.record(true, clock.now()), Some(CircuitState::Closed));
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_failure_while_open_extends_timeout() {
        let clock = MockClock::new();
        let mut cb = breaker(1, 1000);
        cb.record(false, clock.now());

        clock.advance_millis(600);
        cb.record(false, clock.now());
        assert_eq!(cb.failure_count(), 2);

        clock.advance_millis(600);
        assert!(!cb.allow(clock.now()));
        assert_eq!(cb.snapshot(clock.now()).retry_after(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_success_while_open_is_ignored() {
        let clock = MockClock::new();
        let mut cb = breaker(1, 1000);
        cb.record(false, clock.now());

        assert_eq!(cb.record(true, clock.now()), None);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let clock = MockClock::new();
        let mut cb = breaker(1, 1000);
        cb.record(false, clock.now());

        cb.reset();
        let snapshot = cb.snapshot(clock.now());
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.last_failure_age_ms, None);
        assert_eq!(snapshot.retry_after(), None);
    }
}
