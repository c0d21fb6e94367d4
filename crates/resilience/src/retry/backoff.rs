//! Exponential backoff math and HTTP status classification

use std::time::Duration;

use rand::Rng;
use serde::Serialize;

/// HTTP statuses worth retrying: timeouts, throttling and transient 5xx
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Lower bound of the jitter multiplier; the upper bound (1.0) is exclusive
const JITTER_FLOOR: f64 = 0.5;

/// Delay before retry number `attempt + 1`
///
/// `min(initial_delay * backoff_factor^attempt, max_delay)`. With `jitter` the
/// capped value is scaled by a uniform factor in `[0.5, 1.0)`. The result is
/// rounded to the nearest millisecond.
pub fn calculate_delay(
    attempt: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    jitter: bool,
) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let max_ms = max_delay.as_secs_f64() * 1000.0;
    let mut delay_ms =
        (initial_delay.as_secs_f64() * 1000.0 * backoff_factor.powi(exponent)).min(max_ms);
    if jitter {
        delay_ms *= rand::thread_rng().gen_range(JITTER_FLOOR..1.0);
    }
    Duration::from_millis(round_millis(delay_ms))
}

/// One line of a planned retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedAttempt {
    /// Zero-based attempt index
    pub attempt: u32,
    /// Pause before this attempt
    #[serde(rename = "delay_ms", with = "crate::utils::duration_millis")]
    pub delay: Duration,
    /// Sum of all pauses up to and including this attempt
    #[serde(rename = "cumulative_wait_ms", with = "crate::utils::duration_millis")]
    pub cumulative_wait: Duration,
}

/// Preview the schedule of `max_attempts` attempts, without cap or jitter
///
/// Attempt 0 runs immediately; attempt `i > 0` waits
/// `initial_delay * factor^(i - 1)`.
///
/// ```rust
/// use std::time::Duration;
///
/// use flowguard_resilience::retry::attempts;
///
/// let plan = attempts(3, Duration::from_millis(100), 2.0);
/// let delays: Vec<u128> = plan.iter().map(|p| p.delay.as_millis()).collect();
/// assert_eq!(delays, vec![0, 100, 200]);
/// assert_eq!(plan[2].cumulative_wait, Duration::from_millis(300));
/// ```
pub fn attempts(max_attempts: u32, initial_delay: Duration, factor: f64) -> Vec<PlannedAttempt> {
    let mut cumulative_wait = Duration::ZERO;
    (0..max_attempts)
        .map(|attempt| {
            let delay = match attempt.checked_sub(1) {
                None => Duration::ZERO,
                Some(exponent) => {
                    calculate_delay(exponent, initial_delay, factor, Duration::MAX, false)
                }
            };
            cumulative_wait = cumulative_wait.saturating_add(delay);
            PlannedAttempt { attempt, delay, cumulative_wait }
        })
        .collect()
}

/// Is `status` a transient HTTP failure?
pub fn is_retryable(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn round_millis(millis: f64) -> u64 {
    if millis.is_nan() || millis <= 0.0 {
        0
    } else if millis >= u64::MAX as f64 {
        u64::MAX
    } else {
        millis.round() as u64
    }
}
