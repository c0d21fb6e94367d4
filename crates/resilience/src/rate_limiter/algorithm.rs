//! Per-limiter state and the three admission algorithms
//!
//! All three algorithms live in one enum so their formulas can be read side by
//! side. Every entry point first brings the state up to date with `now`
//! (token refill, stale timestamp purge, window reset) and then decides.
//!
//! | Algorithm | Refresh | Admit when | `retry_after` on denial |
//! |-----------|---------|------------|-------------------------|
//! | token bucket | `tokens += elapsed_secs * rate`, capped | `tokens >= count` | `(count - tokens) / rate` |
//! | sliding window | drop `t` with `now - t >= window` | `len + count <= max` | `oldest + window - now` |
//! | fixed window | reset when `now - start >= window` | `count + n <= max` | `start + window - now` |

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::config::{Algorithm, LimiterConfig, TokenBucketConfig, WindowConfig};
use crate::clock::{elapsed_millis, millis_ceil};

/// Result of an admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOutcome {
    /// Whether the request was (or would be) admitted
    pub allowed: bool,
    /// Capacity left, in whole requests/tokens
    pub remaining: u64,
    /// Earliest moment worth trying again, set only on denial
    pub retry_after: Option<Duration>,
}

impl AcquireOutcome {
    const fn granted(remaining: u64) -> Self {
        Self { allowed: true, remaining, retry_after: None }
    }

    fn denied(remaining: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after: Some(Duration::from_millis(millis_ceil(retry_after))),
        }
    }

    /// `retry_after` in whole milliseconds
    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after.map(millis_ceil)
    }
}

/// Observability snapshot of one limiter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum LimiterStatus {
    TokenBucket {
        tokens: f64,
        max_tokens: f64,
        refill_rate: f64,
        /// Time since the last refill was applied
        last_refill_age_ms: u64,
    },
    SlidingWindow {
        max_requests: u32,
        window_ms: u64,
        /// Requests admitted within the trailing window
        in_window: u32,
        oldest_age_ms: Option<u64>,
    },
    FixedWindow {
        max_requests: u32,
        window_ms: u64,
        count: u32,
        window_age_ms: u64,
    },
}

/// State of one named limiter
#[derive(Debug, Clone)]
pub enum Limiter {
    TokenBucket { config: TokenBucketConfig, tokens: f64, last_refill: Instant },
    SlidingWindow { config: WindowConfig, timestamps: VecDeque<Instant> },
    FixedWindow { config: WindowConfig, count: u32, window_start: Instant },
}

impl Limiter {
    /// Fresh limiter at full capacity
    pub fn new(config: LimiterConfig, now: Instant) -> Self {
        match config {
            LimiterConfig::TokenBucket(config) => {
                Self::TokenBucket { config, tokens: config.max_tokens, last_refill: now }
            }
            LimiterConfig::SlidingWindow(config) => {
                Self::SlidingWindow { config, timestamps: VecDeque::new() }
            }
            LimiterConfig::FixedWindow(config) => {
                Self::FixedWindow { config, count: 0, window_start: now }
            }
        }
    }

    pub fn config(&self) -> LimiterConfig {
        match self {
            Self::TokenBucket { config, .. } => LimiterConfig::TokenBucket(*config),
            Self::SlidingWindow { config, .. } => LimiterConfig::SlidingWindow(*config),
            Self::FixedWindow { config, .. } => LimiterConfig::FixedWindow(*config),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.config().algorithm()
    }

    /// Apply the lazy refill / purge / reset for `now`
    pub fn refresh(&mut self, now: Instant) {
        match self {
            Self::TokenBucket { config, tokens, last_refill } => {
                *tokens = refilled(config, *tokens, *last_refill, now);
                *last_refill = now;
            }
            Self::SlidingWindow { config, timestamps } => {
                while timestamps.front().is_some_and(|&t| is_stale(t, config.window, now)) {
                    timestamps.pop_front();
                }
            }
            Self::FixedWindow { config, count, window_start } => {
                if is_stale(*window_start, config.window, now) {
                    *window_start = now;
                    *count = 0;
                }
            }
        }
    }

    /// Admit `count` units if capacity allows, consuming them
    pub fn acquire(&mut self, count: u32, now: Instant) -> AcquireOutcome {
        self.refresh(now);
        match self {
            Self::TokenBucket { config, tokens, .. } => {
                let wanted = f64::from(count);
                if *tokens >= wanted {
                    *tokens -= wanted;
                    AcquireOutcome::granted(whole(*tokens))
                } else {
                    AcquireOutcome::denied(whole(*tokens), token_deficit(config, *tokens, wanted))
                }
            }
            Self::SlidingWindow { config, timestamps } => {
                if fits(timestamps.len(), count, config.max_requests) {
                    timestamps.extend(std::iter::repeat(now).take(count as usize));
                    AcquireOutcome::granted(free_slots(config.max_requests, timestamps.len()))
                } else {
                    AcquireOutcome::denied(
                        free_slots(config.max_requests, timestamps.len()),
                        sliding_retry_after(config, timestamps.front().copied(), now),
                    )
                }
            }
            Self::FixedWindow { config, count: used, window_start } => {
                if fits(*used as usize, count, config.max_requests) {
                    *used += count;
                    AcquireOutcome::granted(u64::from(config.max_requests - *used))
                } else {
                    AcquireOutcome::denied(
                        u64::from(config.max_requests.saturating_sub(*used)),
                        window_end(*window_start, config.window, now),
                    )
                }
            }
        }
    }

    /// Decide a single-unit request as of `now` without touching the state
    ///
    /// `remaining` is the capacity before consumption.
    pub fn check(&self, now: Instant) -> AcquireOutcome {
        match self {
            Self::TokenBucket { config, tokens, last_refill } => {
                let tokens = refilled(config, *tokens, *last_refill, now);
                if tokens >= 1.0 {
                    AcquireOutcome::granted(whole(tokens))
                } else {
                    AcquireOutcome::denied(whole(tokens), token_deficit(config, tokens, 1.0))
                }
            }
            Self::SlidingWindow { config, timestamps } => {
                let mut live = timestamps.iter().filter(|&&t| !is_stale(t, config.window, now));
                let oldest = live.next().copied();
                let in_window = usize::from(oldest.is_some()) + live.count();
                if fits(in_window, 1, config.max_requests) {
                    AcquireOutcome::granted(free_slots(config.max_requests, in_window))
                } else {
                    AcquireOutcome::denied(
                        free_slots(config.max_requests, in_window),
                        sliding_retry_after(config, oldest, now),
                    )
                }
            }
            Self::FixedWindow { config, count, window_start } => {
                let (count, start) = if is_stale(*window_start, config.window, now) {
                    (0, now)
                } else {
                    (*count, *window_start)
                };
                let remaining = u64::from(config.max_requests.saturating_sub(count));
                if fits(count as usize, 1, config.max_requests) {
                    AcquireOutcome::granted(remaining)
                } else {
                    AcquireOutcome::denied(remaining, window_end(start, config.window, now))
                }
            }
        }
    }

    /// Current capacity after the lazy refresh
    pub fn remaining(&mut self, now: Instant) -> u64 {
        self.refresh(now);
        match self {
            Self::TokenBucket { tokens, .. } => whole(*tokens),
            Self::SlidingWindow { config, timestamps } => {
                free_slots(config.max_requests, timestamps.len())
            }
            Self::FixedWindow { config, count, .. } => {
                u64::from(config.max_requests.saturating_sub(*count))
            }
        }
    }

    /// Back to full capacity, keeping the configuration
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(self.config(), now);
    }

    /// Snapshot as of `now`, with the refresh applied to the copy only
    pub fn status(&self, now: Instant) -> LimiterStatus {
        let mut view = self.clone();
        view.refresh(now);
        match view {
            Self::TokenBucket { config, tokens, last_refill } => LimiterStatus::TokenBucket {
                tokens,
                max_tokens: config.max_tokens,
                refill_rate: config.refill_rate,
                last_refill_age_ms: elapsed_millis(now, last_refill),
            },
            Self::SlidingWindow { config, timestamps } => LimiterStatus::SlidingWindow {
                max_requests: config.max_requests,
                window_ms: millis_ceil(config.window),
                in_window: u32::try_from(timestamps.len()).unwrap_or(u32::MAX),
                oldest_age_ms: timestamps.front().map(|&t| elapsed_millis(now, t)),
            },
            Self::FixedWindow { config, count, window_start } => LimiterStatus::FixedWindow {
                max_requests: config.max_requests,
                window_ms: millis_ceil(config.window),
                count,
                window_age_ms: elapsed_millis(now, window_start),
            },
        }
    }
}

fn refilled(config: &TokenBucketConfig, tokens: f64, last_refill: Instant, now: Instant) -> f64 {
    let elapsed = now.saturating_duration_since(last_refill).as_secs_f64();
    (elapsed.mul_add(config.refill_rate, tokens)).min(config.max_tokens)
}

/// Time until `wanted` tokens are available
fn token_deficit(config: &TokenBucketConfig, tokens: f64, wanted: f64) -> Duration {
    let millis = ((wanted - tokens) / config.refill_rate * 1000.0).ceil();
    Duration::from_millis(float_to_millis(millis))
}

fn sliding_retry_after(config: &WindowConfig, oldest: Option<Instant>, now: Instant) -> Duration {
    // An empty window that still denies means `count` exceeds capacity.
    oldest.map_or(config.window, |oldest| window_end(oldest, config.window, now))
}

fn window_end(start: Instant, window: Duration, now: Instant) -> Duration {
    start.checked_add(window).map_or(window, |end| end.saturating_duration_since(now))
}

fn is_stale(t: Instant, window: Duration, now: Instant) -> bool {
    now.saturating_duration_since(t) >= window
}

fn fits(used: usize, count: u32, max: u32) -> bool {
    used.saturating_add(count as usize) <= max as usize
}

fn free_slots(max: u32, used: usize) -> u64 {
    (max as usize).saturating_sub(used) as u64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(tokens: f64) -> u64 {
    tokens.max(0.0).floor() as u64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn float_to_millis(millis: f64) -> u64 {
    if millis.is_finite() {
        millis.max(0.0) as u64
    } else {
        u64::MAX
    }
}
