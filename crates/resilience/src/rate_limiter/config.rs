//! Typed limiter configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ResilienceError, ResilienceResult};
use crate::utils::duration_millis;

/// The supported admission algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Bursty admission with continuous refill
    TokenBucket,
    /// Exact count over a trailing window
    SlidingWindow,
    /// Count per fixed-length window, reset wholesale
    FixedWindow,
}

impl Algorithm {
    /// Canonical name, as accepted by [`FromStr`]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenBucket => "token-bucket",
            Self::SlidingWindow => "sliding-window",
            Self::FixedWindow => "fixed-window",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token-bucket" => Ok(Self::TokenBucket),
            "sliding-window" => Ok(Self::SlidingWindow),
            "fixed-window" => Ok(Self::FixedWindow),
            other => Err(ResilienceError::UnsupportedAlgorithm { algorithm: other.to_string() }),
        }
    }
}

/// Configuration for a token bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBucketConfig {
    /// Bucket capacity, also the initial token count
    pub max_tokens: f64,
    /// Tokens added per second of elapsed time
    pub refill_rate: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { max_tokens: 10.0, refill_rate: 1.0 }
    }
}

impl TokenBucketConfig {
    /// Create a new configuration builder
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if !self.max_tokens.is_finite() || self.max_tokens <= 0.0 {
            return Err(ResilienceError::config("max_tokens must be a positive number"));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(ResilienceError::config("refill_rate must be a positive number"));
        }
        Ok(())
    }
}

/// Builder for [`TokenBucketConfig`]
#[derive(Debug, Default)]
pub struct TokenBucketConfigBuilder {
    config: TokenBucketConfig,
}

impl TokenBucketConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_tokens(mut self, max_tokens: f64) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn refill_rate(mut self, per_second: f64) -> Self {
        self.config.refill_rate = per_second;
        self
    }

    pub fn build(self) -> ResilienceResult<TokenBucketConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration shared by the sliding and fixed window algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length
    #[serde(rename = "window_ms", with = "duration_millis")]
    pub window: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { max_requests: 60, window: Duration::from_secs(60) }
    }
}

impl WindowConfig {
    /// Create a new configuration builder
    pub fn builder() -> WindowConfigBuilder {
        WindowConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_requests == 0 {
            return Err(ResilienceError::config("max_requests must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(ResilienceError::config("window must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for [`WindowConfig`]
#[derive(Debug, Default)]
pub struct WindowConfigBuilder {
    config: WindowConfig,
}

impl WindowConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn build(self) -> ResilienceResult<WindowConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Full configuration of one named limiter
///
/// Serialized with an `algorithm` tag next to the algorithm's own fields:
///
/// ```toml
/// algorithm = "sliding-window"
/// max_requests = 100
/// window_ms = 60000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum LimiterConfig {
    TokenBucket(TokenBucketConfig),
    SlidingWindow(WindowConfig),
    FixedWindow(WindowConfig),
}

impl LimiterConfig {
    pub fn token_bucket(max_tokens: f64, refill_rate: f64) -> Self {
        Self::TokenBucket(TokenBucketConfig { max_tokens, refill_rate })
    }

    pub fn sliding_window(max_requests: u32, window: Duration) -> Self {
        Self::SlidingWindow(WindowConfig { max_requests, window })
    }

    pub fn fixed_window(max_requests: u32, window: Duration) -> Self {
        Self::FixedWindow(WindowConfig { max_requests, window })
    }

    /// Default configuration for `algorithm`
    pub fn default_for(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::TokenBucket => Self::TokenBucket(TokenBucketConfig::default()),
            Algorithm::SlidingWindow => Self::SlidingWindow(WindowConfig::default()),
            Algorithm::FixedWindow => Self::FixedWindow(WindowConfig::default()),
        }
    }

    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::TokenBucket(_) => Algorithm::TokenBucket,
            Self::SlidingWindow(_) => Algorithm::SlidingWindow,
            Self::FixedWindow(_) => Algorithm::FixedWindow,
        }
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        match self {
            Self::TokenBucket(config) => config.validate(),
            Self::SlidingWindow(config) | Self::FixedWindow(config) => config.validate(),
        }
    }
}

/// Loosely-typed limiter parameters
///
/// Every field is optional. [`LimiterParams::into_config`] picks the fields
/// relevant to the chosen algorithm, fills the rest from that algorithm's
/// defaults and ignores the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterParams {
    pub max_tokens: Option<f64>,
    pub refill_rate: Option<f64>,
    pub max_requests: Option<u32>,
    pub window_ms: Option<u64>,
}

impl LimiterParams {
    pub fn max_tokens(mut self, max_tokens: f64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn refill_rate(mut self, per_second: f64) -> Self {
        self.refill_rate = Some(per_second);
        self
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = Some(max_requests);
        self
    }

    pub fn window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = Some(window_ms);
        self
    }

    /// Resolve into a validated configuration for `algorithm`
    pub fn into_config(self, algorithm: Algorithm) -> ResilienceResult<LimiterConfig> {
        let config = match algorithm {
            Algorithm::TokenBucket => {
                let defaults = TokenBucketConfig::default();
                LimiterConfig::TokenBucket(TokenBucketConfig {
                    max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
                    refill_rate: self.refill_rate.unwrap_or(defaults.refill_rate),
                })
            }
            Algorithm::SlidingWindow => LimiterConfig::SlidingWindow(self.window_config()),
            Algorithm::FixedWindow => LimiterConfig::FixedWindow(self.window_config()),
        };
        config.validate()?;
        Ok(config)
    }

    fn window_config(self) -> WindowConfig {
        let defaults = WindowConfig::default();
        WindowConfig {
            max_requests: self.max_requests.unwrap_or(defaults.max_requests),
            window: self.window_ms.map_or(defaults.window, Duration::from_millis),
        }
    }
}
