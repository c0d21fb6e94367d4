//! Circuit breaker thresholds and timeouts

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ResilienceError, ResilienceResult};
use crate::utils::duration_millis;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before an open circuit lets a probe through
    #[serde(rename = "reset_timeout_ms", with = "duration_millis")]
    pub reset_timeout: Duration,
    /// Number of half-open successes needed to close the circuit
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_success_threshold: 1,
        }
    }
}

impl BreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::config("failure_threshold must be greater than 0"));
        }
        if self.half_open_success_threshold == 0 {
            return Err(ResilienceError::config(
                "half_open_success_threshold must be greater than 0",
            ));
        }
        if self.reset_timeout.is_zero() {
            return Err(ResilienceError::config("reset_timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for [`BreakerConfig`]
#[derive(Debug, Default)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.config.half_open_success_threshold = threshold;
        self
    }

    pub fn build(self) -> ResilienceResult<BreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_config_default() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_millis(60_000));
        assert_eq!(config.half_open_success_threshold, 1);
        assert!(config.validate().is_ok());
    }

    /// Validates `BreakerConfig::validate` for each zero-valued field.
    ///
    /// Assertions:
    /// - Ensures every zeroed field yields a configuration error.
    #[test]
    fn test_breaker_config_validation() {
        let mut config = BreakerConfig { failure_threshold: 0, ..BreakerConfig::default() };
        assert!(config.validate().unwrap_err().is_configuration());

        config.failure_threshold = 2;
        config.half_open_success_threshold = 0;
        assert!(config.validate().is_err());

        config.half_open_success_threshold = 1;
        config.reset_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breaker_config_builder() {
        let config = BreakerConfig::builder()
            .failure_threshold(2)
            .reset_timeout(Duration::from_secs(5))
            .half_open_success_threshold(3)
            .build()
            .unwrap();

        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.reset_timeout, Duration::from_secs(5));
        assert_eq!(config.half_open_success_threshold, 3);
    }

    #[test]
    fn test_breaker_config_wire_names() {
        let config: BreakerConfig =
            serde_json::from_str(r#"{"failure_threshold":3,"reset_timeout_ms":1500}"#).unwrap();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.reset_timeout, Duration::from_millis(1500));
        assert_eq!(config.half_open_success_threshold, 1);
    }
}
