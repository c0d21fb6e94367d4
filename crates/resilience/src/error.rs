//! Error types for the resilience registries
//!
//! Only configuration and lookup problems are errors. Admission denials
//! (`allowed: false`) and open breakers are ordinary return values, and the
//! failures of operations wrapped by the retry executor are handed back to the
//! caller verbatim.
//!
//! | Variant | Raised by | Retryable |
//! |---------|-----------|-----------|
//! | `UnsupportedAlgorithm` | limiter creation from an algorithm name | no |
//! | `InvalidConfiguration` | any config `validate()` / settings parsing | no |
//! | `LimiterNotFound` | limiter operations on an unknown name | no |
//! | `BreakerNotFound` | `record` / `state` on an unknown name | no |
//! | `RateLimitTimeout` | `RateLimiterRegistry::wait` | yes |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by the limiter, breaker and retry components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    /// The algorithm name is not one of the supported limiter algorithms
    #[error("Unsupported rate limiting algorithm: '{algorithm}'")]
    UnsupportedAlgorithm { algorithm: String },

    /// A configuration value is out of range or malformed
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No limiter has been created under this name
    #[error("Rate limiter not found: '{name}'")]
    LimiterNotFound { name: String },

    /// No circuit breaker has been created under this name
    #[error("Circuit breaker not found: '{name}'")]
    BreakerNotFound { name: String },

    /// `wait` spent its whole budget without being admitted
    #[error("Timed out after {waited:?} waiting for rate limiter '{name}'")]
    RateLimitTimeout { name: String, waited: Duration },
}

/// Result type for registry and configuration operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

impl ResilienceError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    pub(crate) fn limiter_not_found(name: &str) -> Self {
        Self::LimiterNotFound { name: name.to_string() }
    }

    pub(crate) fn breaker_not_found(name: &str) -> Self {
        Self::BreakerNotFound { name: name.to_string() }
    }

    /// True for the configuration class (unknown algorithm, bad parameters)
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedAlgorithm { .. } | Self::InvalidConfiguration { .. })
    }

    /// True for lookups against names that were never created
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LimiterNotFound { .. } | Self::BreakerNotFound { .. })
    }
}

/// Severity levels used for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected conditions
    Info,
    /// Degraded but operational
    Warning,
    /// Failure requiring attention
    Error,
    /// System integrity at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Uniform classification of errors by retryability and severity
pub trait ErrorClassification {
    /// Can the failed call be attempted again unchanged?
    fn is_retryable(&self) -> bool;

    /// How serious is this error?
    fn severity(&self) -> ErrorSeverity;

    /// Does this error require immediate attention?
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before trying again, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl ErrorClassification for ResilienceError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitTimeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnsupportedAlgorithm { .. } | Self::InvalidConfiguration { .. } => {
                ErrorSeverity::Error
            }
            Self::LimiterNotFound { .. } | Self::BreakerNotFound { .. } => ErrorSeverity::Error,
            Self::RateLimitTimeout { .. } => ErrorSeverity::Warning,
        }
    }
}
