//! Declarative limiter and breaker setup
//!
//! A [`ResilienceSettings`] document lists named limiters and breakers plus
//! default retry options and `wait` tuning. It is usually loaded from TOML:
//!
//! ```toml
//! [retry]
//! max_attempts = 5
//! initial_delay_ms = 200
//! retry_on_substrings = ["timeout", "503"]
//!
//! [wait]
//! min_poll_interval_ms = 25
//!
//! [limiters.github]
//! algorithm = "token-bucket"
//! max_tokens = 5000.0
//! refill_rate = 1.4
//!
//! [limiters.search]
//! algorithm = "sliding-window"
//! max_requests = 30
//! window_ms = 60000
//!
//! [breakers.github]
//! failure_threshold = 5
//! reset_timeout_ms = 60000
//! ```
//!
//! Every field has a default, so sections and keys may be left out.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::circuit_breaker::BreakerConfig;
use crate::clock::Clock;
use crate::error::{ResilienceError, ResilienceResult};
use crate::rate_limiter::{Algorithm, LimiterConfig, LimiterParams, WaitOptions};
use crate::registry::Registry;
use crate::retry::RetryOptions;

/// Named limiters and breakers, default retry options and `wait` tuning
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResilienceSettings {
    pub retry: RetryOptions,
    pub wait: WaitOptions,
    pub limiters: BTreeMap<String, LimiterConfig>,
    pub breakers: BTreeMap<String, BreakerConfig>,
}

/// Settings as written on disk, before limiter algorithms are resolved
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsDocument {
    retry: RetryOptions,
    wait: WaitOptions,
    limiters: BTreeMap<String, LimiterEntry>,
    breakers: BTreeMap<String, BreakerConfig>,
}

#[derive(Debug, Deserialize)]
struct LimiterEntry {
    algorithm: String,
    #[serde(flatten)]
    params: LimiterParams,
}

impl TryFrom<SettingsDocument> for ResilienceSettings {
    type Error = ResilienceError;

    fn try_from(document: SettingsDocument) -> ResilienceResult<Self> {
        let mut limiters = BTreeMap::new();
        for (name, entry) in document.limiters {
            let algorithm: Algorithm = entry.algorithm.parse()?;
            let config = entry
                .params
                .into_config(algorithm)
                .map_err(|e| in_section(&format!("limiters.{name}"), &e))?;
            limiters.insert(name, config);
        }
        Ok(Self {
            retry: document.retry,
            wait: document.wait,
            limiters,
            breakers: document.breakers,
        })
    }
}

impl ResilienceSettings {
    /// Parse and validate a TOML document
    ///
    /// An unknown limiter algorithm fails with
    /// [`ResilienceError::UnsupportedAlgorithm`].
    pub fn from_toml_str(contents: &str) -> ResilienceResult<Self> {
        let document: SettingsDocument = toml::from_str(contents)
            .map_err(|e| ResilienceError::config(format!("Invalid TOML format: {e}")))?;
        let settings = Self::try_from(document)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> ResilienceResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading resilience settings from file");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ResilienceError::config(format!(
                "Failed to read settings file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> ResilienceResult<String> {
        toml::to_string(self)
            .map_err(|e| ResilienceError::config(format!("Cannot serialize settings: {e}")))
    }

    /// Validate every entry, naming the first offender
    pub fn validate(&self) -> ResilienceResult<()> {
        self.retry.validate().map_err(|e| in_section("retry", &e))?;
        for (name, config) in &self.limiters {
            config.validate().map_err(|e| in_section(&format!("limiters.{name}"), &e))?;
        }
        for (name, config) in &self.breakers {
            config.validate().map_err(|e| in_section(&format!("breakers.{name}"), &e))?;
        }
        Ok(())
    }
}

fn in_section(section: &str, error: &ResilienceError) -> ResilienceError {
    match error {
        ResilienceError::InvalidConfiguration { message } => {
            ResilienceError::config(format!("[{section}] {message}"))
        }
        other => other.clone(),
    }
}

impl<C: Clock> Registry<C> {
    /// Create a registry on `clock` with everything `settings` declares
    pub fn from_settings(settings: &ResilienceSettings, clock: C) -> ResilienceResult<Self> {
        settings.validate()?;
        let registry = Self::with_clock(clock).with_wait_options(settings.wait);
        registry.apply_settings(settings)?;
        Ok(registry)
    }

    /// Create every declared limiter and breaker, replacing same-named ones
    ///
    /// Nothing is applied unless the whole document validates. Returns the
    /// number of entries created. `wait` tuning is only taken into account by
    /// [`Registry::from_settings`].
    pub fn apply_settings(&self, settings: &ResilienceSettings) -> ResilienceResult<usize> {
        settings.validate()?;
        for (name, config) in &settings.limiters {
            self.limiters().create(name.as_str(), *config)?;
        }
        for (name, config) in &settings.breakers {
            self.breakers().create(name.as_str(), *config)?;
        }
        let applied = settings.limiters.len() + settings.breakers.len();
        info!(
            limiters = settings.limiters.len(),
            breakers = settings.breakers.len(),
            "Resilience settings applied"
        );
        Ok(applied)
    }
}
