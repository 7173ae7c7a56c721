//! Behaviour configuration loaded from TOML.
//!
//! ```toml
//! timeout_ms = 250
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 20
//! non_retryable = ["timed_out", "cancelled"]
//! ```

use crate::error::{ConfigError, ErrorKind};
use crate::policy::{RetryPolicy, TimeoutPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BehaviourConfig {
    #[serde(default)]
    pub retry: Option<RetrySettings>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_non_retryable")]
    pub non_retryable: Vec<ErrorKind>,
}

fn default_non_retryable() -> Vec<ErrorKind> {
    vec![ErrorKind::TimedOut]
}

impl BehaviourConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        // Reject bad values at load time rather than at first application.
        config.retry_policy()?;
        config.timeout_policy()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn retry_policy(&self) -> Result<Option<RetryPolicy>, ConfigError> {
        let Some(settings) = &self.retry else {
            return Ok(None);
        };
        let policy = RetryPolicy::new(settings.max_attempts)?
            .with_delay(Duration::from_millis(settings.delay_ms))
            .with_non_retryable_kinds(settings.non_retryable.iter().copied());
        Ok(Some(policy))
    }

    pub fn timeout_policy(&self) -> Result<Option<TimeoutPolicy>, ConfigError> {
        self.timeout_ms
            .map(|ms| TimeoutPolicy::new(Duration::from_millis(ms)))
            .transpose()
    }
}
