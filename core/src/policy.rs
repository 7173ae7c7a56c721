//! Validated parameters for the built-in behaviours.

use crate::error::{ConfigError, ErrorKind, FlowError};
use std::fmt;
use std::time::Duration;

/// How many times a leaf producer may run, and which failures end retrying early.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    non_retryable: Vec<Exclusion>,
}

#[derive(Clone)]
enum Exclusion {
    Kind(ErrorKind),
    UserType {
        name: &'static str,
        matches: fn(&FlowError) -> bool,
    },
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; zero is rejected.
    ///
    /// Timeouts are non-retryable by default.
    pub fn new(max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            delay: Duration::ZERO,
            non_retryable: vec![Exclusion::Kind(ErrorKind::TimedOut)],
        })
    }

    /// Pause between a failed attempt and the next one.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never retry failures of this kind.
    pub fn never_retry_kind(mut self, kind: ErrorKind) -> Self {
        self.non_retryable.push(Exclusion::Kind(kind));
        self
    }

    /// Never retry callback failures whose error is exactly of type `E`.
    pub fn never_retry<E>(mut self) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.non_retryable.push(Exclusion::UserType {
            name: std::any::type_name::<E>(),
            matches: |err: &FlowError| err.downcast_ref::<E>().is_some(),
        });
        self
    }

    /// Replace the exclusion set with exactly these kinds.
    pub fn with_non_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.non_retryable = kinds.into_iter().map(Exclusion::Kind).collect();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_retryable(&self, err: &FlowError) -> bool {
        !self.non_retryable.iter().any(|exclusion| match exclusion {
            Exclusion::Kind(kind) => err.kind() == *kind,
            Exclusion::UserType { matches, .. } => matches(err),
        })
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let excluded: Vec<String> = self
            .non_retryable
            .iter()
            .map(|exclusion| match exclusion {
                Exclusion::Kind(kind) => format!("{kind:?}"),
                Exclusion::UserType { name, .. } => (*name).to_string(),
            })
            .collect();
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("non_retryable", &excluded)
            .finish()
    }
}

/// A deadline raced against each leaf producer (or an entire composite).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    limit: Duration,
}

impl TimeoutPolicy {
    pub fn new(limit: Duration) -> Result<Self, ConfigError> {
        if limit.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("invalid card number")]
    struct InvalidCard;

    #[test]
    fn test_zero_attempts_is_rejected() {
        assert!(matches!(RetryPolicy::new(0), Err(ConfigError::ZeroAttempts)));
        assert_eq!(RetryPolicy::new(3).unwrap().max_attempts(), 3);
    }

    #[test]
    fn test_timeouts_are_not_retried_by_default() {
        let policy = RetryPolicy::new(3).unwrap();
        assert!(!policy.is_retryable(&FlowError::TimedOut(Duration::from_secs(1))));
        assert!(policy.is_retryable(&FlowError::callback(anyhow::anyhow!("flaky"))));
    }

    #[test]
    fn test_user_type_exclusion_matches_exact_type() {
        let policy = RetryPolicy::new(3).unwrap().never_retry::<InvalidCard>();
        assert!(!policy.is_retryable(&FlowError::callback(InvalidCard)));
        assert!(policy.is_retryable(&FlowError::callback(anyhow::anyhow!("other"))));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(matches!(
            TimeoutPolicy::new(Duration::ZERO),
            Err(ConfigError::ZeroTimeout)
        ));
    }
}
