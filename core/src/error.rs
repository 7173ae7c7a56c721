use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The failure payload carried by [`Outcome::Failure`](crate::Outcome::Failure).
///
/// `FlowError` is cheap to clone so that failure observers, race aggregation and
/// retry loops can all hold on to the same error.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A user callback (producer, selector, effect, predicate, handler,
    /// acquire, use or dispose) failed. The original error is preserved.
    #[error("{0:#}")]
    Callback(Arc<anyhow::Error>),

    /// The operation observed a cancellation request before it could run.
    #[error("operation was cancelled")]
    Cancelled,

    /// A deadline installed by a timeout behaviour expired first.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// Several concurrent branches failed.
    #[error("{}", AggregateDisplay(.0))]
    Aggregate(Vec<FlowError>),

    /// A user callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Coarse classification of a [`FlowError`], used by retry exclusions and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Callback,
    Cancelled,
    TimedOut,
    Aggregate,
    Panicked,
}

impl FlowError {
    /// Wrap any error as a callback failure.
    pub fn callback(err: impl Into<anyhow::Error>) -> Self {
        Self::from(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Callback(_) => ErrorKind::Callback,
            FlowError::Cancelled => ErrorKind::Cancelled,
            FlowError::TimedOut(_) => ErrorKind::TimedOut,
            FlowError::Aggregate(_) => ErrorKind::Aggregate,
            FlowError::Panicked(_) => ErrorKind::Panicked,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::TimedOut(_))
    }

    /// Borrow the user error if this is a callback failure of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            FlowError::Callback(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Branch failures of an aggregate; empty for every other variant.
    pub fn causes(&self) -> &[FlowError] {
        match self {
            FlowError::Aggregate(causes) => causes,
            _ => &[],
        }
    }

    /// Convert a caught panic payload into a failure.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        FlowError::Panicked(message)
    }
}

impl From<anyhow::Error> for FlowError {
    /// A `FlowError` that travelled through `anyhow` is unwrapped back to itself.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<FlowError>() {
            Ok(flow_err) => flow_err,
            Err(other) => FlowError::Callback(Arc::new(other)),
        }
    }
}

struct AggregateDisplay<'a>(&'a [FlowError]);

impl fmt::Display for AggregateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} branch(es) failed", self.0.len())?;
        for (idx, cause) in self.0.iter().enumerate() {
            write!(f, "; [{idx}] {cause}")?;
        }
        Ok(())
    }
}

/// Misconfiguration detected while building a behaviour or loading its config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("retry requires at least one attempt")]
    ZeroAttempts,

    #[error("timeout duration must be greater than zero")]
    ZeroTimeout,

    #[error("invalid behaviour config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read behaviour config: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("card declined")]
    struct Declined;

    #[test]
    fn test_callback_error_preserves_payload() {
        let err = FlowError::callback(Declined);
        assert_eq!(err.kind(), ErrorKind::Callback);
        assert!(err.downcast_ref::<Declined>().is_some());
        assert_eq!(err.to_string(), "card declined");
    }

    #[test]
    fn test_flow_error_round_trips_through_anyhow() {
        let wrapped = anyhow::Error::new(FlowError::Cancelled);
        assert!(FlowError::from(wrapped).is_cancelled());
    }

    #[test]
    fn test_aggregate_lists_causes() {
        let err = FlowError::Aggregate(vec![
            FlowError::callback(anyhow::anyhow!("a")),
            FlowError::TimedOut(Duration::from_millis(5)),
        ]);
        assert_eq!(err.causes().len(), 2);
        let text = err.to_string();
        assert!(text.starts_with("2 branch(es) failed"));
        assert!(text.contains("[0] a"));
    }
}
