//! Cooperative cancellation shared by one flow execution.

use crate::error::FlowError;
use tokio_util::sync::CancellationToken;

/// The cancellation context threaded through an execution.
///
/// Cloning yields a handle to the same signal. [`CancelScope::child`] derives a
/// scope that observes its parent but whose own cancellation never propagates
/// upward; races use it so that a winner only signals its own losers.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a scope cancelled together with `self`, but independently cancellable.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(FlowError::Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), FlowError> {
        if self.is_cancelled() {
            Err(FlowError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for CancelScope {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_cancellation_does_not_reach_parent() {
        let parent = CancelScope::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(parent.check().is_ok());
    }

    #[test]
    fn test_parent_cancellation_reaches_child() {
        let parent = CancelScope::new();
        let child = parent.child();

        parent.cancel();
        assert!(matches!(child.check(), Err(FlowError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let scope = CancelScope::new();
        let waiter = scope.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        scope.cancel();
        handle.await.unwrap();
    }
}
