//! Resource scopes: acquire, use, dispose.
//!
//! Disposal is modelled as a continuation pushed onto the interpreter stack
//! before the body is entered, so it runs once the body's outcome is known no
//! matter how that outcome was reached: success, failure, cancellation, or a
//! failing `use` callback.

use crate::behaviour::{self, Strategy};
use crate::continuation::{Continuation, Stack, Step};
use crate::flow::Flow;
use crate::nested::Nested;
use crate::schematic::Inspect;
use async_trait::async_trait;
use futures_util::FutureExt;
use rivulet_core::{BoxFuture, Callback, CancelScope, EdgeType, FlowError, NodeKind, Outcome, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Something that must be released after use.
///
/// `dispose` runs exactly once for every successful acquisition. An error it
/// returns replaces the outcome of the body.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    async fn dispose(&self) -> anyhow::Result<()>;
}

pub(crate) struct ResourceScope<R: Resource, T: Value> {
    acquire: Callback<(), R>,
    body: Callback<Arc<R>, Flow<T>>,
}

impl<R: Resource, T: Value> ResourceScope<R, T> {
    pub(crate) fn new(acquire: Callback<(), R>, body: Callback<Arc<R>, Flow<T>>) -> Self {
        Self { acquire, body }
    }
}

impl<R: Resource, T: Value> Nested<T> for ResourceScope<R, T> {
    fn kind(&self) -> NodeKind {
        NodeKind::WithResource
    }

    fn descend<'a>(
        &'a self,
        stack: &'a mut Stack<T>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>> {
        Box::pin(async move {
            let resource = match self.acquire.invoke((), scope).await {
                Ok(resource) => Arc::new(resource),
                Err(err) => {
                    tracing::debug!(error = %err, "resource acquisition failed");
                    return Step::Resume(Outcome::Failure(err));
                }
            };
            tracing::trace!(resource = std::any::type_name::<R>(), "resource acquired");
            stack.push(Box::new(Dispose {
                resource: resource.clone(),
            }));

            match self.body.invoke(resource, scope).await {
                Ok(body) => Step::Push(body),
                Err(err) => Step::Resume(Outcome::Failure(err)),
            }
        })
    }

    fn rewrite(&self, strategy: &Strategy) -> Arc<dyn Nested<T>> {
        Arc::new(Self {
            acquire: self.acquire.clone(),
            body: behaviour::rewrite_produced(&self.body, strategy),
        })
    }

    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)> {
        // The body only exists once the resource does.
        Vec::new()
    }
}

struct Dispose<R: Resource> {
    resource: Arc<R>,
}

impl<R: Resource, T: Value> Continuation<T> for Dispose<R> {
    fn apply<'a>(
        self: Box<Self>,
        outcome: Outcome<T>,
        _scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>> {
        Box::pin(async move {
            let disposed = AssertUnwindSafe(self.resource.dispose())
                .catch_unwind()
                .await
                .map_err(FlowError::from_panic)
                .and_then(|result| result.map_err(FlowError::from));
            match disposed {
                Ok(()) => {
                    tracing::trace!(resource = std::any::type_name::<R>(), "resource disposed");
                    Step::Resume(outcome)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "resource disposal failed");
                    Step::Resume(Outcome::Failure(err))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked {
        disposed: Arc<AtomicUsize>,
        fail_dispose: bool,
    }

    #[async_trait]
    impl Resource for Tracked {
        async fn dispose(&self) -> anyhow::Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            if self.fail_dispose {
                anyhow::bail!("close failed");
            }
            Ok(())
        }
    }

    fn acquire(
        disposed: &Arc<AtomicUsize>,
        fail_dispose: bool,
    ) -> impl Fn() -> anyhow::Result<Tracked> + Send + Sync + 'static {
        let disposed = disposed.clone();
        move || {
            Ok(Tracked {
                disposed: disposed.clone(),
                fail_dispose,
            })
        }
    }

    #[tokio::test]
    async fn test_disposes_after_failing_use() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let flow: Flow<u32> = Flow::with_resource(acquire(&disposed, false), |_| {
            Err(anyhow::anyhow!("use failed"))
        });
        let outcome = flow.run(&CancelScope::new()).await;
        assert_eq!(outcome.error().map(ToString::to_string).as_deref(), Some("use failed"));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispose_failure_overrides_success() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let flow = Flow::with_resource(acquire(&disposed, true), |_| Ok(Flow::succeed(1u32)));
        let outcome = flow.run(&CancelScope::new()).await;
        assert_eq!(outcome.error().map(ToString::to_string).as_deref(), Some("close failed"));
    }

    #[tokio::test]
    async fn test_failed_acquire_disposes_nothing() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let flow: Flow<u32> = Flow::with_resource(
            || -> anyhow::Result<Tracked> { Err(anyhow::anyhow!("no connection")) },
            |_| Ok(Flow::succeed(1)),
        );
        assert!(flow.run(&CancelScope::new()).await.is_failure());
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }
}
