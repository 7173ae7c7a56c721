//! User callbacks in their sync, async and cancellable shapes.
//!
//! Every node that runs user code stores a [`Callback`]. Invocation is the single
//! place where user errors and panics are converted into [`FlowError`]s, so the
//! interpreter never sees an unwinding callback.

use crate::cancel::CancelScope;
use crate::error::FlowError;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for async boxed futures used across the engine.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type SyncFn<A, B> = Arc<dyn Fn(A) -> anyhow::Result<B> + Send + Sync>;
type AsyncFn<A, B> = Arc<dyn Fn(A) -> BoxFuture<'static, anyhow::Result<B>> + Send + Sync>;
type CancellableFn<A, B> =
    Arc<dyn Fn(A, CancelScope) -> BoxFuture<'static, anyhow::Result<B>> + Send + Sync>;
type ScopedFn<A, B> =
    Arc<dyn Fn(A, CancelScope) -> BoxFuture<'static, Result<B, FlowError>> + Send + Sync>;

/// A user function `A -> B` in one of the supported invocation shapes.
pub struct Callback<A, B> {
    shape: Shape<A, B>,
}

enum Shape<A, B> {
    Sync(SyncFn<A, B>),
    Async(AsyncFn<A, B>),
    Cancellable(CancellableFn<A, B>),
    Scoped(ScopedFn<A, B>),
}

/// The invocation shape of a [`Callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackShape {
    Sync,
    Async,
    Cancellable,
    Scoped,
}

impl<A, B> Clone for Callback<A, B> {
    fn clone(&self) -> Self {
        let shape = match &self.shape {
            Shape::Sync(f) => Shape::Sync(f.clone()),
            Shape::Async(f) => Shape::Async(f.clone()),
            Shape::Cancellable(f) => Shape::Cancellable(f.clone()),
            Shape::Scoped(f) => Shape::Scoped(f.clone()),
        };
        Self { shape }
    }
}

impl<A, B> fmt::Debug for Callback<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("shape", &self.shape())
            .finish()
    }
}

impl<A, B> Callback<A, B> {
    pub fn shape(&self) -> CallbackShape {
        match &self.shape {
            Shape::Sync(_) => CallbackShape::Sync,
            Shape::Async(_) => CallbackShape::Async,
            Shape::Cancellable(_) => CallbackShape::Cancellable,
            Shape::Scoped(_) => CallbackShape::Scoped,
        }
    }
}

impl<A, B> Callback<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    /// Runs inline on the executing task.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(A) -> anyhow::Result<B> + Send + Sync + 'static,
    {
        Self {
            shape: Shape::Sync(Arc::new(f)),
        }
    }

    /// Suspends until the returned future completes.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
    {
        Self {
            shape: Shape::Async(Arc::new(move |a| Box::pin(f(a)))),
        }
    }

    /// Receives the scope; short-circuits to `Cancelled` if it is already cancelled.
    pub fn cancellable<F, Fut>(f: F) -> Self
    where
        F: Fn(A, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
    {
        Self {
            shape: Shape::Cancellable(Arc::new(move |a, scope| Box::pin(f(a, scope)))),
        }
    }

    /// Receives the scope with no automatic cancellation check. Behaviours wrap
    /// existing callbacks in this shape so the wrapped callback keeps its own checks.
    pub fn scoped<F, Fut>(f: F) -> Self
    where
        F: Fn(A, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<B, FlowError>> + Send + 'static,
    {
        Self {
            shape: Shape::Scoped(Arc::new(move |a, scope| Box::pin(f(a, scope)))),
        }
    }

    /// Invoke the callback, converting errors and panics into [`FlowError`].
    pub async fn invoke(&self, input: A, scope: &CancelScope) -> Result<B, FlowError> {
        match &self.shape {
            Shape::Sync(f) => match catch_unwind(AssertUnwindSafe(|| f(input))) {
                Ok(result) => result.map_err(FlowError::from),
                Err(panic) => Err(FlowError::from_panic(panic)),
            },
            Shape::Async(f) => {
                let fut = catch_unwind(AssertUnwindSafe(|| f(input)))
                    .map_err(FlowError::from_panic)?;
                settle(fut).await?.map_err(FlowError::from)
            }
            Shape::Cancellable(f) => {
                scope.check()?;
                let fut = catch_unwind(AssertUnwindSafe(|| f(input, scope.clone())))
                    .map_err(FlowError::from_panic)?;
                settle(fut).await?.map_err(FlowError::from)
            }
            Shape::Scoped(f) => {
                let fut = catch_unwind(AssertUnwindSafe(|| f(input, scope.clone())))
                    .map_err(FlowError::from_panic)?;
                settle(fut).await?
            }
        }
    }

    /// Post-process the callback's output, preserving its cancellation behaviour.
    pub fn map_output<C, F>(&self, op: F) -> Callback<A, C>
    where
        C: Send + 'static,
        F: Fn(B) -> C + Send + Sync + 'static,
    {
        let inner = self.clone();
        let op = Arc::new(op);
        Callback::scoped(move |input, scope| {
            let inner = inner.clone();
            let op = op.clone();
            async move { inner.invoke(input, &scope).await.map(|out| op(out)) }
        })
    }
}

/// Await a user future, turning a panic during polling into a failure.
async fn settle<O>(fut: BoxFuture<'static, O>) -> Result<O, FlowError> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(FlowError::from_panic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_sync_error_becomes_callback_failure() {
        let cb: Callback<u32, u32> = Callback::sync(|_| Err(anyhow::anyhow!("boom")));
        let err = cb.invoke(1, &CancelScope::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let sync: Callback<(), u32> = Callback::sync(|_| panic!("sync panic"));
        let err = sync.invoke((), &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, FlowError::Panicked(ref msg) if msg == "sync panic"));

        let fut: Callback<(), u32> = Callback::from_async(|_| async {
            if true {
                panic!("async panic");
            }
            Ok(1)
        });
        let err = fut.invoke((), &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, FlowError::Panicked(_)));
    }

    #[tokio::test]
    async fn test_cancellable_checks_before_invoking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cb: Callback<(), ()> = Callback::cancellable(move |_, _scope| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        let scope = CancelScope::new();
        scope.cancel();
        let err = cb.invoke((), &scope).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_reports_shape() {
        let cb: Callback<u32, u32> = Callback::sync(Ok);
        assert_eq!(cb.shape(), CallbackShape::Sync);
        assert_eq!(format!("{cb:?}"), "Callback { shape: Sync }");
    }

    #[tokio::test]
    async fn test_map_output_keeps_precheck() {
        let cb: Callback<u32, u32> = Callback::cancellable(|v, _| async move { Ok(v + 1) });
        let doubled = cb.map_output(|v| v * 2);
        assert_eq!(doubled.invoke(1, &CancelScope::new()).await.unwrap(), 4);

        let scope = CancelScope::new();
        scope.cancel();
        assert!(doubled.invoke(1, &scope).await.unwrap_err().is_cancelled());
    }
}
