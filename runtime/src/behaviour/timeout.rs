//! Deadlines for leaf producers and whole composites.
//!
//! The guarded work always runs on its own task under a derived scope. When the
//! deadline fires first, that scope is cancelled and the task is detached: it
//! keeps running until it observes the signal or finishes, and its result is
//! discarded. Work is never aborted mid-flight, so disposals inside it still run.

use super::{Strategy, rewrite};
use crate::concurrency::joined_task;
use crate::continuation::{Stack, Step};
use crate::flow::Flow;
use crate::interpreter::interpret;
use crate::nested::Nested;
use crate::schematic::Inspect;
use futures_util::FutureExt;
use rivulet_core::{
    BoxFuture, Callback, CallbackShape, CancelScope, EdgeType, FlowError, NodeKind, Outcome,
    TimeoutPolicy, Value,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub(super) fn wrap<T: Value>(producer: Callback<(), T>, policy: TimeoutPolicy) -> Callback<(), T> {
    Callback::scoped(move |(), scope| {
        let producer = producer.clone();
        async move {
            race_deadline(policy.limit(), &scope, |deadline| {
                match producer.shape() {
                    // Blocking producers move off the async workers so the
                    // deadline can fire while they run.
                    CallbackShape::Sync => {
                        let runtime = Handle::current();
                        let handle = tokio::task::spawn_blocking(move || {
                            runtime.block_on(async move { producer.invoke((), &deadline).await })
                        });
                        async move { joined_task(handle.await).and_then(|result| result) }.boxed()
                    }
                    _ => {
                        let handle =
                            tokio::spawn(async move { producer.invoke((), &deadline).await });
                        async move { joined_task(handle.await).and_then(|result| result) }.boxed()
                    }
                }
            })
            .await
        }
    })
}

/// Race an entire composite against the deadline.
pub(super) fn guard<T: Value>(body: Flow<T>, policy: TimeoutPolicy) -> Flow<T> {
    Flow::nested(Deadline { body, policy })
}

struct Deadline<T: Value> {
    body: Flow<T>,
    policy: TimeoutPolicy,
}

impl<T: Value> Nested<T> for Deadline<T> {
    fn kind(&self) -> NodeKind {
        NodeKind::Deadline
    }

    fn descend<'a>(
        &'a self,
        _stack: &'a mut Stack<T>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>> {
        Box::pin(async move {
            let body = self.body.clone();
            let settled = race_deadline(self.policy.limit(), scope, |deadline| {
                let handle = tokio::spawn(async move { interpret(body, &deadline).await.into_result() });
                async move { joined_task(handle.await).and_then(|result| result) }.boxed()
            })
            .await;
            Step::Resume(Outcome::from(settled))
        })
    }

    fn rewrite(&self, strategy: &Strategy) -> Arc<dyn Nested<T>> {
        Arc::new(Self {
            body: rewrite(&self.body, strategy),
            policy: self.policy,
        })
    }

    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)> {
        vec![(EdgeType::Guarded, Box::new(self.body.clone()) as Box<dyn Inspect>)]
    }
}

/// Start the work under a derived scope and wait for it or the deadline.
async fn race_deadline<T, F>(limit: Duration, scope: &CancelScope, start: F) -> Result<T, FlowError>
where
    F: FnOnce(CancelScope) -> BoxFuture<'static, Result<T, FlowError>>,
{
    let deadline = scope.child();
    let work = start(deadline.clone());
    tokio::select! {
        settled = work => settled,
        _ = tokio::time::sleep(limit) => {
            deadline.cancel();
            tracing::debug!(?limit, "deadline expired; detaching guarded work");
            Err(FlowError::TimedOut(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn policy(ms: u64) -> TimeoutPolicy {
        TimeoutPolicy::new(Duration::from_millis(ms)).unwrap()
    }

    #[tokio::test]
    async fn test_fast_producer_beats_deadline() {
        let cb: Callback<(), u32> = Callback::from_async(|()| async { Ok(9) });
        let wrapped = wrap(cb, policy(500));
        assert_eq!(wrapped.invoke((), &CancelScope::new()).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_blocking_producer_times_out() {
        let cb: Callback<(), u32> = Callback::sync(|()| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(1)
        });
        let err = wrap(cb, policy(20))
            .invoke((), &CancelScope::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_deadline_cancels_cancellable_producer() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();
        let cb: Callback<(), u32> = Callback::cancellable(move |(), scope: CancelScope| {
            let flag = flag.clone();
            async move {
                scope.cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Err(anyhow::Error::new(FlowError::Cancelled))
            }
        });

        let err = wrap(cb, policy(20))
            .invoke((), &CancelScope::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observed.load(Ordering::SeqCst));
    }
}
