//! # Trampoline Interpreter
//!
//! Evaluates a [`Flow`] with an explicit continuation stack instead of native
//! recursion, so arbitrarily long chains of same-type operators run in
//! constant call-stack depth:
//!
//! 1. **Descend**: walk upstream links, pushing one continuation per operator,
//!    until a leaf, a race or a nested node produces an outcome.
//! 2. **Unwind**: pop continuations in LIFO order. Each either transforms the
//!    outcome or hands back a new flow (`chain`, `recover`), in which case the
//!    interpreter descends again on the same stack.
//!
//! Only type-changing nodes recurse, through a nested [`interpret`] call.

use crate::concurrency;
use crate::continuation::{Stack, Step};
use crate::flow::Flow;
use crate::planner::{self, Plan};
use crate::schematic::type_name_of;
use rivulet_core::{BoxFuture, CancelScope, Outcome, Value};
use tracing::Instrument;

/// Run `flow` to its terminal outcome under `scope`.
///
/// Failures of user callbacks never escape as panics or errors; they are
/// reported through [`Outcome::Failure`].
pub async fn execute<T: Value>(flow: &Flow<T>, scope: &CancelScope) -> Outcome<T> {
    let span = tracing::debug_span!(
        "flow.execute",
        root = ?flow.kind(),
        value = %type_name_of::<T>(),
    );
    async move {
        let outcome = interpret(flow.clone(), scope).await;
        match &outcome {
            Outcome::Success(_) => tracing::debug!("flow succeeded"),
            Outcome::Failure(err) => tracing::debug!(error = %err, kind = ?err.kind(), "flow failed"),
        }
        outcome
    }
    .instrument(span)
    .await
}

/// One interpreter loop with its own continuation stack.
pub(crate) fn interpret<'a, T: Value>(root: Flow<T>, scope: &'a CancelScope) -> BoxFuture<'a, Outcome<T>> {
    Box::pin(async move {
        let mut stack: Stack<T> = Vec::new();
        let mut flow = root;
        'descend: loop {
            let mut outcome = descend(flow, &mut stack, scope).await;
            while let Some(continuation) = stack.pop() {
                match continuation.apply(outcome, scope).await {
                    Step::Resume(next) => outcome = next,
                    Step::Push(next) => {
                        tracing::trace!(kind = ?next.kind(), depth = stack.len(), "continuation produced a flow");
                        flow = next;
                        continue 'descend;
                    }
                }
            }
            return outcome;
        }
    })
}

async fn descend<T: Value>(mut flow: Flow<T>, stack: &mut Stack<T>, scope: &CancelScope) -> Outcome<T> {
    loop {
        match planner::plan(flow.node()) {
            Plan::Settle(outcome) => return outcome,
            Plan::Produce(producer) => return producer.invoke((), scope).await.into(),
            Plan::Link(upstream, continuation) => {
                stack.push(continuation);
                flow = upstream;
            }
            Plan::Race(branches) => return concurrency::race(branches.to_vec(), scope).await,
            Plan::Nest(nested) => match nested.descend(&mut *stack, scope).await {
                Step::Resume(outcome) => return outcome,
                Step::Push(next) => flow = next,
            },
        }
    }
}
