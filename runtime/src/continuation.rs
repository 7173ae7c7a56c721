//! Pending work recorded while the interpreter descends a flow.
//!
//! When the interpreter meets an operator it pushes a continuation and keeps
//! descending into the upstream. Once a terminal outcome is known the stack is
//! unwound, each continuation turning the outcome into either the next outcome
//! or a new flow to evaluate.

use crate::flow::{Flow, Operator};
use rivulet_core::{BoxFuture, Callback, CancelScope, FlowError, Outcome, Value};

/// The continuation stack of one interpreter loop.
pub(crate) type Stack<T> = Vec<Box<dyn Continuation<T>>>;

/// What the interpreter does after a continuation or nested node ran.
pub(crate) enum Step<T: Value> {
    /// Keep unwinding with this outcome.
    Resume(Outcome<T>),
    /// Descend into this flow; its outcome feeds the remaining stack.
    Push(Flow<T>),
}

pub(crate) trait Continuation<T: Value>: Send {
    fn apply<'a>(self: Box<Self>, outcome: Outcome<T>, scope: &'a CancelScope)
    -> BoxFuture<'a, Step<T>>;
}

impl<T: Value> Continuation<T> for Operator<T> {
    fn apply<'a>(
        self: Box<Self>,
        outcome: Outcome<T>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>> {
        Box::pin(async move {
            match *self {
                Operator::Select(selector) => {
                    Step::Resume(select(&selector, outcome, scope).await)
                }
                Operator::Chain(next) => chain(&next, outcome, scope).await,
                Operator::DoOnSuccess(effect) => {
                    Step::Resume(do_on_success(&effect, outcome, scope).await)
                }
                Operator::DoOnFailure(effect) => {
                    Step::Resume(do_on_failure(&effect, outcome, scope).await)
                }
                Operator::Validate { predicate, error } => {
                    Step::Resume(validate(&predicate, &error, outcome, scope).await)
                }
                Operator::Recover(handler) => recover(&handler, outcome, scope).await,
            }
        })
    }
}

pub(crate) async fn select<A: Value, T: Value>(
    selector: &Callback<A, T>,
    outcome: Outcome<A>,
    scope: &CancelScope,
) -> Outcome<T> {
    match outcome {
        Outcome::Success(value) => selector.invoke(value, scope).await.into(),
        Outcome::Failure(err) => Outcome::Failure(err),
    }
}

pub(crate) async fn chain<A: Value, T: Value>(
    next: &Callback<A, Flow<T>>,
    outcome: Outcome<A>,
    scope: &CancelScope,
) -> Step<T> {
    match outcome {
        Outcome::Success(value) => match next.invoke(value, scope).await {
            Ok(flow) => Step::Push(flow),
            Err(err) => Step::Resume(Outcome::Failure(err)),
        },
        Outcome::Failure(err) => Step::Resume(Outcome::Failure(err)),
    }
}

async fn do_on_success<T: Value>(
    effect: &Callback<T, ()>,
    outcome: Outcome<T>,
    scope: &CancelScope,
) -> Outcome<T> {
    match outcome {
        Outcome::Success(value) => match effect.invoke(value.clone(), scope).await {
            Ok(()) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        },
        failure => failure,
    }
}

async fn do_on_failure<T: Value>(
    effect: &Callback<FlowError, ()>,
    outcome: Outcome<T>,
    scope: &CancelScope,
) -> Outcome<T> {
    if let Outcome::Failure(err) = &outcome {
        if let Err(observer) = effect.invoke(err.clone(), scope).await {
            tracing::warn!(error = %observer, original = %err, "failure observer raised; keeping the original failure");
        }
    }
    outcome
}

async fn validate<T: Value>(
    predicate: &Callback<T, bool>,
    error: &Callback<T, FlowError>,
    outcome: Outcome<T>,
    scope: &CancelScope,
) -> Outcome<T> {
    let Outcome::Success(value) = outcome else {
        return outcome;
    };
    match predicate.invoke(value.clone(), scope).await {
        Ok(true) => Outcome::Success(value),
        Ok(false) => match error.invoke(value, scope).await {
            Ok(err) | Err(err) => Outcome::Failure(err),
        },
        Err(err) => Outcome::Failure(err),
    }
}

async fn recover<T: Value>(
    handler: &Callback<FlowError, Flow<T>>,
    outcome: Outcome<T>,
    scope: &CancelScope,
) -> Step<T> {
    match outcome {
        Outcome::Failure(err) => match handler.invoke(err, scope).await {
            Ok(fallback) => Step::Push(fallback),
            Err(err) => Step::Resume(Outcome::Failure(err)),
        },
        success => Step::Resume(success),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resumed<T: Value>(step: Step<T>) -> Outcome<T> {
        match step {
            Step::Resume(outcome) => outcome,
            Step::Push(_) => panic!("expected the continuation to resume"),
        }
    }

    #[tokio::test]
    async fn test_select_skips_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let op = Box::new(Operator::Select(Callback::sync(move |v: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v + 1)
        })));

        let outcome = resumed(
            op.apply(Outcome::Failure(FlowError::Cancelled), &CancelScope::new())
                .await,
        );
        assert!(outcome.error().is_some_and(FlowError::is_cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_observer_errors_are_swallowed() {
        let op = Box::new(Operator::<u32>::DoOnFailure(Callback::sync(|_| {
            Err(anyhow::anyhow!("observer broke"))
        })));
        let outcome = resumed(
            op.apply(
                Outcome::Failure(FlowError::callback(anyhow::anyhow!("original"))),
                &CancelScope::new(),
            )
            .await,
        );
        assert_eq!(outcome.error().map(ToString::to_string).as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn test_validate_uses_error_factory() {
        let op = Box::new(Operator::Validate {
            predicate: Callback::sync(|v: u32| Ok(v > 10)),
            error: Callback::sync(|v: u32| {
                Ok(FlowError::callback(anyhow::anyhow!("{v} is too small")))
            }),
        });
        let outcome = resumed(op.apply(Outcome::Success(3), &CancelScope::new()).await);
        assert_eq!(
            outcome.error().map(ToString::to_string).as_deref(),
            Some("3 is too small")
        );
    }

    #[tokio::test]
    async fn test_validate_predicate_errors_become_the_failure() {
        let never_called = Callback::sync(|_: u32| -> anyhow::Result<FlowError> {
            panic!("the error factory only runs for a false predicate")
        });
        let failing = Box::new(Operator::Validate {
            predicate: Callback::sync(|_: u32| Err(anyhow::anyhow!("rule store offline"))),
            error: never_called.clone(),
        });
        let outcome = resumed(failing.apply(Outcome::Success(3), &CancelScope::new()).await);
        assert!(matches!(outcome.error(), Some(FlowError::Callback(_))));
        assert_eq!(
            outcome.error().map(ToString::to_string).as_deref(),
            Some("rule store offline")
        );

        let panicking = Box::new(Operator::Validate {
            predicate: Callback::sync(|_: u32| -> anyhow::Result<bool> { panic!("bad rule") }),
            error: never_called,
        });
        let outcome = resumed(panicking.apply(Outcome::Success(3), &CancelScope::new()).await);
        assert!(matches!(outcome.error(), Some(FlowError::Panicked(msg)) if msg == "bad rule"));
    }

    #[tokio::test]
    async fn test_recover_pushes_fallback() {
        let op = Box::new(Operator::Recover(Callback::sync(|_| Ok(Flow::succeed(7u32)))));
        let step = op
            .apply(Outcome::Failure(FlowError::Cancelled), &CancelScope::new())
            .await;
        assert!(matches!(step, Step::Push(_)));
    }
}
