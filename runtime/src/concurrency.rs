//! `All` and `Any`: running branches concurrently.
//!
//! Every branch is spawned as its own task running a fresh interpreter loop.
//! Branch handles are never aborted: a race loser or an abandoned branch is
//! detached and runs to completion, so resource scopes inside it still dispose.

use crate::behaviour::{self, Strategy};
use crate::continuation::{Stack, Step};
use crate::flow::Flow;
use crate::interpreter::interpret;
use crate::nested::Nested;
use crate::schematic::Inspect;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use rivulet_core::{BoxFuture, CancelScope, EdgeType, FlowError, NodeKind, Outcome, Value};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

/// Run every branch and collect values in declaration order.
pub(crate) struct Join<T: Value> {
    branches: Vec<Flow<T>>,
}

impl<T: Value> Join<T> {
    pub(crate) fn new(branches: Vec<Flow<T>>) -> Self {
        Self { branches }
    }
}

impl<T: Value> Nested<Vec<T>> for Join<T> {
    fn kind(&self) -> NodeKind {
        NodeKind::All
    }

    fn descend<'a>(
        &'a self,
        _stack: &'a mut Stack<Vec<T>>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<Vec<T>>> {
        Box::pin(async move { Step::Resume(join(&self.branches, scope).await) })
    }

    fn rewrite(&self, strategy: &Strategy) -> Arc<dyn Nested<Vec<T>>> {
        let branches = self
            .branches
            .iter()
            .map(|branch| behaviour::rewrite(branch, strategy))
            .collect();
        Arc::new(Self { branches })
    }

    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)> {
        self.branches
            .iter()
            .enumerate()
            .map(|(idx, branch)| (EdgeType::Branch(idx), Box::new(branch.clone()) as Box<dyn Inspect>))
            .collect()
    }
}

async fn join<T: Value>(branches: &[Flow<T>], scope: &CancelScope) -> Outcome<Vec<T>> {
    tracing::debug!(branches = branches.len(), "joining branches");
    let handles: Vec<_> = branches
        .iter()
        .map(|branch| spawn_branch(branch.clone(), scope.clone()))
        .collect();

    let mut values = Vec::with_capacity(handles.len());
    let mut failures = Vec::new();
    for settled in futures_util::future::join_all(handles).await {
        match settle_branch(settled) {
            Outcome::Success(value) => values.push(value),
            Outcome::Failure(err) => failures.push(err),
        }
    }

    if failures.is_empty() {
        Outcome::Success(values)
    } else {
        tracing::debug!(failed = failures.len(), "join failed");
        Outcome::Failure(FlowError::Aggregate(failures))
    }
}

/// Race the branches; the first success wins and cancels the rest.
pub(crate) fn race<T: Value>(branches: Vec<Flow<T>>, scope: &CancelScope) -> BoxFuture<'_, Outcome<T>> {
    Box::pin(async move {
        // Losers are signalled through a derived scope so the caller's scope
        // is left untouched.
        let race_scope = scope.child();
        let mut failures: Vec<Option<FlowError>> = vec![None; branches.len()];
        let mut pending = FuturesUnordered::new();

        for (idx, branch) in branches.into_iter().enumerate() {
            if race_scope.is_cancelled() {
                failures[idx] = Some(FlowError::Cancelled);
                continue;
            }
            let handle = spawn_branch(branch, race_scope.clone());
            pending.push(async move { (idx, settle_branch(handle.await)) });
        }

        while let Some((idx, outcome)) = pending.next().await {
            match outcome {
                Outcome::Success(value) => {
                    tracing::debug!(winner = idx, "race settled");
                    race_scope.cancel();
                    return Outcome::Success(value);
                }
                Outcome::Failure(err) => {
                    tracing::trace!(branch = idx, error = %err, "race branch failed");
                    failures[idx] = Some(err);
                }
            }
        }

        tracing::debug!("every race branch failed");
        Outcome::Failure(FlowError::Aggregate(failures.into_iter().flatten().collect()))
    })
}

fn spawn_branch<T: Value>(branch: Flow<T>, scope: CancelScope) -> JoinHandle<Outcome<T>> {
    tokio::spawn(async move { interpret(branch, &scope).await })
}

fn settle_branch<T>(joined: Result<Outcome<T>, JoinError>) -> Outcome<T> {
    match joined_task(joined) {
        Ok(outcome) => outcome,
        Err(err) => Outcome::Failure(err),
    }
}

/// Map a task's join result, reporting a panic as [`FlowError::Panicked`].
pub(crate) fn joined_task<O>(joined: Result<O, JoinError>) -> Result<O, FlowError> {
    joined.map_err(|err| {
        if err.is_panic() {
            FlowError::from_panic(err.into_panic())
        } else {
            FlowError::Cancelled
        }
    })
}
