//! # Flow: Immutable Computation Graph
//!
//! A [`Flow`] describes a computation without running it. Flows are built by
//! composing the constructors below and handed to [`execute`](crate::execute);
//! they carry no execution state and can be run any number of times, shared
//! between tasks, and decorated by behaviours without being modified.
//!
//! Same-type operators are stored as [`Node::Linked`] chains that the
//! interpreter walks with an explicit stack. Operators that change the value
//! type, and composites with a different result type, sit behind the
//! [`Nested`] seam and are evaluated as nested executions.

use crate::behaviour::{self, Behaviour, Strategy};
use crate::concurrency::Join;
use crate::interpreter;
use crate::nested::Nested;
use crate::planner;
use crate::resource::{Resource, ResourceScope};
use crate::schematic;
use rivulet_core::{
    BehaviourConfig, Callback, CancelScope, ConfigError, FlowError, NodeKind, Outcome,
    RetryPolicy, Schematic, TimeoutPolicy, Value,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// An immutable, reusable description of a computation producing `T`.
pub struct Flow<T: Value> {
    node: Arc<Node<T>>,
}

pub(crate) enum Node<T: Value> {
    Succeed(T),
    Fail(FlowError),
    Create(Callback<(), T>),
    /// A same-type operator applied to the outcome of `upstream`.
    Linked {
        upstream: Flow<T>,
        op: Operator<T>,
    },
    Any(Vec<Flow<T>>),
    /// Type-changing operators, `All`, resource scopes and deadlines.
    Nested(Arc<dyn Nested<T>>),
}

/// Operators whose input and output value types are the same.
#[derive(Clone)]
pub(crate) enum Operator<T: Value> {
    Select(Callback<T, T>),
    Chain(Callback<T, Flow<T>>),
    DoOnSuccess(Callback<T, ()>),
    DoOnFailure(Callback<FlowError, ()>),
    Validate {
        predicate: Callback<T, bool>,
        error: Callback<T, FlowError>,
    },
    Recover(Callback<FlowError, Flow<T>>),
}

impl<T: Value> Operator<T> {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Operator::Select(_) => NodeKind::Select,
            Operator::Chain(_) => NodeKind::Chain,
            Operator::DoOnSuccess(_) => NodeKind::DoOnSuccess,
            Operator::DoOnFailure(_) => NodeKind::DoOnFailure,
            Operator::Validate { .. } => NodeKind::Validate,
            Operator::Recover(_) => NodeKind::Recover,
        }
    }
}

impl<T: Value> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T: Value> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("kind", &self.kind())
            .field("value", &schematic::type_name_of::<T>())
            .finish()
    }
}

impl<T: Value> Drop for Flow<T> {
    fn drop(&mut self) {
        // Unlink uniquely owned chains iteratively; a recursive drop of a long
        // same-type chain would overflow the stack.
        let mut next = unlink(&mut self.node);
        while let Some(mut flow) = next {
            next = unlink(&mut flow.node);
        }
    }
}

fn unlink<T: Value>(node: &mut Arc<Node<T>>) -> Option<Flow<T>> {
    let node = Arc::get_mut(node)?;
    match std::mem::replace(node, Node::Fail(FlowError::Cancelled)) {
        Node::Linked { upstream, .. } => Some(upstream),
        _ => None,
    }
}

impl<T: Value> Flow<T> {
    pub(crate) fn from_node(node: Node<T>) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    pub(crate) fn node(&self) -> &Node<T> {
        &self.node
    }

    pub(crate) fn linked(upstream: Flow<T>, op: Operator<T>) -> Self {
        Self::from_node(Node::Linked { upstream, op })
    }

    pub(crate) fn nested(nested: impl Nested<T>) -> Self {
        Self::from_node(Node::Nested(Arc::new(nested)))
    }

    pub fn kind(&self) -> NodeKind {
        match self.node() {
            Node::Succeed(_) => NodeKind::Succeed,
            Node::Fail(_) => NodeKind::Fail,
            Node::Create(_) => NodeKind::Create,
            Node::Linked { op, .. } => op.kind(),
            Node::Any(_) => NodeKind::Any,
            Node::Nested(nested) => nested.kind(),
        }
    }

    /// Run this flow to its terminal outcome.
    pub async fn run(&self, scope: &CancelScope) -> Outcome<T> {
        interpreter::execute(self, scope).await
    }

    /// Export the static shape of this flow.
    pub fn schematic(&self, name: impl Into<String>) -> Schematic {
        schematic::export(self, name)
    }

    // --- Leaves ---

    pub fn succeed(value: T) -> Self {
        Self::from_node(Node::Succeed(value))
    }

    pub fn fail(err: impl Into<anyhow::Error>) -> Self {
        Self::from_node(Node::Fail(FlowError::callback(err)))
    }

    pub fn create<F>(producer: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::from_node(Node::Create(Callback::sync(move |()| producer())))
    }

    pub fn create_async<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_node(Node::Create(Callback::from_async(move |()| producer())))
    }

    /// The producer is skipped, failing with `Cancelled`, if the scope is
    /// already cancelled when the leaf is reached.
    pub fn create_cancellable<F, Fut>(producer: F) -> Self
    where
        F: Fn(CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_node(Node::Create(Callback::cancellable(move |(), scope| {
            producer(scope)
        })))
    }

    // --- Transforms ---

    pub fn select<U, F>(self, selector: F) -> Flow<U>
    where
        U: Value,
        F: Fn(T) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        planner::select(self, Callback::sync(selector))
    }

    pub fn select_async<U, F, Fut>(self, selector: F) -> Flow<U>
    where
        U: Value,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        planner::select(self, Callback::from_async(selector))
    }

    pub fn select_cancellable<U, F, Fut>(self, selector: F) -> Flow<U>
    where
        U: Value,
        F: Fn(T, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        planner::select(self, Callback::cancellable(selector))
    }

    /// Monadic bind: on success, run the flow returned by `next`.
    pub fn chain<U, F>(self, next: F) -> Flow<U>
    where
        U: Value,
        F: Fn(T) -> anyhow::Result<Flow<U>> + Send + Sync + 'static,
    {
        planner::chain(self, Callback::sync(next))
    }

    pub fn chain_async<U, F, Fut>(self, next: F) -> Flow<U>
    where
        U: Value,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow<U>>> + Send + 'static,
    {
        planner::chain(self, Callback::from_async(next))
    }

    pub fn chain_cancellable<U, F, Fut>(self, next: F) -> Flow<U>
    where
        U: Value,
        F: Fn(T, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow<U>>> + Send + 'static,
    {
        planner::chain(self, Callback::cancellable(next))
    }

    // --- Observers ---

    /// Observe a success. A failing effect turns the success into that failure.
    pub fn do_on_success<F>(self, effect: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let effect = Callback::sync(move |value: T| effect(&value));
        Self::linked(self, Operator::DoOnSuccess(effect))
    }

    pub fn do_on_success_async<F, Fut>(self, effect: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::linked(self, Operator::DoOnSuccess(Callback::from_async(effect)))
    }

    pub fn do_on_success_cancellable<F, Fut>(self, effect: F) -> Self
    where
        F: Fn(T, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::linked(self, Operator::DoOnSuccess(Callback::cancellable(effect)))
    }

    /// Observe a failure. Errors raised by the effect are logged and swallowed.
    pub fn do_on_failure<F>(self, effect: F) -> Self
    where
        F: Fn(&FlowError) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let effect = Callback::sync(move |err: FlowError| effect(&err));
        Self::linked(self, Operator::DoOnFailure(effect))
    }

    pub fn do_on_failure_async<F, Fut>(self, effect: F) -> Self
    where
        F: Fn(FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::linked(self, Operator::DoOnFailure(Callback::from_async(effect)))
    }

    pub fn do_on_failure_cancellable<F, Fut>(self, effect: F) -> Self
    where
        F: Fn(FlowError, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::linked(self, Operator::DoOnFailure(Callback::cancellable(effect)))
    }

    /// Turn a success into `error(&value)` when `predicate` returns `false`.
    pub fn validate<P, E>(self, predicate: P, error: E) -> Self
    where
        P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
        E: Fn(&T) -> anyhow::Error + Send + Sync + 'static,
    {
        Self::linked(
            self,
            Operator::Validate {
                predicate: Callback::sync(move |value: T| predicate(&value)),
                error: Callback::sync(move |value: T| Ok(FlowError::from(error(&value)))),
            },
        )
    }

    // --- Recovery ---

    /// On failure, continue with the flow returned by `handler`.
    pub fn recover<F>(self, handler: F) -> Self
    where
        F: Fn(FlowError) -> anyhow::Result<Flow<T>> + Send + Sync + 'static,
    {
        Self::linked(self, Operator::Recover(Callback::sync(handler)))
    }

    pub fn recover_async<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow<T>>> + Send + 'static,
    {
        Self::linked(self, Operator::Recover(Callback::from_async(handler)))
    }

    pub fn recover_cancellable<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(FlowError, CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow<T>>> + Send + 'static,
    {
        Self::linked(self, Operator::Recover(Callback::cancellable(handler)))
    }

    // --- Concurrency ---

    /// Race the branches; the first success wins and the losers are signalled.
    pub fn any(branches: impl IntoIterator<Item = Flow<T>>) -> Self {
        Self::from_node(Node::Any(branches.into_iter().collect()))
    }

    // --- Resources ---

    /// Acquire a resource, run the flow built by `body`, and dispose the
    /// resource exactly once on every exit path. Nested scopes dispose
    /// innermost first.
    pub fn with_resource<R, A, F>(acquire: A, body: F) -> Self
    where
        R: Resource,
        A: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
        F: Fn(Arc<R>) -> anyhow::Result<Flow<T>> + Send + Sync + 'static,
    {
        Self::scoped(Callback::sync(move |()| acquire()), body)
    }

    pub fn with_resource_async<R, A, Fut, F>(acquire: A, body: F) -> Self
    where
        R: Resource,
        A: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        F: Fn(Arc<R>) -> anyhow::Result<Flow<T>> + Send + Sync + 'static,
    {
        Self::scoped(Callback::from_async(move |()| acquire()), body)
    }

    /// Acquisition is skipped, failing with `Cancelled`, if the scope is
    /// already cancelled. Nothing is disposed in that case.
    pub fn with_resource_cancellable<R, A, Fut, F>(acquire: A, body: F) -> Self
    where
        R: Resource,
        A: Fn(CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        F: Fn(Arc<R>) -> anyhow::Result<Flow<T>> + Send + Sync + 'static,
    {
        Self::scoped(Callback::cancellable(move |(), scope| acquire(scope)), body)
    }

    fn scoped<R, F>(acquire: Callback<(), R>, body: F) -> Self
    where
        R: Resource,
        F: Fn(Arc<R>) -> anyhow::Result<Flow<T>> + Send + Sync + 'static,
    {
        Self::nested(ResourceScope::new(acquire, Callback::sync(body)))
    }

    // --- Behaviours ---

    /// Re-run leaf producers on failure, up to the policy's attempt limit.
    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        behaviour::rewrite(&self, &Strategy::Retry(policy))
    }

    /// Race leaf producers (or a whole composite) against a deadline.
    pub fn with_timeout(self, policy: TimeoutPolicy) -> Self {
        behaviour::rewrite(&self, &Strategy::Timeout(policy))
    }

    /// Apply a custom behaviour once, at this node.
    pub fn with_behaviour<B: Behaviour>(self, behaviour: &B) -> Self {
        tracing::debug!(behaviour = behaviour.name(), kind = ?self.kind(), "applying behaviour");
        behaviour.apply(self)
    }

    /// Apply the timeout (per leaf attempt) and then the retry from `config`.
    pub fn with_config(self, config: &BehaviourConfig) -> Result<Self, ConfigError> {
        let mut flow = self;
        if let Some(timeout) = config.timeout_policy()? {
            flow = flow.with_timeout(timeout);
        }
        if let Some(retry) = config.retry_policy()? {
            flow = flow.with_retry(retry);
        }
        Ok(flow)
    }
}

impl<T: Value> Flow<Vec<T>> {
    /// Run every branch concurrently and collect the values in declaration order.
    pub fn all(branches: impl IntoIterator<Item = Flow<T>>) -> Self {
        Self::nested(Join::new(branches.into_iter().collect()))
    }
}
