//! Nodes whose upstream carries a different value type.
//!
//! The interpreter's stack holds continuations for a single value type, so a
//! `select` or `chain` from `A` to `T` cannot be linked into it. Such nodes are
//! stored behind the [`Nested`] trait object and evaluate their upstream with a
//! nested interpreter run. Composites and resource scopes use the same seam.

use crate::behaviour::{self, Strategy};
use crate::continuation::{self, Stack, Step};
use crate::flow::Flow;
use crate::interpreter::interpret;
use crate::schematic::Inspect;
use rivulet_core::{BoxFuture, Callback, CancelScope, EdgeType, NodeKind, Value};
use std::sync::Arc;

pub(crate) trait Nested<T: Value>: Send + Sync + 'static {
    fn kind(&self) -> NodeKind;

    /// Evaluate the node. Implementations may push continuations that must run
    /// after the returned step, regardless of how it ends.
    fn descend<'a>(
        &'a self,
        stack: &'a mut Stack<T>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>>;

    /// A copy of this node with `strategy` applied beneath it.
    fn rewrite(&self, strategy: &Strategy) -> Arc<dyn Nested<T>>;

    /// Statically known inputs, for schematic export.
    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)>;
}

pub(crate) struct NestedSelect<A: Value, T: Value> {
    upstream: Flow<A>,
    selector: Callback<A, T>,
}

impl<A: Value, T: Value> NestedSelect<A, T> {
    pub(crate) fn new(upstream: Flow<A>, selector: Callback<A, T>) -> Self {
        Self { upstream, selector }
    }
}

impl<A: Value, T: Value> Nested<T> for NestedSelect<A, T> {
    fn kind(&self) -> NodeKind {
        NodeKind::Select
    }

    fn descend<'a>(
        &'a self,
        _stack: &'a mut Stack<T>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>> {
        Box::pin(async move {
            let upstream = interpret(self.upstream.clone(), scope).await;
            Step::Resume(continuation::select(&self.selector, upstream, scope).await)
        })
    }

    fn rewrite(&self, strategy: &Strategy) -> Arc<dyn Nested<T>> {
        Arc::new(Self {
            upstream: behaviour::rewrite(&self.upstream, strategy),
            selector: self.selector.clone(),
        })
    }

    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)> {
        vec![(EdgeType::Nested, Box::new(self.upstream.clone()) as Box<dyn Inspect>)]
    }
}

pub(crate) struct NestedChain<A: Value, T: Value> {
    upstream: Flow<A>,
    next: Callback<A, Flow<T>>,
}

impl<A: Value, T: Value> NestedChain<A, T> {
    pub(crate) fn new(upstream: Flow<A>, next: Callback<A, Flow<T>>) -> Self {
        Self { upstream, next }
    }
}

impl<A: Value, T: Value> Nested<T> for NestedChain<A, T> {
    fn kind(&self) -> NodeKind {
        NodeKind::Chain
    }

    fn descend<'a>(
        &'a self,
        _stack: &'a mut Stack<T>,
        scope: &'a CancelScope,
    ) -> BoxFuture<'a, Step<T>> {
        Box::pin(async move {
            let upstream = interpret(self.upstream.clone(), scope).await;
            // A pushed flow has type `T`, so it continues on the caller's stack.
            continuation::chain(&self.next, upstream, scope).await
        })
    }

    fn rewrite(&self, strategy: &Strategy) -> Arc<dyn Nested<T>> {
        Arc::new(Self {
            upstream: behaviour::rewrite(&self.upstream, strategy),
            next: behaviour::rewrite_produced(&self.next, strategy),
        })
    }

    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)> {
        vec![(EdgeType::Nested, Box::new(self.upstream.clone()) as Box<dyn Inspect>)]
    }
}
