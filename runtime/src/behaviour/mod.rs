//! # Behaviours: Rewriting Flow Graphs
//!
//! A behaviour produces a new flow with extra semantics woven into its nodes.
//! The input flow is never modified.
//!
//! The built-in strategies act on leaf producers: retry re-runs a failing
//! `create` callback, timeout races it against a deadline. Above the leaves the
//! rewrite descends transitively:
//!
//! - same-type links are rebuilt around the rewritten upstream,
//! - flows produced at run time by `chain`, `recover` and resource bodies are
//!   rewritten as they are produced,
//! - composites rewrite each branch (retry) or are raced as a whole (timeout).
//!
//! Walking the linked spine is iterative, so very long chains can be rewritten.

mod custom;
mod retry;
mod timeout;

pub use custom::Behaviour;

use crate::flow::{Flow, Node, Operator};
use rivulet_core::{Callback, RetryPolicy, TimeoutPolicy, Value};

/// A built-in rewrite.
#[derive(Debug, Clone)]
pub(crate) enum Strategy {
    Retry(RetryPolicy),
    Timeout(TimeoutPolicy),
}

impl Strategy {
    fn wrap_producer<T: Value>(&self, producer: &Callback<(), T>) -> Callback<(), T> {
        match self {
            Strategy::Retry(policy) => retry::wrap(producer.clone(), policy.clone()),
            Strategy::Timeout(policy) => timeout::wrap(producer.clone(), *policy),
        }
    }
}

/// Apply `strategy` to every node reachable from `flow`.
pub(crate) fn rewrite<T: Value>(flow: &Flow<T>, strategy: &Strategy) -> Flow<T> {
    let mut links = Vec::new();
    let mut base = flow;
    while let Node::Linked { upstream, op } = base.node() {
        links.push(op);
        base = upstream;
    }

    let mut rebuilt = rewrite_base(base, strategy);
    for op in links.into_iter().rev() {
        rebuilt = Flow::linked(rebuilt, relink(op, strategy));
    }
    rebuilt
}

/// Rewrite the flows a callback produces, as they are produced.
pub(crate) fn rewrite_produced<A, T>(
    produce: &Callback<A, Flow<T>>,
    strategy: &Strategy,
) -> Callback<A, Flow<T>>
where
    A: Send + 'static,
    T: Value,
{
    let strategy = strategy.clone();
    produce.map_output(move |flow| rewrite(&flow, &strategy))
}

fn rewrite_base<T: Value>(flow: &Flow<T>, strategy: &Strategy) -> Flow<T> {
    match (flow.node(), strategy) {
        (Node::Create(producer), _) => Flow::from_node(Node::Create(strategy.wrap_producer(producer))),
        (Node::Any(_), Strategy::Timeout(policy)) => timeout::guard(flow.clone(), *policy),
        (Node::Any(branches), Strategy::Retry(_)) => {
            Flow::any(branches.iter().map(|branch| rewrite(branch, strategy)))
        }
        (Node::Nested(nested), Strategy::Timeout(policy)) if nested.kind().is_composite() => {
            timeout::guard(flow.clone(), *policy)
        }
        (Node::Nested(nested), _) => Flow::from_node(Node::Nested(nested.rewrite(strategy))),
        // Constants have nothing to wrap.
        (Node::Succeed(_) | Node::Fail(_), _) => flow.clone(),
        (Node::Linked { .. }, _) => rewrite(flow, strategy),
    }
}

fn relink<T: Value>(op: &Operator<T>, strategy: &Strategy) -> Operator<T> {
    match op {
        Operator::Chain(next) => Operator::Chain(rewrite_produced(next, strategy)),
        Operator::Recover(handler) => Operator::Recover(rewrite_produced(handler, strategy)),
        other => other.clone(),
    }
}
