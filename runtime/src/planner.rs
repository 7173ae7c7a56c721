//! Maps flow nodes onto the interpreter's work items.
//!
//! Two decisions live here. At build time, [`select`] and [`chain`] decide
//! whether an operator can be linked into its upstream's chain (input and output
//! types agree) or must be nested. At run time, [`plan`] tells the interpreter
//! what to do with the node it is standing on.

use crate::continuation::Continuation;
use crate::flow::{Flow, Node, Operator};
use crate::nested::{Nested, NestedChain, NestedSelect};
use rivulet_core::{Callback, Outcome, Value};
use std::any::Any;

pub(crate) enum Plan<'n, T: Value> {
    /// The outcome is known without running anything.
    Settle(Outcome<T>),
    /// Invoke a leaf producer.
    Produce(&'n Callback<(), T>),
    /// Push the continuation, then descend into the upstream.
    Link(Flow<T>, Box<dyn Continuation<T>>),
    /// Race these branches.
    Race(&'n [Flow<T>]),
    /// Hand evaluation to a nested node.
    Nest(&'n dyn Nested<T>),
}

pub(crate) fn plan<T: Value>(node: &Node<T>) -> Plan<'_, T> {
    match node {
        Node::Succeed(value) => Plan::Settle(Outcome::Success(value.clone())),
        Node::Fail(err) => Plan::Settle(Outcome::Failure(err.clone())),
        Node::Create(producer) => Plan::Produce(producer),
        Node::Linked { upstream, op } => Plan::Link(upstream.clone(), Box::new(op.clone())),
        Node::Any(branches) => Plan::Race(branches.as_slice()),
        Node::Nested(nested) => Plan::Nest(nested.as_ref()),
    }
}

pub(crate) fn select<A: Value, T: Value>(upstream: Flow<A>, selector: Callback<A, T>) -> Flow<T> {
    match retype::<_, (Flow<T>, Callback<T, T>)>((upstream, selector)) {
        Ok((upstream, selector)) => Flow::linked(upstream, Operator::Select(selector)),
        Err((upstream, selector)) => Flow::nested(NestedSelect::new(upstream, selector)),
    }
}

pub(crate) fn chain<A: Value, T: Value>(
    upstream: Flow<A>,
    next: Callback<A, Flow<T>>,
) -> Flow<T> {
    match retype::<_, (Flow<T>, Callback<T, Flow<T>>)>((upstream, next)) {
        Ok((upstream, next)) => Flow::linked(upstream, Operator::Chain(next)),
        Err((upstream, next)) => Flow::nested(NestedChain::new(upstream, next)),
    }
}

/// `Ok` with the value re-typed when `A` and `B` are the same type.
fn retype<A: 'static, B: 'static>(value: A) -> Result<B, A> {
    let mut slot = Some(value);
    if let Some(same) = (&mut slot as &mut dyn Any).downcast_mut::<Option<B>>() {
        if let Some(value) = same.take() {
            return Ok(value);
        }
    }
    match slot {
        Some(value) => Err(value),
        None => unreachable!("the slot is only emptied by a successful cast"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::NodeKind;

    fn is_linked<T: Value>(flow: &Flow<T>) -> bool {
        matches!(flow.node(), Node::Linked { .. })
    }

    #[test]
    fn test_same_type_select_is_linked() {
        let flow = Flow::succeed(1u32).select(|v| Ok(v + 1));
        assert!(is_linked(&flow));
        assert_eq!(flow.kind(), NodeKind::Select);
    }

    #[test]
    fn test_type_changing_select_is_nested() {
        let flow = Flow::succeed(1u32).select(|v| Ok(v.to_string()));
        assert!(!is_linked(&flow));
        assert_eq!(flow.kind(), NodeKind::Select);
    }

    #[test]
    fn test_chain_linking_follows_types() {
        let same = Flow::succeed(1u32).chain(|v| Ok(Flow::succeed(v * 2)));
        let changed = Flow::succeed(1u32).chain(|v| Ok(Flow::succeed(i64::from(v))));
        assert!(is_linked(&same));
        assert!(!is_linked(&changed));
    }

    #[test]
    fn test_retype() {
        assert_eq!(retype::<u32, u32>(5), Ok(5));
        assert_eq!(retype::<u32, u64>(5), Err(5));
    }
}
