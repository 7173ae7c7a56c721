use crate::flow::Flow;
use rivulet_core::{NodeKind, Value};

/// A named, user-supplied rewrite.
///
/// Override the hooks for the node kinds you care about; the rest pass the
/// flow through unchanged. [`Flow::with_behaviour`] calls [`Behaviour::apply`]
/// once, which dispatches on the kind of the node it was applied to. Whether
/// to reach further into the graph is up to the hook.
///
/// ```rust,ignore
/// struct Audit;
///
/// impl Behaviour for Audit {
///     fn name(&self) -> &str {
///         "audit"
///     }
///
///     fn on_create<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
///         flow.do_on_success(|_| {
///             tracing::info!("produced");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Behaviour: Send + Sync {
    fn name(&self) -> &str;

    fn on_succeed<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_fail<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_create<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_select<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_chain<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_do_on_success<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_do_on_failure<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_validate<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_recover<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_all<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_any<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_with_resource<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn on_deadline<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
        flow
    }

    fn apply<T: Value>(&self, flow: Flow<T>) -> Flow<T>
    where
        Self: Sized,
    {
        match flow.kind() {
            NodeKind::Succeed => self.on_succeed(flow),
            NodeKind::Fail => self.on_fail(flow),
            NodeKind::Create => self.on_create(flow),
            NodeKind::Select => self.on_select(flow),
            NodeKind::Chain => self.on_chain(flow),
            NodeKind::DoOnSuccess => self.on_do_on_success(flow),
            NodeKind::DoOnFailure => self.on_do_on_failure(flow),
            NodeKind::Validate => self.on_validate(flow),
            NodeKind::Recover => self.on_recover(flow),
            NodeKind::All => self.on_all(flow),
            NodeKind::Any => self.on_any(flow),
            NodeKind::WithResource => self.on_with_resource(flow),
            NodeKind::Deadline => self.on_deadline(flow),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::CancelScope;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        applied: AtomicUsize,
    }

    impl Behaviour for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_select<T: Value>(&self, flow: Flow<T>) -> Flow<T> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            flow
        }
    }

    #[tokio::test]
    async fn test_dispatches_once_on_root_kind() {
        let behaviour = Counting::default();
        let flow = Flow::succeed(1u32)
            .select(|v| Ok(v + 1))
            .select(|v| Ok(v * 2))
            .with_behaviour(&behaviour);

        assert_eq!(behaviour.applied.load(Ordering::SeqCst), 1);
        assert_eq!(flow.run(&CancelScope::new()).await.into_value(), Some(4));
    }

    #[test]
    fn test_unhandled_kinds_pass_through() {
        let behaviour = Counting::default();
        let flow = Flow::all(vec![Flow::succeed(1u32)]).with_behaviour(&behaviour);
        assert_eq!(flow.kind(), NodeKind::All);
        assert_eq!(behaviour.applied.load(Ordering::SeqCst), 0);
    }
}
