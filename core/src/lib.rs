//! Rivulet Core - the vocabulary shared by every flow.
//!
//! This crate holds the data the engine passes around but never the engine
//! itself: the terminal [`Outcome`], the [`FlowError`] taxonomy, the
//! [`CancelScope`] threaded through an execution, the [`Callback`] shapes user
//! code is stored in, and the validated behaviour policies.

pub mod callback;
pub mod cancel;
pub mod config;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod schematic;

pub use callback::{BoxFuture, Callback, CallbackShape};
pub use cancel::CancelScope;
pub use config::{BehaviourConfig, RetrySettings};
pub use error::{ConfigError, ErrorKind, FlowError};
pub use outcome::Outcome;
pub use policy::{RetryPolicy, TimeoutPolicy};
pub use schematic::{EdgeType, NodeKind, Schematic};

/// Values carried by flows: shareable across tasks and reusable across runs.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

pub mod prelude {
    pub use crate::{
        BehaviourConfig, CancelScope, ConfigError, ErrorKind, FlowError, Outcome, RetryPolicy,
        TimeoutPolicy, Value,
    };
}
