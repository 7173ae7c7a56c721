//! Rivulet facade crate.
//!
//! Re-exports the core vocabulary and the runtime behind a single entry point,
//! plus a development tracing setup.

pub use rivulet_core as core;
pub use rivulet_runtime as runtime;

pub use rivulet_core::{
    BehaviourConfig, Callback, CancelScope, ConfigError, ErrorKind, FlowError, Outcome,
    RetryPolicy, Schematic, TimeoutPolicy, Value,
};
pub use rivulet_runtime::{Behaviour, Flow, Resource, execute};

pub mod prelude {
    pub use rivulet_core::prelude::*;
    pub use rivulet_runtime::prelude::*;
}

use tracing_subscriber::EnvFilter;

/// Initialize a stdout tracing subscriber for development.
///
/// `RUST_LOG` takes precedence over the default filter.
pub fn init_stdout_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rivulet_runtime=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
