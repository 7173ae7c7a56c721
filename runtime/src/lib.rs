//! Rivulet Runtime - builds and runs flow graphs.
//!
//! A [`Flow`] is an immutable graph of effects. [`execute`] walks it with a
//! trampoline interpreter, so long operator chains never grow the call stack.
//! `All` and `Any` run their branches concurrently, resource scopes guarantee
//! disposal, and behaviours (retry, timeout, custom) rewrite a flow into a new one.

pub mod behaviour;
mod concurrency;
mod continuation;
pub mod flow;
pub mod interpreter;
mod nested;
mod planner;
pub mod resource;
mod schematic;

pub mod prelude {
    pub use crate::behaviour::Behaviour;
    pub use crate::flow::Flow;
    pub use crate::interpreter::execute;
    pub use crate::resource::Resource;
}

pub use behaviour::Behaviour;
pub use flow::Flow;
pub use interpreter::execute;
pub use resource::Resource;
