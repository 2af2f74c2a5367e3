//! Owning handles over native runtime and context state.

pub mod context;
pub mod runtime;

pub use context::NativeContext;
pub use runtime::{NativeRuntime, RuntimeHandle};
