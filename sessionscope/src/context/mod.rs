//! The execution-context tree.

mod builder;
mod execution;
mod scope;


pub use builder::ExecutionContextBuilder;
pub use execution::ExecutionContext;
pub use scope::{ContextScope, StartScopes};
