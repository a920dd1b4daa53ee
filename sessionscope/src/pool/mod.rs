//! Bounded pools of interchangeable sessions.

mod container;
mod options;
#[allow(clippy::module_inception)]
mod pool;

#[cfg(test)]
mod pool_tests;

pub use container::SessionPoolContainer;
pub use options::PoolOptions;
pub use pool::{PoolKey, SessionPool};
