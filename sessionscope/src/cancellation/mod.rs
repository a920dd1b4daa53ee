//! Cooperative cancellation for suspending session operations.
//!
//! Every operation that may wait (borrowing, pool checkout, pool fill) takes a
//! [`CancellationToken`] and checks it between poll attempts. Each execution
//! context owns a child token of its parent's, so tearing down a suite aborts
//! the waits of all its tests.

mod token;

pub use token::{CancelCallback, CancellationToken};
