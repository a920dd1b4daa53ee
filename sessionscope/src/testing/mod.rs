//! Testing utilities for session-managing code.
//!
//! This module provides:
//! - Mock resources with start/stop counters
//! - Ready-made context trees

mod fixtures;
mod mocks;

pub use fixtures::{quick_wait, ContextTree};
pub use mocks::{MockResource, ResourceProbe};
