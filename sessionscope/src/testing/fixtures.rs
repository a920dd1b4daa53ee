//! Ready-made context trees for tests.

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::context::{ContextScope, ExecutionContext, ExecutionContextBuilder};
use crate::errors::Result;
use crate::wait::WaitOptions;

/// Wait options short enough for tests: 500ms budget, 10ms interval.
#[must_use]
pub const fn quick_wait() -> WaitOptions {
    WaitOptions {
        timeout_ms: 500,
        retry_interval_ms: 10,
    }
}

/// A three-level global / suite / test chain.
#[derive(Debug, Clone)]
pub struct ContextTree {
    /// The root context.
    pub global: Arc<ExecutionContext>,
    /// A suite under the root.
    pub suite: Arc<ExecutionContext>,
    /// A test under the suite.
    pub test: Arc<ExecutionContext>,
}

impl ContextTree {
    /// Builds the chain from a configured global builder. Suite and test
    /// inherit the global declarations.
    ///
    /// # Errors
    ///
    /// Propagates context creation errors.
    pub fn build(global: ExecutionContextBuilder) -> Result<Self> {
        let global = global.build()?;
        let suite = global.child(ContextScope::Suite, "suite").build()?;
        let test = suite.child(ContextScope::Test, "test").build()?;
        Ok(Self { global, suite, test })
    }

    /// Builds a chain with no declarations.
    ///
    /// # Errors
    ///
    /// Propagates context creation errors.
    pub fn empty() -> Result<Self> {
        Self::build(ExecutionContext::builder(ContextScope::Global, "global"))
    }

    /// Starts global, then suite, then test.
    ///
    /// # Errors
    ///
    /// The first start failure.
    pub async fn start_all(&self, token: &CancellationToken) -> Result<()> {
        self.global.start(token).await?;
        self.suite.start(token).await?;
        self.test.start(token).await
    }

    /// Disposes the whole chain from the root.
    pub async fn dispose(&self) -> Vec<crate::errors::SessionError> {
        self.global.dispose().await
    }
}
