//! Per-builder configuration.

use crate::context::StartScopes;
use crate::errors::Result;
use crate::pool::PoolOptions;
use crate::session::SessionMode;
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};

/// Settings shared by every session builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBuilderOptions {
    /// Optional session name, distinguishing several sessions of one kind.
    #[serde(default)]
    pub name: Option<String>,
    /// Exclusivity policy of built sessions.
    #[serde(default)]
    pub mode: SessionMode,
    /// Context levels at which the session starts automatically.
    #[serde(default = "default_start_scopes")]
    pub start_scopes: StartScopes,
    /// Pool capacity, used in pool mode.
    #[serde(default)]
    pub pool: PoolOptions,
    /// Timing for waiting on built sessions.
    #[serde(default)]
    pub wait: WaitOptions,
}

const fn default_start_scopes() -> StartScopes {
    StartScopes::ALL
}

impl Default for SessionBuilderOptions {
    fn default() -> Self {
        Self {
            name: None,
            mode: SessionMode::default(),
            start_scopes: default_start_scopes(),
            pool: PoolOptions::default(),
            wait: WaitOptions::default(),
        }
    }
}

impl SessionBuilderOptions {
    /// Validates the pool and wait settings.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<()> {
        self.wait.validate()?;
        if self.mode == SessionMode::Pool {
            self.pool.validate()?;
        }
        Ok(())
    }
}
