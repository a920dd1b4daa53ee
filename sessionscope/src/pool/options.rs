//! Pool capacity configuration.

use crate::errors::{Result, SessionError};
use serde::{Deserialize, Serialize};

/// Capacity settings for a session pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Sessions built when the pool starts.
    #[serde(default)]
    pub initial_capacity: usize,
    /// Upper bound on sessions the pool may ever hold at once.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
    /// Whether fills build sessions concurrently.
    #[serde(default = "default_fill_in_parallel")]
    pub fill_in_parallel: bool,
}

const fn default_max_capacity() -> usize {
    10
}

const fn default_fill_in_parallel() -> bool {
    true
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_capacity: default_max_capacity(),
            fill_in_parallel: default_fill_in_parallel(),
        }
    }
}

impl PoolOptions {
    /// Sets the initial capacity.
    #[must_use]
    pub const fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Sets the maximum capacity.
    #[must_use]
    pub const fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets whether fills run concurrently.
    #[must_use]
    pub const fn with_fill_in_parallel(mut self, fill_in_parallel: bool) -> Self {
        self.fill_in_parallel = fill_in_parallel;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the maximum is zero or below the initial
    /// capacity.
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(SessionError::validation("pool max_capacity must be at least 1"));
        }
        if self.initial_capacity > self.max_capacity {
            return Err(SessionError::validation(format!(
                "pool initial_capacity ({}) exceeds max_capacity ({})",
                self.initial_capacity, self.max_capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PoolOptions::default();
        assert_eq!(options.initial_capacity, 0);
        assert_eq!(options.max_capacity, 10);
        assert!(options.fill_in_parallel);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        assert!(PoolOptions::default().with_max_capacity(0).validate().is_err());
        assert!(PoolOptions::default()
            .with_initial_capacity(3)
            .with_max_capacity(2)
            .validate()
            .is_err());
    }

    #[test]
    fn test_negative_capacity_is_rejected_on_load() {
        let result: std::result::Result<PoolOptions, _> =
            serde_json::from_str(r#"{"initial_capacity": -1}"#);
        assert!(result.is_err());
    }
}
