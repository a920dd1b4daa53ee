//! Error types for session resolution, pooling and disposal.
//!
//! Every variant names the resource (kind and optional name) and the context
//! that was being resolved, since several same-kind sessions may coexist
//! across a deep context tree.

use std::collections::HashMap;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Broad classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The requested session, builder or pool does not exist in the searched scope.
    NotFound,
    /// A resource exists but did not become available in time.
    Timeout,
    /// The wait was aborted through a cancellation token.
    Cancelled,
    /// A configuration or usage invariant was violated.
    Validation,
    /// The target was already disposed.
    Disposed,
    /// The underlying resource failed to start or stop.
    Resource,
}

/// The main error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No matching session exists in the searched scope.
    #[error("{resource} session is not found in {context}")]
    SessionNotFound {
        /// Resource kind and name.
        resource: String,
        /// The context that performed the lookup.
        context: String,
    },

    /// No builder is declared for the requested session.
    #[error("{resource} session builder is not found in {context}")]
    BuilderNotFound {
        /// Resource kind and name.
        resource: String,
        /// The context that performed the lookup.
        context: String,
    },

    /// No pool exists in the context or any of its ancestors.
    #[error("{resource} session pool is not found in {context} or its ancestors")]
    PoolNotFound {
        /// Resource kind and name.
        resource: String,
        /// The context that performed the lookup.
        context: String,
    },

    /// A resource exists but did not become available within its wait budget.
    #[error("Timed out after {timeout_ms}ms waiting for {resource} session in {context}")]
    Timeout {
        /// Resource kind and name.
        resource: String,
        /// The waiting context.
        context: String,
        /// The wait budget in milliseconds.
        timeout_ms: u64,
    },

    /// A wait was cancelled before the resource became available.
    #[error("Waiting for {resource} session in {context} was cancelled: {reason}")]
    Cancelled {
        /// Resource kind and name.
        resource: String,
        /// The waiting context.
        context: String,
        /// The cancellation reason.
        reason: String,
    },

    /// A pool operation would exceed the pool's maximum capacity.
    #[error("{pool} pool capacity exceeded: {message}")]
    Capacity {
        /// Pool description.
        pool: String,
        /// Details.
        message: String,
    },

    /// A configuration or usage invariant was violated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A pool with the same key is already registered in the context.
    #[error("{pool} session pool is already registered in {context}")]
    DuplicatePool {
        /// Pool description.
        pool: String,
        /// The owning context.
        context: String,
    },

    /// The session, collection, pool or context is already disposed.
    #[error("{target} is disposed")]
    Disposed {
        /// Description of the disposed object.
        target: String,
    },

    /// The resource's start hook failed.
    #[error("Failed to start {resource} session: {source}")]
    StartFailed {
        /// Resource kind and name.
        resource: String,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// Tearing down the underlying resource failed.
    #[error("Failed to dispose {resource} session: {source}")]
    TeardownFailed {
        /// Resource kind and name.
        resource: String,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    /// Creates a session not found error.
    #[must_use]
    pub fn session_not_found(resource: impl Into<String>, context: impl Into<String>) -> Self {
        Self::SessionNotFound {
            resource: resource.into(),
            context: context.into(),
        }
    }

    /// Creates a builder not found error.
    #[must_use]
    pub fn builder_not_found(resource: impl Into<String>, context: impl Into<String>) -> Self {
        Self::BuilderNotFound {
            resource: resource.into(),
            context: context.into(),
        }
    }

    /// Creates a pool not found error.
    #[must_use]
    pub fn pool_not_found(resource: impl Into<String>, context: impl Into<String>) -> Self {
        Self::PoolNotFound {
            resource: resource.into(),
            context: context.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(resource: impl Into<String>, context: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            resource: resource.into(),
            context: context.into(),
            timeout_ms,
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(
        resource: impl Into<String>,
        context: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Cancelled {
            resource: resource.into(),
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Creates a capacity error.
    #[must_use]
    pub fn capacity(pool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capacity {
            pool: pool.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a duplicate pool error.
    #[must_use]
    pub fn duplicate_pool(pool: impl Into<String>, context: impl Into<String>) -> Self {
        Self::DuplicatePool {
            pool: pool.into(),
            context: context.into(),
        }
    }

    /// Creates a disposed-state error.
    #[must_use]
    pub fn disposed(target: impl Into<String>) -> Self {
        Self::Disposed {
            target: target.into(),
        }
    }

    /// Creates a start failure error.
    #[must_use]
    pub fn start_failed(resource: impl Into<String>, source: anyhow::Error) -> Self {
        Self::StartFailed {
            resource: resource.into(),
            source,
        }
    }

    /// Creates a teardown failure error.
    #[must_use]
    pub fn teardown_failed(resource: impl Into<String>, source: anyhow::Error) -> Self {
        Self::TeardownFailed {
            resource: resource.into(),
            source,
        }
    }

    /// Returns the broad category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::SessionNotFound { .. } | Self::BuilderNotFound { .. } | Self::PoolNotFound { .. } => {
                ErrorCategory::NotFound
            }
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Capacity { .. } | Self::Validation(_) | Self::DuplicatePool { .. } => {
                ErrorCategory::Validation
            }
            Self::Disposed { .. } => ErrorCategory::Disposed,
            Self::StartFailed { .. } | Self::TeardownFailed { .. } => ErrorCategory::Resource,
        }
    }

    /// Returns true for session, builder and pool lookup failures.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Returns true if a wait budget was exhausted.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    /// Returns true if the target was already disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.category() == ErrorCategory::Disposed
    }

    /// Returns a short type name for reporting.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "SessionNotFound",
            Self::BuilderNotFound { .. } => "SessionBuilderNotFound",
            Self::PoolNotFound { .. } => "SessionPoolNotFound",
            Self::Timeout { .. } => "SessionTimeout",
            Self::Cancelled { .. } => "SessionWaitCancelled",
            Self::Capacity { .. } => "SessionPoolCapacity",
            Self::Validation(_) => "SessionValidation",
            Self::DuplicatePool { .. } => "DuplicateSessionPool",
            Self::Disposed { .. } => "SessionDisposed",
            Self::StartFailed { .. } => "SessionStartFailed",
            Self::TeardownFailed { .. } => "SessionTeardownFailed",
        }
    }

    /// Converts to a dictionary representation for reporting.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.type_name()));

        match self {
            Self::SessionNotFound { resource, context }
            | Self::BuilderNotFound { resource, context }
            | Self::PoolNotFound { resource, context } => {
                map.insert("resource".to_string(), serde_json::json!(resource));
                map.insert("context".to_string(), serde_json::json!(context));
            }
            Self::Timeout {
                resource,
                context,
                timeout_ms,
            } => {
                map.insert("resource".to_string(), serde_json::json!(resource));
                map.insert("context".to_string(), serde_json::json!(context));
                map.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Self::Cancelled {
                resource,
                context,
                reason,
            } => {
                map.insert("resource".to_string(), serde_json::json!(resource));
                map.insert("context".to_string(), serde_json::json!(context));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Capacity { pool, .. } => {
                map.insert("pool".to_string(), serde_json::json!(pool));
            }
            Self::DuplicatePool { pool, context } => {
                map.insert("pool".to_string(), serde_json::json!(pool));
                map.insert("context".to_string(), serde_json::json!(context));
            }
            Self::Disposed { target } => {
                map.insert("target".to_string(), serde_json::json!(target));
            }
            Self::StartFailed { resource, .. } | Self::TeardownFailed { resource, .. } => {
                map.insert("resource".to_string(), serde_json::json!(resource));
            }
            Self::Validation(_) => {}
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_resource_and_context() {
        let err = SessionError::session_not_found("Browser \"X\"", "test 'login'");
        assert_eq!(
            err.to_string(),
            "Browser \"X\" session is not found in test 'login'"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            SessionError::timeout("Browser", "test", 10).category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            SessionError::capacity("Browser", "full").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            SessionError::disposed("Browser session").category(),
            ErrorCategory::Disposed
        );
        assert_eq!(
            SessionError::start_failed("Browser", anyhow::anyhow!("boom")).category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn test_start_failed_keeps_source() {
        let err = SessionError::start_failed("Browser", anyhow::anyhow!("driver missing"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source, Some("driver missing".to_string()));
    }

    #[test]
    fn test_timeout_to_dict() {
        let err = SessionError::timeout("Browser \"shared\"", "test 't1'", 250);
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "SessionTimeout");
        assert_eq!(dict.get("timeout_ms").unwrap(), 250);
        assert!(dict.get("message").unwrap().as_str().unwrap().contains("250ms"));
    }
}
