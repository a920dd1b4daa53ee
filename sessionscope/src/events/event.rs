//! Tagged lifecycle events.

use crate::ids::{ContextId, SessionId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to a session or pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// The resource start hook is about to run.
    InitStarted,
    /// The resource started and the session is registered.
    InitCompleted,
    /// Usage rights moved to a context.
    AssignedToContext {
        /// The context now entitled to use the session.
        context_id: ContextId,
    },
    /// The session was borrowed by a descendant context.
    Borrowed {
        /// The borrowing context.
        context_id: ContextId,
    },
    /// A borrowed session went back to its owner.
    Returned,
    /// A pool session was checked out.
    TakenFromPool {
        /// The taking context.
        context_id: ContextId,
    },
    /// A pool session went back to idle.
    ReturnedToPool,
    /// The session was soft-disabled.
    Deactivated,
    /// The session was disposed.
    Disposed,
    /// A pool fill finished.
    PoolFilled {
        /// Sessions built by the fill.
        built: usize,
    },
}

/// A lifecycle notification.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    /// What happened.
    #[serde(flatten)]
    pub kind: SessionEventKind,
    /// The session involved; absent for pool-level events.
    pub session_id: Option<SessionId>,
    /// Resource description (kind and optional name).
    pub resource: String,
    /// The context that owns the session or pool.
    pub owner_context_id: ContextId,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        kind: SessionEventKind,
        session_id: Option<SessionId>,
        resource: impl Into<String>,
        owner_context_id: ContextId,
    ) -> Self {
        Self {
            kind,
            session_id,
            resource: resource.into(),
            owner_context_id,
            timestamp: Utc::now(),
        }
    }

    /// Returns a dotted event type name, e.g. `session.init_started`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            SessionEventKind::InitStarted => "session.init_started",
            SessionEventKind::InitCompleted => "session.init_completed",
            SessionEventKind::AssignedToContext { .. } => "session.assigned_to_context",
            SessionEventKind::Borrowed { .. } => "session.borrowed",
            SessionEventKind::Returned => "session.returned",
            SessionEventKind::TakenFromPool { .. } => "session.taken_from_pool",
            SessionEventKind::ReturnedToPool => "session.returned_to_pool",
            SessionEventKind::Deactivated => "session.deactivated",
            SessionEventKind::Disposed => "session.disposed",
            SessionEventKind::PoolFilled { .. } => "pool.filled",
        }
    }

    /// Converts the event to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
