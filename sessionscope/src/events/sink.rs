//! Subscribers for session lifecycle events.

use super::SessionEvent;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Trait for subscribers that receive lifecycle events.
///
/// Publishing happens inline on the thread that changed the session, so
/// implementations should return quickly and must not block.
pub trait EventSink: Send + Sync {
    /// Receives an event.
    fn publish(&self, event: &SessionEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn publish(&self, _event: &SessionEvent) {}
}

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs at `level`; anything other than `DEBUG` logs at `INFO`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at `DEBUG`.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Logs at `INFO`.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for LoggingEventSink {
    fn publish(&self, event: &SessionEvent) {
        let session_id = event.session_id.map(|id| id.to_string());
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type(),
                resource = %event.resource,
                session_id = ?session_id,
                owner_context_id = %event.owner_context_id,
                "Event: {}", event.event_type()
            );
        } else {
            info!(
                event_type = %event.event_type(),
                resource = %event.resource,
                session_id = ?session_id,
                owner_context_id = %event.owner_context_id,
                "Event: {}", event.event_type()
            );
        }
    }
}

/// Keeps every event in memory, in publication order.
///
/// Used by tests to assert on lifecycle ordering.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<SessionEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event type names in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(SessionEvent::event_type).collect()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Forgets the recorded events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with a prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<SessionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn publish(&self, event: &SessionEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEventKind;
    use crate::ids::{ContextId, SessionId};

    fn event(kind: SessionEventKind) -> SessionEvent {
        SessionEvent::new(kind, Some(SessionId::new()), "Browser", ContextId::new())
    }

    #[test]
    fn test_noop_and_logging_sinks_do_not_panic() {
        NoOpEventSink.publish(&event(SessionEventKind::InitStarted));
        LoggingEventSink::default().publish(&event(SessionEventKind::Disposed));
        LoggingEventSink::debug().publish(&event(SessionEventKind::Deactivated));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.publish(&event(SessionEventKind::InitStarted));
        sink.publish(&event(SessionEventKind::InitCompleted));

        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.event_types(),
            vec!["session.init_started", "session.init_completed"]
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        sink.publish(&event(SessionEventKind::InitStarted));
        sink.publish(&event(SessionEventKind::PoolFilled { built: 1 }));
        sink.publish(&event(SessionEventKind::Disposed));

        assert_eq!(sink.events_of_type("session.").len(), 2);
        assert_eq!(sink.events_of_type("pool.").len(), 1);
    }
}
