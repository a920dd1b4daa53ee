//! Fan-out of lifecycle events to subscribers.

use super::{EventSink, SessionEvent};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// A list of event subscribers shared by a context tree.
///
/// A panicking subscriber is logged and skipped; the remaining subscribers
/// still receive the event.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus with one subscriber.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        let bus = Self::new();
        bus.subscribe(sink);
        bus
    }

    /// Creates a new bus starting with this bus's current subscribers.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            subscribers: RwLock::new(self.subscribers.read().clone()),
        }
    }

    /// Adds a subscriber.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.subscribers.write().push(sink);
    }

    /// Returns the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publishes an event to every subscriber.
    pub fn publish(&self, event: &SessionEvent) {
        // Snapshot so subscribers may subscribe further sinks without deadlocking.
        let subscribers: Vec<Arc<dyn EventSink>> = self.subscribers.read().clone();

        for sink in subscribers {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sink.publish(event);
            })) {
                warn!(event_type = event.event_type(), "Event subscriber panicked: {:?}", e);
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
