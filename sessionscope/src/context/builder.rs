//! Fluent construction of execution contexts.

use super::{ContextScope, ExecutionContext};
use crate::builder::{SessionBorrowRequest, SessionBuilder, SessionPoolRequest, SessionProvider};
use crate::errors::Result;
use crate::events::{EventBus, EventSink};
use std::sync::Arc;

/// Builder for [`ExecutionContext`].
///
/// A child builder starts with copies of the parent's session declarations
/// and shares the parent's event bus.
pub struct ExecutionContextBuilder {
    scope: ContextScope,
    name: String,
    parent: Option<Arc<ExecutionContext>>,
    providers: Vec<SessionProvider>,
    events: Option<Arc<EventBus>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl ExecutionContextBuilder {
    pub(crate) fn new(scope: ContextScope, name: impl Into<String>, parent: Option<Arc<ExecutionContext>>) -> Self {
        let providers: Vec<SessionProvider> = parent
            .as_ref()
            .map(|p| p.providers().iter().map(SessionProvider::clone_for_child).collect())
            .unwrap_or_default();
        Self {
            scope,
            name: name.into(),
            parent,
            providers,
            events: None,
            sinks: Vec::new(),
        }
    }

    /// Declares a session built by `builder`.
    #[must_use]
    pub fn add_session(self, builder: impl SessionBuilder + 'static) -> Self {
        self.add_session_builder(Arc::new(builder))
    }

    /// Declares a session built by a shared builder.
    #[must_use]
    pub fn add_session_builder(mut self, builder: Arc<dyn SessionBuilder>) -> Self {
        self.providers.push(SessionProvider::Builder(builder));
        self
    }

    /// Declares a shared session borrowed from an ancestor.
    #[must_use]
    pub fn borrow_session(mut self, request: SessionBorrowRequest) -> Self {
        self.providers.push(request.into());
        self
    }

    /// Declares a session taken from a pool.
    #[must_use]
    pub fn take_session_from_pool(mut self, request: SessionPoolRequest) -> Self {
        self.providers.push(request.into());
        self
    }

    /// Drops the declarations inherited from the parent.
    #[must_use]
    pub fn without_inherited_sessions(mut self) -> Self {
        self.providers.clear();
        self
    }

    /// Uses an explicit event bus instead of the parent's.
    #[must_use]
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Adds a subscriber for this context and its descendants.
    ///
    /// On a child, the parent's bus is forked first so siblings and the
    /// parent do not see the new subscriber.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Creates the context.
    ///
    /// # Errors
    ///
    /// Fails if the parent has already been disposed.
    pub fn build(self) -> Result<Arc<ExecutionContext>> {
        let events = match (self.events, &self.parent) {
            (Some(events), _) => events,
            (None, Some(parent)) if self.sinks.is_empty() => parent.events().clone(),
            (None, Some(parent)) => Arc::new(parent.events().fork()),
            (None, None) => Arc::new(EventBus::new()),
        };
        for sink in self.sinks {
            events.subscribe(sink);
        }

        ExecutionContext::create(self.scope, self.name, self.parent, self.providers, events)
    }
}

impl std::fmt::Debug for ExecutionContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContextBuilder")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.id()))
            .field("providers", &self.providers)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
