//! Lifecycle notifications for sessions and pools.
//!
//! Sessions publish [`SessionEvent`]s to the [`EventBus`] of the context that
//! built them. Subscribers (logging, reporting) implement [`EventSink`].

mod bus;
mod event;
mod sink;

pub use bus::EventBus;
pub use event::{SessionEvent, SessionEventKind};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
