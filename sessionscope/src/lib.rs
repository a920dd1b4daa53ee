//! # Sessionscope
//!
//! Lifecycle management for expensive, reusable resources ("sessions") such
//! as browser-driver connections, scoped to a tree of execution contexts
//! (global, namespace, suite, test).
//!
//! Sessionscope provides:
//!
//! - **Scoped ownership**: every session belongs to the context that built it
//!   and is torn down with that context
//! - **Borrowing**: shared sessions are lent, one context at a time, to
//!   descendant contexts
//! - **Pooling**: bounded pools hand out interchangeable sessions and wait
//!   when exhausted
//! - **Cooperative cancellation**: every wait honors a cancellation token
//! - **Lifecycle events**: explicit event buses, no global state
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sessionscope::prelude::*;
//!
//! let global = ExecutionContext::builder(ContextScope::Global, "run")
//!     .add_session(FnSessionBuilder::for_resource(|| async { Browser::launch().await }).shared())
//!     .build()?;
//! global.start(global.cancellation_token()).await?;
//!
//! let test = global
//!     .child(ContextScope::Test, "login")
//!     .without_inherited_sessions()
//!     .borrow_session(SessionBorrowRequest::of::<Browser>())
//!     .build()?;
//! test.start(test.cancellation_token()).await?;
//!
//! let browser = test.sessions().get(&SessionKind::of::<Browser>(), None)?;
//! test.dispose().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod builder;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod ids;
pub mod observability;
pub mod pool;
pub mod registry;
pub mod session;
pub mod testing;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::{
        FnSessionBuilder, SessionBorrowRequest, SessionBuilder, SessionBuilderOptions,
        SessionPoolRequest, SessionProvider,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::SessionConfig;
    pub use crate::context::{ContextScope, ExecutionContext, ExecutionContextBuilder, StartScopes};
    pub use crate::errors::{ErrorCategory, Result, SessionError};
    pub use crate::events::{CollectingEventSink, EventBus, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ids::{ContextId, SessionId};
    pub use crate::pool::{PoolKey, PoolOptions, SessionPool, SessionPoolContainer};
    pub use crate::registry::SessionCollection;
    pub use crate::session::{Session, SessionKind, SessionMode, SessionResource, SessionState};
    pub use crate::wait::{RetryWait, WaitOptions};
}
