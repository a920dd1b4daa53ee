//! Sessions: started resources with ownership, usage rights and a lifecycle.

mod kind;
mod resource;
#[allow(clippy::module_inception)]
mod session;

pub use kind::{SessionKind, SessionMode, SessionState};
pub use resource::SessionResource;
pub use session::Session;
pub(crate) use session::ContextRef;
