//! Session builders and the declarations a context starts from.

#[allow(clippy::module_inception)]
mod builder;
mod fn_builder;
mod options;
mod request;

pub use builder::{build_session, SessionBuilder};
pub use fn_builder::{FnSessionBuilder, ResourceFactory};
pub use options::SessionBuilderOptions;
pub use request::{SessionBorrowRequest, SessionPoolRequest, SessionProvider};
