//! Declarations of sessions a context obtains from elsewhere.

use super::SessionBuilder;
use crate::context::StartScopes;
use crate::session::{SessionKind, SessionResource};
use std::sync::Arc;

/// Declares that a context borrows a shared session from an ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBorrowRequest {
    /// The resource kind to borrow.
    pub kind: SessionKind,
    /// Optional session name; any name matches when absent.
    pub name: Option<String>,
    /// Context levels at which the borrow happens automatically.
    pub start_scopes: StartScopes,
}

impl SessionBorrowRequest {
    /// Creates a request for a kind, borrowing at test level.
    #[must_use]
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            name: None,
            start_scopes: StartScopes::TEST,
        }
    }

    /// Creates a request for the kind of resource type `R`.
    #[must_use]
    pub fn of<R: SessionResource>() -> Self {
        Self::new(SessionKind::of::<R>())
    }

    /// Sets the session name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the automatic start scopes.
    #[must_use]
    pub const fn with_start_scopes(mut self, scopes: StartScopes) -> Self {
        self.start_scopes = scopes;
        self
    }
}

/// Declares that a context takes a session from the nearest matching pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPoolRequest {
    /// The resource kind to take.
    pub kind: SessionKind,
    /// Optional pool name; the unnamed or any pool matches when absent.
    pub name: Option<String>,
    /// Context levels at which the checkout happens automatically.
    pub start_scopes: StartScopes,
}

impl SessionPoolRequest {
    /// Creates a request for a kind, taking at test level.
    #[must_use]
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            name: None,
            start_scopes: StartScopes::TEST,
        }
    }

    /// Creates a request for the kind of resource type `R`.
    #[must_use]
    pub fn of<R: SessionResource>() -> Self {
        Self::new(SessionKind::of::<R>())
    }

    /// Sets the pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the automatic start scopes.
    #[must_use]
    pub const fn with_start_scopes(mut self, scopes: StartScopes) -> Self {
        self.start_scopes = scopes;
        self
    }
}

/// A session declaration on a context.
#[derive(Debug, Clone)]
pub enum SessionProvider {
    /// Build a session (or, in pool mode, a pool) with a builder.
    Builder(Arc<dyn SessionBuilder>),
    /// Borrow a shared session from an ancestor.
    Borrow(SessionBorrowRequest),
    /// Take a session from a pool.
    TakeFromPool(SessionPoolRequest),
}

impl SessionProvider {
    /// The resource kind provided.
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Builder(builder) => builder.kind(),
            Self::Borrow(request) => request.kind.clone(),
            Self::TakeFromPool(request) => request.kind.clone(),
        }
    }

    /// The session name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Builder(builder) => builder.name(),
            Self::Borrow(request) => request.name.as_deref(),
            Self::TakeFromPool(request) => request.name.as_deref(),
        }
    }

    /// The levels at which the declaration starts automatically.
    pub fn start_scopes(&self) -> StartScopes {
        match self {
            Self::Builder(builder) => builder.options().start_scopes,
            Self::Borrow(request) => request.start_scopes,
            Self::TakeFromPool(request) => request.start_scopes,
        }
    }

    /// An independent copy for a child context.
    #[must_use]
    pub fn clone_for_child(&self) -> Self {
        match self {
            Self::Builder(builder) => Self::Builder(builder.clone_builder()),
            other => other.clone(),
        }
    }
}

impl From<SessionBorrowRequest> for SessionProvider {
    fn from(request: SessionBorrowRequest) -> Self {
        Self::Borrow(request)
    }
}

impl From<SessionPoolRequest> for SessionProvider {
    fn from(request: SessionPoolRequest) -> Self {
        Self::TakeFromPool(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FnSessionBuilder;
    use crate::context::ContextScope;
    use crate::testing::MockResource;

    #[test]
    fn test_requests_default_to_test_scope() {
        let borrow = SessionBorrowRequest::of::<MockResource>().with_name("main");
        assert_eq!(borrow.start_scopes, StartScopes::TEST);
        assert_eq!(borrow.name.as_deref(), Some("main"));

        let take = SessionPoolRequest::of::<MockResource>().with_start_scopes(StartScopes::SUITE);
        assert!(take.start_scopes.contains(ContextScope::Suite));
        assert!(!take.start_scopes.contains(ContextScope::Test));
    }

    #[test]
    fn test_provider_accessors() {
        let builder = FnSessionBuilder::for_resource(|| async { Ok(MockResource::new()) })
            .with_name("main")
            .with_start_scopes(StartScopes::GLOBAL);
        let provider = SessionProvider::Builder(Arc::new(builder));

        assert_eq!(provider.kind(), SessionKind::of::<MockResource>());
        assert_eq!(provider.name(), Some("main"));
        assert_eq!(provider.start_scopes(), StartScopes::GLOBAL);

        let child = provider.clone_for_child();
        assert_eq!(child.name(), Some("main"));

        let borrow: SessionProvider = SessionBorrowRequest::of::<MockResource>().into();
        assert_eq!(borrow.start_scopes(), StartScopes::TEST);
    }
}
