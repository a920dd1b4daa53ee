//! Resource-kind tags, session modes and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying a kind of pooled resource.
///
/// Builders, pools and lookups are keyed by kind instead of by runtime type
/// inspection. [`SessionKind::of`] derives the tag from a resource type so
/// typed registration and lookup agree on the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKind(String);

impl SessionKind {
    /// Creates a kind from an explicit tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Creates the kind for resource type `R`.
    #[must_use]
    pub fn of<R: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<R>().to_string())
    }

    /// Returns the full tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag without any module path, e.g. `Browser` for
    /// `my_crate::drivers::Browser`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        let base = self.0.split('<').next().unwrap_or(&self.0);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Describes a resource of this kind with an optional name, as used in
    /// error messages: `Browser "admin"` or `Browser`.
    #[must_use]
    pub fn describe(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => format!("{} \"{}\"", self.short_name(), name),
            None => self.short_name().to_string(),
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl From<&str> for SessionKind {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Exclusivity policy of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Belongs solely to the context that built it.
    #[default]
    Own,
    /// May be borrowed, one context at a time, by descendant contexts.
    Shared,
    /// Lives in a pool and is checked out and returned.
    Pool,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, start hook not yet completed.
    Building,
    /// Started and usable.
    Active,
    /// Soft-disabled (idle in a pool or returned by a borrower).
    Deactivated,
    /// Torn down; every further operation fails.
    Disposed,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Browser;

    #[test]
    fn test_kind_of_type_uses_short_name_for_display() {
        let kind = SessionKind::of::<Browser>();
        assert!(kind.as_str().ends_with("Browser"));
        assert_eq!(kind.short_name(), "Browser");
        assert_eq!(kind.to_string(), "Browser");
    }

    #[test]
    fn test_kind_short_name_ignores_generics() {
        let kind = SessionKind::new("a::b::Driver<c::Chrome>");
        assert_eq!(kind.short_name(), "Driver");
    }

    #[test]
    fn test_describe() {
        let kind = SessionKind::new("Browser");
        assert_eq!(kind.describe(Some("admin")), "Browser \"admin\"");
        assert_eq!(kind.describe(None), "Browser");
    }

    #[test]
    fn test_mode_default_and_serde() {
        assert_eq!(SessionMode::default(), SessionMode::Own);
        let mode: SessionMode = serde_json::from_str("\"shared\"").unwrap();
        assert_eq!(mode, SessionMode::Shared);
    }
}
