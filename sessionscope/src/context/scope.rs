//! Context tree levels and the start-scope sets that target them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// The level of an execution context in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    /// The root context shared by a whole run.
    Global,
    /// A grouping of suites (e.g. a module or namespace).
    Namespace,
    /// A test suite.
    Suite,
    /// A single test.
    Test,
}

impl ContextScope {
    /// All scopes from the root downwards.
    pub const ALL: [Self; 4] = [Self::Global, Self::Namespace, Self::Suite, Self::Test];

    /// Returns the lowercase scope name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Namespace => "namespace",
            Self::Suite => "suite",
            Self::Test => "test",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Global => 0b0001,
            Self::Namespace => 0b0010,
            Self::Suite => 0b0100,
            Self::Test => 0b1000,
        }
    }
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of context scopes at which a declared session is started
/// automatically.
///
/// Serialized as a list of scope names, e.g. `["global", "test"]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ContextScope>", into = "Vec<ContextScope>")]
pub struct StartScopes(u8);

impl StartScopes {
    /// Never started automatically.
    pub const NONE: Self = Self(0);
    /// Started in the global context.
    pub const GLOBAL: Self = Self(0b0001);
    /// Started in namespace contexts.
    pub const NAMESPACE: Self = Self(0b0010);
    /// Started in suite contexts.
    pub const SUITE: Self = Self(0b0100);
    /// Started in test contexts.
    pub const TEST: Self = Self(0b1000);
    /// Started at every level.
    pub const ALL: Self = Self(0b1111);

    /// Returns true if the set includes `scope`.
    #[must_use]
    pub const fn contains(&self, scope: ContextScope) -> bool {
        self.0 & scope.bit() != 0
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the scopes in the set, root first.
    #[must_use]
    pub fn scopes(&self) -> Vec<ContextScope> {
        ContextScope::ALL
            .into_iter()
            .filter(|scope| self.contains(*scope))
            .collect()
    }
}

impl From<ContextScope> for StartScopes {
    fn from(scope: ContextScope) -> Self {
        Self(scope.bit())
    }
}

impl From<Vec<ContextScope>> for StartScopes {
    fn from(scopes: Vec<ContextScope>) -> Self {
        Self(scopes.into_iter().fold(0, |acc, scope| acc | scope.bit()))
    }
}

impl From<StartScopes> for Vec<ContextScope> {
    fn from(scopes: StartScopes) -> Self {
        scopes.scopes()
    }
}

impl BitOr for StartScopes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for StartScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StartScopes").field(&self.scopes()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_scopes_contains() {
        let scopes = StartScopes::GLOBAL | StartScopes::TEST;
        assert!(scopes.contains(ContextScope::Global));
        assert!(scopes.contains(ContextScope::Test));
        assert!(!scopes.contains(ContextScope::Suite));
        assert!(StartScopes::NONE.is_empty());
        assert_eq!(StartScopes::ALL.scopes().len(), 4);
    }

    #[test]
    fn test_start_scopes_serde_as_list() {
        let scopes: StartScopes = serde_json::from_str(r#"["suite", "test"]"#).unwrap();
        assert_eq!(scopes, StartScopes::SUITE | StartScopes::TEST);

        let json = serde_json::to_value(StartScopes::GLOBAL).unwrap();
        assert_eq!(json, serde_json::json!(["global"]));
    }
}
