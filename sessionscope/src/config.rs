//! Loadable defaults for session builders.

use crate::builder::SessionBuilderOptions;
use crate::errors::{Result, SessionError};
use crate::pool::PoolOptions;
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the default wait timeout.
pub const ENV_WAIT_TIMEOUT_MS: &str = "SESSIONSCOPE_WAIT_TIMEOUT_MS";
/// Environment variable overriding the default wait retry interval.
pub const ENV_WAIT_RETRY_INTERVAL_MS: &str = "SESSIONSCOPE_WAIT_RETRY_INTERVAL_MS";
/// Environment variable overriding the default pool maximum capacity.
pub const ENV_POOL_MAX_CAPACITY: &str = "SESSIONSCOPE_POOL_MAX_CAPACITY";

/// Crate-wide session defaults plus per-session overrides.
///
/// ```json
/// {
///   "wait": { "timeout_ms": 60000 },
///   "pool": { "max_capacity": 4 },
///   "sessions": [
///     { "name": "admin", "mode": "shared", "start_scopes": ["global"] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default wait timing.
    #[serde(default)]
    pub wait: WaitOptions,
    /// Default pool capacity.
    #[serde(default)]
    pub pool: PoolOptions,
    /// Options for named sessions.
    #[serde(default)]
    pub sessions: Vec<SessionBuilderOptions>,
}

impl SessionConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SessionError::validation(format!("invalid session config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SESSIONSCOPE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unparsable or invalid values.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unparsable or invalid values.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = parse_var(&lookup, ENV_WAIT_TIMEOUT_MS)? {
            self.wait.timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_WAIT_RETRY_INTERVAL_MS)? {
            self.wait.retry_interval_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_POOL_MAX_CAPACITY)? {
            self.pool.max_capacity = value;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validates defaults and every session entry.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<()> {
        self.wait.validate()?;
        self.pool.validate()?;
        for options in &self.sessions {
            options.validate()?;
        }
        Ok(())
    }

    /// Options for a session: the named entry if configured, otherwise the
    /// defaults carrying `name`.
    #[must_use]
    pub fn options_for(&self, name: Option<&str>) -> SessionBuilderOptions {
        self.sessions
            .iter()
            .find(|options| options.name.as_deref() == name)
            .cloned()
            .unwrap_or_else(|| SessionBuilderOptions {
                name: name.map(str::to_string),
                pool: self.pool,
                wait: self.wait,
                ..Default::default()
            })
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| SessionError::validation(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMode;
    use std::collections::HashMap;

    #[test]
    fn test_from_json_str() {
        let config = SessionConfig::from_json_str(
            r#"{
                "wait": {"timeout_ms": 1000},
                "pool": {"max_capacity": 4, "initial_capacity": 1},
                "sessions": [{"name": "admin", "mode": "shared"}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.wait.timeout_ms, 1000);
        assert_eq!(config.wait.retry_interval_ms, 200);
        assert_eq!(config.pool.max_capacity, 4);
        assert_eq!(config.options_for(Some("admin")).mode, SessionMode::Shared);

        let fallback = config.options_for(Some("guest"));
        assert_eq!(fallback.name.as_deref(), Some("guest"));
        assert_eq!(fallback.pool.max_capacity, 4);
        assert_eq!(fallback.wait.timeout_ms, 1000);
    }

    #[test]
    fn test_from_json_str_rejects_invalid_values() {
        assert!(SessionConfig::from_json_str(r#"{"pool": {"max_capacity": 0}}"#).is_err());
        assert!(SessionConfig::from_json_str(r#"{"wait": {"retry_interval_ms": 0}}"#).is_err());
        assert!(SessionConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_WAIT_TIMEOUT_MS, "2500"),
            (ENV_POOL_MAX_CAPACITY, " 3 "),
        ]
        .into_iter()
        .collect();

        let config = SessionConfig::default()
            .with_env_overrides(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.wait.timeout_ms, 2500);
        assert_eq!(config.wait.retry_interval_ms, 200);
        assert_eq!(config.pool.max_capacity, 3);
    }

    #[test]
    fn test_env_override_must_parse() {
        let err = SessionConfig::default()
            .with_env_overrides(|key| (key == ENV_WAIT_RETRY_INTERVAL_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_WAIT_RETRY_INTERVAL_MS));
    }
}
