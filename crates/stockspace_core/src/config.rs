//! Runtime configuration for the core.
//!
//! # Responsibility
//! - Hold tunables shared by the lifecycle and transfer modules.
//! - Load them from environment variables or a bundled JSON document.
//!
//! # Invariants
//! - Every field has a default; an empty source yields `CoreConfig::default()`.
//! - Invalid values are rejected, never silently replaced by defaults.

use crate::logging::default_log_level;
use crate::model::scope::{ACCOUNT_SCOPE_PREFIX, USER_SCOPE_PREFIX};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_CONFIRMATION_TIMEOUT_MS: &str = "STOCKSPACE_CONFIRMATION_TIMEOUT_MS";
pub const ENV_PROTECTED_PREFIXES: &str = "STOCKSPACE_PROTECTED_PREFIXES";
pub const ENV_LOG_LEVEL: &str = "STOCKSPACE_LOG_LEVEL";
pub const ENV_DB_PATH: &str = "STOCKSPACE_DB_PATH";

const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 20_000;

/// Core tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// How long a cross-scope move waits for the item to report its new scope.
    pub confirmation_timeout_ms: u64,
    /// Scope-key prefixes the activation policy never detaches.
    pub protected_scope_prefixes: Vec<String>,
    pub log_level: String,
    /// Local cache location; `None` keeps the cache in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
            protected_scope_prefixes: vec![
                ACCOUNT_SCOPE_PREFIX.to_string(),
                USER_SCOPE_PREFIX.to_string(),
            ],
            log_level: default_log_level().to_string(),
            db_path: None,
        }
    }
}

impl CoreConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Reads the `STOCKSPACE_*` environment variables.
    ///
    /// # Errors
    /// - `ConfigError::InvalidValue` when a variable is set but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CONFIRMATION_TIMEOUT_MS) {
            config.confirmation_timeout_ms = raw.trim().parse::<u64>().map_err(|err| {
                ConfigError::invalid(ENV_CONFIRMATION_TIMEOUT_MS, &raw, err.to_string())
            })?;
        }
        if let Some(raw) = lookup(ENV_PROTECTED_PREFIXES) {
            config.protected_scope_prefixes = raw
                .split(',')
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup(ENV_LOG_LEVEL) {
            config.log_level = raw.trim().to_ascii_lowercase();
        }
        if let Some(raw) = lookup(ENV_DB_PATH) {
            let trimmed = raw.trim();
            config.db_path = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document; missing keys keep their defaults.
    ///
    /// # Errors
    /// - `ConfigError::Json` for malformed JSON or mistyped fields.
    /// - `ConfigError::InvalidValue` for values that parse but are unusable.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmation_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "confirmation_timeout_ms",
                "0",
                "must be greater than zero",
            ));
        }
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::invalid(
                "log_level",
                &self.log_level,
                "expected trace|debug|info|warn|error",
            ));
        }
        Ok(())
    }
}

/// Configuration load failure.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    Json(serde_json::Error),
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid config value `{value}` for {key}: {reason}")
            }
            Self::Json(err) => write!(f, "invalid config json: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, ENV_CONFIRMATION_TIMEOUT_MS, ENV_PROTECTED_PREFIXES};
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = CoreConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.confirmation_timeout(), Duration::from_secs(20));
        assert_eq!(config.protected_scope_prefixes, vec!["account:", "user:"]);
    }

    #[test]
    fn environment_overrides_timeout_and_prefixes() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            (ENV_CONFIRMATION_TIMEOUT_MS, "1500"),
            (ENV_PROTECTED_PREFIXES, "account:, team: ,,"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.confirmation_timeout(), Duration::from_millis(1500));
        assert_eq!(config.protected_scope_prefixes, vec!["account:", "team:"]);
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        let err = CoreConfig::from_lookup(lookup_from(&[(ENV_CONFIRMATION_TIMEOUT_MS, "soon")]))
            .expect_err("timeout must be numeric");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains(ENV_CONFIRMATION_TIMEOUT_MS));
    }

    #[test]
    fn json_keeps_defaults_for_missing_keys() {
        let config = CoreConfig::from_json_str(r#"{"confirmation_timeout_ms": 500}"#)
            .expect("partial json is valid");
        assert_eq!(config.confirmation_timeout_ms, 500);
        assert_eq!(config.protected_scope_prefixes.len(), 2);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn json_rejects_zero_timeout_and_bad_level() {
        assert!(CoreConfig::from_json_str(r#"{"confirmation_timeout_ms": 0}"#).is_err());
        assert!(CoreConfig::from_json_str(r#"{"log_level": "loud"}"#).is_err());
        assert!(matches!(
            CoreConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
