//! Engine configuration.
//!
//! # Responsibility
//! - Hold tunables for transaction retries, SQLite busy handling and the
//!   search index layout.
//! - Load configuration from JSON files with per-field defaults.
//!
//! # Invariants
//! - A loaded configuration always passes [`EngineConfig::validate`].

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const DEFAULT_MAX_TXN_ATTEMPTS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SEARCH_COLLECTION: &str = "search_index";
const DEFAULT_IDENTITY_SEPARATOR: &str = ":";
const DEFAULT_MIN_TOKEN_LEN: usize = 2;
const DEFAULT_SEARCH_LIMIT: u32 = 20;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Runtime tunables shared by the store, the lifecycle service and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound of attempts for one lifecycle transaction on busy/locked.
    pub max_txn_attempts: u32,
    /// SQLite busy timeout applied when opening connections.
    pub busy_timeout_ms: u64,
    /// Collection holding search index entries.
    pub search_collection: String,
    /// Replacement for `/` when deriving search entry ids from item paths.
    pub identity_separator: String,
    /// Shortest prefix emitted by the prefix tokenizer.
    pub min_token_len: usize,
    /// Default number of hits returned by search queries.
    pub search_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_txn_attempts: DEFAULT_MAX_TXN_ATTEMPTS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            search_collection: DEFAULT_SEARCH_COLLECTION.to_string(),
            identity_separator: DEFAULT_IDENTITY_SEPARATOR.to_string(),
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_txn_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_txn_attempts must be at least 1".to_string(),
            ));
        }
        if self.search_collection.trim().is_empty() || self.search_collection.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "search_collection `{}` must be non-empty and must not contain `/`",
                self.search_collection
            )));
        }
        if self.identity_separator.is_empty() || self.identity_separator.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "identity_separator `{}` must be non-empty and must not contain `/`",
                self.identity_separator
            )));
        }
        if self.min_token_len == 0 {
            return Err(ConfigError::Invalid(
                "min_token_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

/// Loads configuration from a JSON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    EngineConfig::from_json_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "max_txn_attempts": 9 }"#).unwrap();
        assert_eq!(config.max_txn_attempts, 9);
        assert_eq!(config.search_collection, "search_index");
        assert_eq!(config.identity_separator, ":");
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = EngineConfig::from_json_str(r#"{ "max_txn_attempts": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_separator_containing_path_delimiter() {
        let err = EngineConfig::from_json_str(r#"{ "identity_separator": "/" }"#).unwrap_err();
        assert!(err.to_string().contains("identity_separator"));
    }
}
