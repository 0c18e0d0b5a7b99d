//! Compiler configuration
//!
//! Loaded from a JSON file. Every key is optional:
//!
//! ```json
//! { "keyspace": "app", "set_representation": "array", "sync_tables": false,
//!   "log_level": "warn", "schema_dir": "./schemas" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// How set-typed fields come back from storage when the field itself does
/// not say
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetRepresentation {
    /// `Value::Set`
    #[default]
    Native,
    /// `Value::List`
    Array,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Keyspace the DDL is rendered into (default "widerow")
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    #[serde(default)]
    pub set_representation: SetRepresentation,

    /// Issue table and index DDL after each compile (default true)
    #[serde(default = "default_sync_tables")]
    pub sync_tables: bool,

    /// Minimum log severity (default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory of schema JSON literals
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

fn default_keyspace() -> String {
    "widerow".to_string()
}
fn default_sync_tables() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            keyspace: default_keyspace(),
            set_representation: SetRepresentation::default(),
            sync_tables: default_sync_tables(),
            log_level: default_log_level(),
            schema_dir: None,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: CompilerConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let identifier = Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,47}$")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !identifier.is_match(&self.keyspace) {
            return Err(ConfigError::Invalid(format!(
                "keyspace '{}' is not a valid identifier",
                self.keyspace
            )));
        }

        if Severity::from_name(&self.log_level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Configured minimum severity
    pub fn severity(&self) -> Severity {
        Severity::from_name(&self.log_level).unwrap_or(Severity::Info)
    }

    pub fn sets_as_arrays(&self) -> bool {
        self.set_representation == SetRepresentation::Array
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = keyspace.into();
        self
    }

    pub fn with_sync_tables(mut self, sync: bool) -> Self {
        self.sync_tables = sync;
        self
    }

    pub fn with_set_representation(mut self, representation: SetRepresentation) -> Self {
        self.set_representation = representation;
        self
    }

    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = CompilerConfig::from_json("{}").unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.keyspace, "widerow");
        assert!(config.sync_tables);
        assert!(!config.sets_as_arrays());
        assert_eq!(config.severity(), Severity::Info);
        assert!(config.schema_dir.is_none());
    }

    #[test]
    fn test_all_keys() {
        let config = CompilerConfig::from_json(
            r#"{"keyspace": "app", "set_representation": "array", "sync_tables": false,
                "log_level": "warn", "schema_dir": "/tmp/schemas"}"#,
        )
        .unwrap();
        assert_eq!(config.keyspace, "app");
        assert!(config.sets_as_arrays());
        assert!(!config.sync_tables);
        assert_eq!(config.severity(), Severity::Warn);
        assert_eq!(config.schema_dir, Some(PathBuf::from("/tmp/schemas")));
    }

    #[test]
    fn test_invalid_keyspace_rejected() {
        let err = CompilerConfig::from_json(r#"{"keyspace": "my-app"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("my-app"));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = CompilerConfig::from_json(r#"{"log_level": "chatty"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_set_representation_rejected() {
        let err = CompilerConfig::from_json(r#"{"set_representation": "bag"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("widerow.json");
        fs::write(&path, r#"{"keyspace": "shop"}"#).unwrap();

        let config = CompilerConfig::load(&path).unwrap();
        assert_eq!(config.keyspace, "shop");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = CompilerConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
