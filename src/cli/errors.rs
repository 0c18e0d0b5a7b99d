//! CLI-specific error types
//!
//! All CLI errors end the process with a non-zero status

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::schema::SchemaError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// No schema directory configured or given
    NoSchemaDir,
    /// A schema failed to load or compile
    CompileFailed,
    /// Async runtime could not start
    RuntimeFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CLI_CONFIG_ERROR",
            Self::IoError => "CLI_IO_ERROR",
            Self::NoSchemaDir => "CLI_NO_SCHEMA_DIR",
            Self::CompileFailed => "CLI_COMPILE_FAILED",
            Self::RuntimeFailed => "CLI_RUNTIME_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
    /// Code of the underlying schema error, if any
    schema_code: Option<&'static str>,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            schema_code: None,
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn no_schema_dir() -> Self {
        Self::new(
            CliErrorCode::NoSchemaDir,
            "No schema directory. Set 'schema_dir' in the config or pass --schema-dir.",
        )
    }

    pub fn runtime_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RuntimeFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Schema error code behind a compile failure
    pub fn schema_code(&self) -> Option<&'static str> {
        self.schema_code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        Self {
            code: CliErrorCode::CompileFailed,
            message: e.to_string(),
            schema_code: Some(e.code().code()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::no_schema_dir();
        assert!(err.to_string().starts_with("CLI_NO_SCHEMA_DIR: "));
        assert!(err.schema_code().is_none());
    }

    #[test]
    fn test_schema_error_keeps_schema_code() {
        let err = CliError::from(SchemaError::dangling_reference("user"));
        assert_eq!(err.code(), &CliErrorCode::CompileFailed);
        assert_eq!(err.schema_code(), Some("DANGLING_REFERENCE"));
        assert!(err.message().contains("user"));
    }
}
