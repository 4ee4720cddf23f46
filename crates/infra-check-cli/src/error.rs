//! Error types for the audit CLI
//!
//! Everything that can stop a run before or after the engine does its work:
//! bad arguments, unreadable or malformed files, report write failures.

use infra_check_engine::EngineError;
use thiserror::Error;

/// Main error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Inventory or catalog parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Structurally valid file with unusable content
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Report or metrics output failure
    #[error("Report error: {0}")]
    ReportError(String),

    /// Engine precondition failure
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    pub fn file_error(msg: impl Into<String>) -> Self {
        CliError::FileError(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        CliError::ParseError(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        CliError::ConfigError(msg.into())
    }

    pub fn report_error(msg: impl Into<String>) -> Self {
        CliError::ReportError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        match self {
            CliError::InvalidInput(_)
            | CliError::FileError(_)
            | CliError::ParseError(_)
            | CliError::ConfigError(_) => true,
            CliError::Engine(err) => err.is_input_error(),
            CliError::ReportError(_) | CliError::Internal(_) => false,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::ParseError(format!("TOML error: {}", err))
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
