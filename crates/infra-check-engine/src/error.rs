//! Error types for the audit engine
//!
//! Only precondition failures are errors. Per-check failures are recorded as
//! UNKNOWN results and never surface here.

use thiserror::Error;

/// Precondition failures detected before any dispatch
#[derive(Error, Debug)]
pub enum EngineError {
    /// Inventory has no targets and no clusters
    #[error("Inventory is empty: no targets or clusters to audit")]
    EmptyInventory,

    /// Catalog has no checks
    #[error("Check catalog is empty")]
    EmptyCatalog,

    /// Two checks share an identifier
    #[error("Duplicate check id: {0}")]
    DuplicateCheck(String),

    /// A check definition is malformed
    #[error("Invalid check {id}: {reason}")]
    InvalidCheck { id: String, reason: String },

    /// A requested check id is not in the catalog
    #[error("Unknown check id: {0}")]
    UnknownCheck(String),

    /// A channel could not be constructed
    #[error("Channel error: {0}")]
    Channel(String),

    /// Metrics registry setup failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl EngineError {
    /// Create an invalid check error
    pub fn invalid_check(id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidCheck {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a channel construction error
    pub fn channel(msg: impl Into<String>) -> Self {
        EngineError::Channel(msg.into())
    }

    /// True when the inputs are at fault rather than the engine
    pub fn is_input_error(&self) -> bool {
        !matches!(self, EngineError::Channel(_) | EngineError::Metrics(_))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
