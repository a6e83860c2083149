//! Error types shared by the strength engine
//!
//! Every core operation returns [`EngineResult`]. The variants are kept
//! distinct so logs can tell a missing artifact apart from a malformed
//! dataset or a flaky storage backend, even though the service boundary
//! collapses them all into one failure response.

use thiserror::Error;

/// Errors that can occur anywhere in the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A referenced blob or document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A dataset or bundle does not have the shape we need
    #[error("Schema error: {0}")]
    Schema(String),

    /// Caller-supplied input is malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// The storage backend failed (transport error, timeout, bad status)
    #[error("Storage error for '{key}': {message}")]
    Storage { key: String, message: String },

    /// Model fitting could not proceed
    #[error("Training failed: {0}")]
    Training(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EngineError {
    pub fn storage(key: impl Into<String>, message: impl ToString) -> Self {
        EngineError::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Stable tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::Schema(_) => "schema",
            EngineError::Validation(_) => "validation",
            EngineError::Storage { .. } => "storage",
            EngineError::Training(_) => "training",
            EngineError::Config(_) => "config",
            EngineError::Io(_) => "io",
            EngineError::Json(_) => "json",
            EngineError::Csv(_) => "csv",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
