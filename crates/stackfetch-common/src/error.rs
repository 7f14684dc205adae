//! Error types for stackfetch
//!
//! Everything in here is fatal for a run. Per-row failures have their own
//! types in the ingest crate and never surface as a `StackError`.

use thiserror::Error;

/// Result type alias for stackfetch operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Main error type for stackfetch
#[derive(Error, Debug)]
pub enum StackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing credentials: {0} must be set to read blobs from the object store")]
    MissingCredentials(String),

    #[error("Unsupported language: {language}. Available: {available}")]
    UnsupportedLanguage { language: String, available: String },

    #[error("Subset not found: {dataset}/{config} ({reason})")]
    SubsetNotFound {
        dataset: String,
        config: String,
        reason: String,
    },

    #[error("Row source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StackError {
    /// Create a row source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach a path to an IO error so the diagnostic says which artifact failed
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}
