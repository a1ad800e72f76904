//! Error types for Korpus

use thiserror::Error;

/// Core error type for corpus building operations
#[derive(Error, Debug)]
pub enum KorpusError {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unresolved link: {0}")]
    UnresolvedLink(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,
}

/// Result type alias for corpus building operations
pub type Result<T> = std::result::Result<T, KorpusError>;
