//! Error types for the MAESTRO core

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the call intelligence core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Knowledge base error: {0}")]
    Knowledge(#[from] sled::Error),

    #[error("Reasoning service error: {0}")]
    Reasoning(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
