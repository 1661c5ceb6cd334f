//! Error types for the reconciliation engine.

use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum ReflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid backend format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Backend is locked by another process")]
    Locked,

    #[error("Backend not initialized: {0}")]
    NotInitialized(String),
}

impl From<serde_json::Error> for ReflowError {
    fn from(e: serde_json::Error) -> Self {
        ReflowError::Serialization(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ReflowError>;
