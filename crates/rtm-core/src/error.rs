//! Error types for rtm-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown entity class: {0}")]
    UnknownEntityClass(String),

    #[error("Unknown checkpoint kind: {0}")]
    UnknownCheckpointKind(String),

    #[error("Checkpoint kind {kind} does not belong to entity class {class}")]
    KindClassMismatch { kind: String, class: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors returned by sink implementations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("Sink is closed")]
    Closed,
}

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;
