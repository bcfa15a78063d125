//! Router error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Invalid router configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate sink name: {0}")]
    DuplicateSink(String),

    #[error("No tokio runtime available to start flush tasks")]
    NoRuntime,

    #[error("Router is shut down")]
    Closed,
}

pub type RouterResult<T> = Result<T, RouterError>;
