//! Bus error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Returned by handlers to signal a failed event.
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("No tokio runtime available to spawn subscriber worker")]
    NoRuntime,

    #[error("Bus is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BusError {
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

pub type BusResult<T> = Result<T, BusError>;
