//! Errors from logging setup and metrics export.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter or subscriber already set: {0}")]
    LoggingInit(String),

    #[error("Failed to encode metrics registry: {0}")]
    Encode(#[from] prometheus::Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
