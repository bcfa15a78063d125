//! Persistence error types.

use rtm_core::SinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Metrics encoding error: {0}")]
    Metrics(String),

    #[error("Invalid sink configuration: {0}")]
    Config(String),

    #[error("Sink is closed")]
    Closed,
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<PersistenceError> for SinkError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Io(e) => SinkError::Io(e),
            PersistenceError::Json(e) => SinkError::Serialization(e),
            PersistenceError::Closed => SinkError::Closed,
            other => SinkError::Backend(other.to_string()),
        }
    }
}
