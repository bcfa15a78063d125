//! Detector error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
