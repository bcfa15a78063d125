//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bus error: {0}")]
    Bus(#[from] rtm_bus::BusError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] rtm_tracker::TrackerError),

    #[error("Detector error: {0}")]
    Detector(#[from] rtm_detector::DetectorError),

    #[error("Router error: {0}")]
    Router(#[from] rtm_router::RouterError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] rtm_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] rtm_telemetry::TelemetryError),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline already stopped")]
    Stopped,
}

pub type AppResult<T> = Result<T, AppError>;
