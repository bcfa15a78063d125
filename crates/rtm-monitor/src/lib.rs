//! Studio round-time monitor.
//!
//! Wires the pipeline stages together on one event bus:
//! - Checkpoint tracker (checkpoints -> raw intervals)
//! - Anomaly detector (raw -> annotated intervals)
//! - Storage router (annotated intervals and diagnostics -> sinks)
//!
//! Also provides TOML configuration and JSON Lines replay.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod replay;

pub use config::{AppConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
pub use pipeline::{
    HealthStatus, Pipeline, PipelineConfig, PipelineEvent, PipelineState, ShutdownReport,
};
pub use replay::{replay_file, replay_reader, ReplayRecord, ReplaySummary};
