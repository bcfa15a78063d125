//! Checkpoint tracking for the round-time monitor.
//!
//! Turns a stream of checkpoint events into interval measurements by
//! following each entity through its class's checkpoint cycle:
//! - In-order pairs produce one `Interval`
//! - Duplicates are ignored
//! - Out-of-order checkpoints produce a `sequence_gap` diagnostic and resync
//! - Idle and least-recently-used entities are evicted to bound memory

pub mod config;
pub mod error;
pub mod progress;
pub mod tracker;

pub use config::{GapPolicy, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use progress::EntityProgress;
pub use tracker::{CheckpointTracker, Observation, ObserveOutcome, TrackerStats};
