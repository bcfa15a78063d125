//! Anomaly detection for interval measurements.
//!
//! Keeps a rolling window of recent durations per
//! `(entity class, from kind, to kind)` and flags intervals whose z-score
//! against that window exceeds a threshold. No expected ranges need to be
//! configured; every interval kind calibrates itself.

pub mod config;
pub mod detector;
pub mod error;
pub mod rolling;

pub use config::DetectorConfig;
pub use detector::{AnomalyDetector, IntervalStatistics, StatKey};
pub use error::{DetectorError, DetectorResult};
pub use rolling::RollingStat;
