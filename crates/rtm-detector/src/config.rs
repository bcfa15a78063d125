//! Detector configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Number of recent durations kept per interval kind.
    #[serde(default = "default_rolling_window_size")]
    pub rolling_window_size: usize,
    /// Samples required before any interval can be flagged.
    #[serde(default = "default_anomaly_min_samples")]
    pub anomaly_min_samples: usize,
    /// Standard deviations from the mean beyond which an interval is anomalous.
    #[serde(default = "default_anomaly_score_threshold")]
    pub anomaly_score_threshold: f64,
    /// Keep separate baselines per table/device.
    #[serde(default)]
    pub per_table_baselines: bool,
    /// Annotated intervals kept per baseline for recent-interval queries.
    #[serde(default = "default_recent_intervals_kept")]
    pub recent_intervals_kept: usize,
}

fn default_rolling_window_size() -> usize {
    100
}

fn default_anomaly_min_samples() -> usize {
    10
}

fn default_anomaly_score_threshold() -> f64 {
    3.0
}

fn default_recent_intervals_kept() -> usize {
    100
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rolling_window_size: default_rolling_window_size(),
            anomaly_min_samples: default_anomaly_min_samples(),
            anomaly_score_threshold: default_anomaly_score_threshold(),
            per_table_baselines: false,
            recent_intervals_kept: default_recent_intervals_kept(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.rolling_window_size == 0 {
            return Err("rolling_window_size must be > 0".to_string());
        }
        if self.anomaly_min_samples == 0 {
            return Err("anomaly_min_samples must be > 0".to_string());
        }
        if self.anomaly_min_samples > self.rolling_window_size {
            return Err(format!(
                "anomaly_min_samples ({}) must not exceed rolling_window_size ({})",
                self.anomaly_min_samples, self.rolling_window_size
            ));
        }
        if !self.anomaly_score_threshold.is_finite() || self.anomaly_score_threshold <= 0.0 {
            return Err("anomaly_score_threshold must be a positive number".to_string());
        }
        if self.recent_intervals_kept == 0 {
            return Err("recent_intervals_kept must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_min_samples_above_window_rejected() {
        let config = DetectorConfig {
            rolling_window_size: 5,
            anomaly_min_samples: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        let config = DetectorConfig {
            anomaly_score_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_recent_intervals_rejected() {
        let config = DetectorConfig {
            recent_intervals_kept: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("recent_intervals_kept"));
    }
}
