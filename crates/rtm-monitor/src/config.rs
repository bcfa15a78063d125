//! Application configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rtm_bus::BusConfig;
use rtm_detector::DetectorConfig;
use rtm_persistence::SinkConfig;
use rtm_router::RouterConfig;
use rtm_tracker::TrackerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Logging and periodic summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default filter level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Period of the interval summary log. 0 disables it.
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_summary_interval_secs() -> u64 {
    3600
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            summary_interval_secs: default_summary_interval_secs(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("unknown log_level '{other}'")),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bound on draining queued events at shutdown.
    #[serde(default = "default_shutdown_drain_timeout_ms")]
    pub shutdown_drain_timeout_ms: u64,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

fn default_shutdown_drain_timeout_ms() -> u64 {
    5_000
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig::default()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shutdown_drain_timeout_ms: default_shutdown_drain_timeout_ms(),
            tracker: TrackerConfig::default(),
            detector: DetectorConfig::default(),
            router: RouterConfig::default(),
            bus: BusConfig::default(),
            telemetry: TelemetryConfig::default(),
            sinks: default_sinks(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn write_default(path: &str) -> AppResult<()> {
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {e}")))?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate every section; all problems are reported together.
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();

        if self.shutdown_drain_timeout_ms == 0 {
            errors.push("shutdown_drain_timeout_ms must be > 0".to_string());
        }
        if let Err(e) = self.tracker.validate() {
            errors.push(format!("tracker: {e}"));
        }
        if let Err(e) = self.detector.validate() {
            errors.push(format!("detector: {e}"));
        }
        if let Err(e) = self.router.validate() {
            errors.push(format!("router: {e}"));
        }
        if let Err(e) = self.bus.validate() {
            errors.push(format!("bus: {e}"));
        }
        if let Err(e) = self.telemetry.validate() {
            errors.push(format!("telemetry: {e}"));
        }

        let mut names = HashSet::new();
        for sink in &self.sinks {
            if let Err(e) = sink.validate() {
                errors.push(format!("sinks: {e}"));
            }
            if !names.insert(sink.name.as_str()) {
                errors.push(format!("sinks: duplicate sink name '{}'", sink.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(errors.join("; ")))
        }
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_core::{RecordClass, Severity};
    use rtm_persistence::SinkType;
    use rtm_tracker::GapPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].sink_type, SinkType::Jsonl);
        assert_eq!(config.shutdown_drain_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = AppConfig::from_toml(
            r#"
            shutdown_drain_timeout_ms = 2000

            [tracker]
            gap_policy = "restart_cycle"
            entity_idle_timeout_secs = 60

            [detector]
            anomaly_score_threshold = 2.5

            [[sinks]]
            name = "errors"
            type = "memory"
            accepts = ["diagnostics"]
            min_severity = "warning"

            [[sinks]]
            name = "db"
            type = "sqlite"
            path = "data/rtm.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.shutdown_drain_timeout_ms, 2000);
        assert_eq!(config.tracker.gap_policy, GapPolicy::RestartCycle);
        assert_eq!(config.tracker.entity_idle_timeout_secs, 60);
        assert_eq!(config.tracker.max_tracked_entities, 10_000);
        assert_eq!(config.detector.anomaly_score_threshold, 2.5);
        assert_eq!(config.router.flush_interval_ms, 5_000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[0].accepts, vec![RecordClass::Diagnostics]);
        assert_eq!(config.sinks[0].min_severity, Severity::Warning);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = AppConfig::default();
        config.router.flush_interval_ms = 0;
        config.telemetry.log_level = "loud".to_string();
        config.sinks.push(SinkConfig::default());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("router: flush_interval_ms"));
        assert!(err.contains("unknown log_level 'loud'"));
        assert!(err.contains("duplicate sink name 'jsonl'"));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let result = AppConfig::from_toml("[tracker\nmax_tracked_entities = 1");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_write_default_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("default.toml");
        let path = path.to_str().unwrap();

        AppConfig::write_default(path).unwrap();
        let config = AppConfig::from_file(path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sinks[0].name, "jsonl");
        assert_eq!(config.telemetry.summary_interval_secs, 3600);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[1].accepts, vec![RecordClass::Intervals]);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.bus.subscriber_queue_depth, 10_000);
    }
}
