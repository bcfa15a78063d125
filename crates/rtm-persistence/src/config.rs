//! Sink configuration and factory.

use std::sync::Arc;

use rtm_core::{DynSink, RecordClass, Severity};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::csv_file::CsvSink;
use crate::error::{PersistenceError, PersistenceResult};
use crate::jsonl::JsonLinesSink;
use crate::loki::{LokiOptions, LokiSink};
use crate::memory::MemorySink;
use crate::pushgateway::PushgatewaySink;
use crate::sqlite::SqliteSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    Jsonl,
    Csv,
    Sqlite,
    Loki,
    Prometheus,
    Memory,
}

impl std::fmt::Display for SinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
            Self::Loki => "loki",
            Self::Prometheus => "prometheus",
            Self::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// One `[[sinks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub sink_type: SinkType,
    /// Directory (jsonl, csv) or database file (sqlite).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// File name prefix for jsonl and csv files.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Days of data kept by jsonl, csv and sqlite sinks. Unset keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    #[serde(default = "default_job_name")]
    pub job_name: String,
    #[serde(default = "default_accepts")]
    pub accepts: Vec<RecordClass>,
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
}

fn default_prefix() -> String {
    "roundtime".to_string()
}

fn default_instance_id() -> String {
    "studio-roundtime-monitor".to_string()
}

fn default_job_name() -> String {
    "studio-roundtime-monitor".to_string()
}

fn default_accepts() -> Vec<RecordClass> {
    vec![RecordClass::Intervals, RecordClass::Diagnostics]
}

fn default_min_severity() -> Severity {
    Severity::Info
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: "jsonl".to_string(),
            sink_type: SinkType::Jsonl,
            path: Some("data/roundtime".to_string()),
            prefix: default_prefix(),
            retention_days: None,
            url: None,
            username: None,
            password: None,
            token: None,
            instance_id: default_instance_id(),
            job_name: default_job_name(),
            accepts: default_accepts(),
            min_severity: default_min_severity(),
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("sink name must not be empty".to_string());
        }
        let missing = |field: &str| {
            format!("sink '{}' ({}) requires `{}`", self.name, self.sink_type, field)
        };
        match self.retention_days {
            Some(0) => return Err(format!("sink '{}': retention_days must be > 0", self.name)),
            Some(_) if !self.sink_type.keeps_local_data() => {
                return Err(format!(
                    "sink '{}' ({}) does not support retention_days",
                    self.name, self.sink_type
                ));
            }
            _ => {}
        }
        match self.sink_type {
            SinkType::Jsonl | SinkType::Csv | SinkType::Sqlite if self.path.is_none() => {
                Err(missing("path"))
            }
            SinkType::Loki if self.url.is_none() => Err(missing("url")),
            SinkType::Prometheus if self.job_name.trim().is_empty() => Err(missing("job_name")),
            _ => Ok(()),
        }
    }
}

impl SinkType {
    /// Sinks that store data on local disk and can prune it.
    pub fn keeps_local_data(&self) -> bool {
        matches!(self, Self::Jsonl | Self::Csv | Self::Sqlite)
    }
}

/// Construct the sink described by `config`.
pub fn build_sink(config: &SinkConfig) -> PersistenceResult<DynSink> {
    config.validate().map_err(PersistenceError::Config)?;
    let path = config.path.clone().unwrap_or_default();

    let sink: DynSink = match config.sink_type {
        SinkType::Jsonl => Arc::new(
            JsonLinesSink::new(&config.name, &path, &config.prefix)?
                .with_retention(config.retention_days),
        ),
        SinkType::Csv => Arc::new(CsvSink::new(
            &config.name,
            &path,
            &config.prefix,
            config.retention_days,
        )?),
        SinkType::Sqlite => Arc::new(
            SqliteSink::open(&config.name, &path)?.with_retention(config.retention_days),
        ),
        SinkType::Loki => Arc::new(LokiSink::new(
            &config.name,
            LokiOptions {
                url: config.url.clone().unwrap_or_default(),
                instance_id: config.instance_id.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
                token: config.token.clone(),
            },
        )?),
        SinkType::Prometheus => Arc::new(PushgatewaySink::new(
            &config.name,
            config.url.as_deref(),
            &config.job_name,
        )?),
        SinkType::Memory => Arc::new(MemorySink::new(&config.name)),
    };

    info!(sink = %config.name, kind = %config.sink_type, "Sink constructed");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_sink_table() {
        let config: SinkConfig = serde_json::from_value(serde_json::json!({
            "name": "loki",
            "type": "loki",
            "url": "http://loki:3100",
            "accepts": ["diagnostics"],
            "min_severity": "warning"
        }))
        .unwrap();
        assert_eq!(config.sink_type, SinkType::Loki);
        assert_eq!(config.accepts, vec![RecordClass::Diagnostics]);
        assert_eq!(config.min_severity, Severity::Warning);
        assert_eq!(config.instance_id, "studio-roundtime-monitor");
    }

    #[test]
    fn test_missing_path_rejected() {
        let config = SinkConfig {
            name: "db".to_string(),
            sink_type: SinkType::Sqlite,
            path: None,
            ..Default::default()
        };
        assert!(matches!(build_sink(&config), Err(PersistenceError::Config(_))));
    }

    #[test]
    fn test_build_file_sinks() {
        let temp_dir = TempDir::new().unwrap();
        let jsonl = SinkConfig {
            path: Some(temp_dir.path().join("jsonl").display().to_string()),
            ..Default::default()
        };
        assert_eq!(build_sink(&jsonl).unwrap().name(), "jsonl");

        let sqlite = SinkConfig {
            name: "db".to_string(),
            sink_type: SinkType::Sqlite,
            path: Some(temp_dir.path().join("rtm.db").display().to_string()),
            ..Default::default()
        };
        assert_eq!(build_sink(&sqlite).unwrap().name(), "db");
        assert!(temp_dir.path().join("rtm.db").exists());

        let csv = SinkConfig {
            name: "csv".to_string(),
            sink_type: SinkType::Csv,
            path: Some(temp_dir.path().join("csv").display().to_string()),
            retention_days: Some(30),
            ..Default::default()
        };
        assert_eq!(build_sink(&csv).unwrap().name(), "csv");
        assert!(temp_dir.path().join("csv").is_dir());
    }

    #[test]
    fn test_retention_days_validation() {
        let mut config = SinkConfig {
            retention_days: Some(0),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("retention_days must be > 0"));

        config.retention_days = Some(7);
        assert!(config.validate().is_ok());

        let loki = SinkConfig {
            name: "loki".to_string(),
            sink_type: SinkType::Loki,
            url: Some("http://loki:3100".to_string()),
            retention_days: Some(7),
            ..Default::default()
        };
        assert!(loki.validate().unwrap_err().contains("does not support retention_days"));
    }
}
