//! Records handed to the storage router and their persisted shapes.

use crate::diagnostic::{Diagnostic, Severity};
use crate::interval::Interval;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Class of record, used by routing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordClass {
    Intervals,
    Diagnostics,
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intervals => write!(f, "intervals"),
            Self::Diagnostics => write!(f, "diagnostics"),
        }
    }
}

impl FromStr for RecordClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intervals" | "interval" => Ok(Self::Intervals),
            "diagnostics" | "diagnostic" => Ok(Self::Diagnostics),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown record class: {other}"
            ))),
        }
    }
}

/// Unit of delivery to sinks. Shared immutably across sinks.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    Interval(Interval),
    Diagnostic(Diagnostic),
}

impl SinkRecord {
    pub fn class(&self) -> RecordClass {
        match self {
            Self::Interval(_) => RecordClass::Intervals,
            Self::Diagnostic(_) => RecordClass::Diagnostics,
        }
    }

    /// Severity used by routing rules; intervals count as info.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Interval(_) => Severity::Info,
            Self::Diagnostic(d) => d.severity,
        }
    }

    /// Flat persisted shape.
    pub fn to_persisted(&self) -> PersistedRecord {
        match self {
            Self::Interval(i) => PersistedRecord::Interval(IntervalRecord::from(i)),
            Self::Diagnostic(d) => PersistedRecord::Diagnostic(DiagnosticRecord::from(d)),
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self.to_persisted()).unwrap_or(serde_json::Value::Null)
    }
}

/// Tagged persisted record (`record_type` discriminator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum PersistedRecord {
    Interval(IntervalRecord),
    Diagnostic(DiagnosticRecord),
}

/// Flat interval row written by file, database and remote sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub id: String,
    /// Closing checkpoint timestamp (seconds).
    pub timestamp: f64,
    /// Wall-clock time the interval was measured (RFC 3339).
    pub datetime: String,
    pub entity_class: String,
    pub game_type: String,
    pub entity_id: String,
    pub round_id: String,
    pub from_kind: String,
    pub to_kind: String,
    pub interval: String,
    pub duration_seconds: f64,
    pub anomaly: bool,
    pub anomaly_score: Option<f64>,
}

impl From<&Interval> for IntervalRecord {
    fn from(i: &Interval) -> Self {
        Self {
            id: i.id.to_string(),
            timestamp: i.occurred_at.as_secs(),
            datetime: i.recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            entity_class: i.entity_key.class.to_string(),
            game_type: i.entity_key.game_type.clone(),
            entity_id: i.entity_key.entity_id.clone(),
            round_id: i.entity_key.round_id.clone(),
            from_kind: i.from_kind.to_string(),
            to_kind: i.to_kind.to_string(),
            interval: i.label(),
            duration_seconds: i.duration,
            anomaly: i.is_anomalous(),
            // Infinite scores are not representable in JSON.
            anomaly_score: i.anomaly_score.filter(|s| s.is_finite()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Producer timestamp (seconds).
    pub timestamp: f64,
    /// Wall-clock time the diagnostic was raised (RFC 3339).
    pub datetime: String,
    pub severity: String,
    pub kind: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl From<&Diagnostic> for DiagnosticRecord {
    fn from(d: &Diagnostic) -> Self {
        Self {
            timestamp: d.timestamp.as_secs(),
            datetime: d.recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            severity: d.severity.to_string(),
            kind: d.kind.to_string(),
            message: d.message.clone(),
            context: d.context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;
    use crate::entity::{CheckpointKind, EntityClass, EntityKey};
    use crate::event::Timestamp;

    #[test]
    fn test_interval_record_shape() {
        let key = EntityKey::new(EntityClass::Roulette, "roulette", "ARO-001", "r7");
        let interval = Interval::new(
            key,
            CheckpointKind::X4,
            CheckpointKind::X5,
            1.5,
            Timestamp::from_secs(10.5),
        )
        .annotated(false, Some(f64::MAX));

        let value = SinkRecord::Interval(interval).to_json_value();
        assert_eq!(value["record_type"], "interval");
        assert_eq!(value["entity_class"], "roulette");
        assert_eq!(value["interval"], "x4-to-x5");
        assert_eq!(value["duration_seconds"], 1.5);
        assert_eq!(value["anomaly"], false);
        assert_eq!(value["anomaly_score"], f64::MAX);
    }

    #[test]
    fn test_diagnostic_record_shape() {
        let diag = Diagnostic::new(Severity::Info, DiagnosticKind::EntityEvicted, "idle")
            .with_context("entity", "tableapi:baccarat:BCR-01:r1");
        let record = SinkRecord::Diagnostic(diag);
        assert_eq!(record.class(), RecordClass::Diagnostics);
        assert_eq!(record.severity(), Severity::Info);

        let value = record.to_json_value();
        assert_eq!(value["record_type"], "diagnostic");
        assert_eq!(value["kind"], "entity_evicted");
        assert_eq!(value["context"]["entity"], "tableapi:baccarat:BCR-01:r1");
    }

    #[test]
    fn test_diagnostic_datetime_is_wall_clock() {
        let diag = Diagnostic::new(Severity::Warning, DiagnosticKind::SequenceGap, "gap")
            .at(Timestamp::from_secs(9.0));
        let value = SinkRecord::Diagnostic(diag).to_json_value();
        assert_eq!(value["timestamp"], 9.0);
        let datetime = value["datetime"].as_str().unwrap();
        assert!(!datetime.starts_with("1970"), "datetime {datetime}");
    }

    #[test]
    fn test_record_class_parse() {
        assert_eq!("intervals".parse::<RecordClass>().unwrap(), RecordClass::Intervals);
        assert!("metrics".parse::<RecordClass>().is_err());
    }
}
