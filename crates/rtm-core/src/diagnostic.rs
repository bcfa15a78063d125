//! Diagnostic records describing pipeline anomalies that are not intervals.

use crate::event::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Diagnostic severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Event rejected at the tracker boundary.
    MalformedEvent,
    /// Checkpoint arrived out of cycle order.
    SequenceGap,
    /// Entity progress dropped (idle or capacity).
    EntityEvicted,
    SinkDeliveryFailure,
    SubscriberFailure,
    QueueOverflow,
    ShutdownAbandoned,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedEvent => "malformed_event",
            Self::SequenceGap => "sequence_gap",
            Self::EntityEvicted => "entity_evicted",
            Self::SinkDeliveryFailure => "sink_delivery_failure",
            Self::SubscriberFailure => "subscriber_failure",
            Self::QueueOverflow => "queue_overflow",
            Self::ShutdownAbandoned => "shutdown_abandoned",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Producer time of the event that triggered the diagnostic, or the
    /// creation time when no event is involved.
    pub timestamp: Timestamp,
    /// Wall-clock time the diagnostic was raised.
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl Diagnostic {
    /// Create a diagnostic stamped with the current wall-clock time.
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            recorded_at: Utc::now(),
            severity,
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach the producer timestamp. `recorded_at` is left untouched.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_diagnostic_builder() {
        let diag = Diagnostic::new(Severity::Warning, DiagnosticKind::SequenceGap, "gap")
            .at(Timestamp::from_secs(9.0))
            .with_context("expected", "x3")
            .with_context("received", "x4");

        assert_eq!(diag.timestamp.as_secs(), 9.0);
        assert!(diag.recorded_at.timestamp() > 1_577_836_800);
        assert_eq!(diag.context.get("expected").map(String::as_str), Some("x3"));
        assert_eq!(diag.to_string(), "[warning] sequence_gap: gap");
    }
}
