//! Router configuration and routing rules.

use std::collections::HashSet;
use std::time::Duration;

use rtm_core::{DynSink, RecordClass, Severity, SinkRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Period of each lane's delivery tick.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Capacity of each sink's queue.
    #[serde(default = "default_max_queue_depth_per_sink")]
    pub max_queue_depth_per_sink: usize,
    /// Records per `deliver` call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Delivery attempts per record before it is dropped.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    /// Bound on a single `deliver`, `flush` or `close` call.
    #[serde(default = "default_deliver_timeout_ms")]
    pub deliver_timeout_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    5_000
}

fn default_max_queue_depth_per_sink() -> usize {
    10_000
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_max_delivery_attempts() -> u32 {
    3
}

fn default_deliver_timeout_ms() -> u64 {
    10_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_queue_depth_per_sink: default_max_queue_depth_per_sink(),
            max_batch_size: default_max_batch_size(),
            max_delivery_attempts: default_max_delivery_attempts(),
            deliver_timeout_ms: default_deliver_timeout_ms(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be > 0".to_string());
        }
        if self.max_queue_depth_per_sink == 0 {
            return Err("max_queue_depth_per_sink must be > 0".to_string());
        }
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be > 0".to_string());
        }
        if self.max_delivery_attempts == 0 {
            return Err("max_delivery_attempts must be > 0".to_string());
        }
        if self.deliver_timeout_ms == 0 {
            return Err("deliver_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn deliver_timeout(&self) -> Duration {
        Duration::from_millis(self.deliver_timeout_ms)
    }
}

/// Which records a sink receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub accepts: HashSet<RecordClass>,
    /// Diagnostics below this severity are not routed.
    pub min_severity: Severity,
}

impl Default for RoutingRule {
    fn default() -> Self {
        Self {
            accepts: [RecordClass::Intervals, RecordClass::Diagnostics]
                .into_iter()
                .collect(),
            min_severity: Severity::Info,
        }
    }
}

impl RoutingRule {
    pub fn intervals_only() -> Self {
        Self {
            accepts: [RecordClass::Intervals].into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn diagnostics_only(min_severity: Severity) -> Self {
        Self {
            accepts: [RecordClass::Diagnostics].into_iter().collect(),
            min_severity,
        }
    }

    pub fn matches(&self, record: &SinkRecord) -> bool {
        if !self.accepts.contains(&record.class()) {
            return false;
        }
        match record {
            SinkRecord::Interval(_) => true,
            SinkRecord::Diagnostic(d) => d.severity >= self.min_severity,
        }
    }
}

/// A sink plus its routing rule.
#[derive(Clone)]
pub struct SinkRoute {
    pub sink: DynSink,
    pub rule: RoutingRule,
}

impl SinkRoute {
    pub fn new(sink: DynSink, rule: RoutingRule) -> Self {
        Self { sink, rule }
    }

    /// Route every record class to `sink`.
    pub fn all(sink: DynSink) -> Self {
        Self::new(sink, RoutingRule::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_core::{Diagnostic, DiagnosticKind};

    #[test]
    fn test_rule_filters_by_severity() {
        let rule = RoutingRule::diagnostics_only(Severity::Warning);
        let info = SinkRecord::Diagnostic(Diagnostic::new(
            Severity::Info,
            DiagnosticKind::EntityEvicted,
            "idle",
        ));
        let warning = SinkRecord::Diagnostic(Diagnostic::new(
            Severity::Warning,
            DiagnosticKind::SequenceGap,
            "gap",
        ));
        assert!(!rule.matches(&info));
        assert!(rule.matches(&warning));
    }

    #[test]
    fn test_config_validation() {
        assert!(RouterConfig::default().validate().is_ok());
        let config = RouterConfig {
            max_delivery_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
