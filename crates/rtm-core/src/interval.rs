//! Interval measurements between adjacent checkpoints.

use crate::entity::{CheckpointKind, EntityKey};
use crate::event::{Payload, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Measured duration between two adjacent checkpoints of one entity.
///
/// Created by the tracker with no anomaly annotation; the detector fills
/// `anomaly` and `anomaly_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Unique id; sinks use it to de-duplicate redeliveries.
    pub id: Uuid,
    pub entity_key: EntityKey,
    pub from_kind: CheckpointKind,
    pub to_kind: CheckpointKind,
    /// Seconds, never negative.
    pub duration: f64,
    /// Timestamp of the closing checkpoint.
    pub occurred_at: Timestamp,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    pub payload: Payload,
    pub anomaly: Option<bool>,
    pub anomaly_score: Option<f64>,
}

impl Interval {
    pub fn new(
        entity_key: EntityKey,
        from_kind: CheckpointKind,
        to_kind: CheckpointKind,
        duration: f64,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_key,
            from_kind,
            to_kind,
            duration: duration.max(0.0),
            occurred_at,
            recorded_at: Utc::now(),
            payload: Payload::new(),
            anomaly: None,
            anomaly_score: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Interval label, e.g. `start-to-betstop`.
    pub fn label(&self) -> String {
        format!("{}-to-{}", self.from_kind, self.to_kind)
    }

    /// Return a copy carrying the detector's verdict.
    pub fn annotated(&self, anomaly: bool, score: Option<f64>) -> Self {
        Self {
            anomaly: Some(anomaly),
            anomaly_score: score,
            ..self.clone()
        }
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomaly.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityClass;

    #[test]
    fn test_label_and_annotation() {
        let key = EntityKey::new(EntityClass::TableApi, "baccarat", "BCR-01", "r1");
        let interval = Interval::new(
            key,
            CheckpointKind::Start,
            CheckpointKind::BetStop,
            12.0,
            Timestamp::from_secs(12.0),
        );
        assert_eq!(interval.label(), "start-to-betstop");
        assert_eq!(interval.anomaly, None);

        let annotated = interval.annotated(true, Some(4.2));
        assert!(annotated.is_anomalous());
        assert_eq!(annotated.id, interval.id);
        assert_eq!(annotated.anomaly_score, Some(4.2));
    }

    #[test]
    fn test_negative_duration_clamped() {
        let key = EntityKey::new(EntityClass::SicboIdp, "sicbo", "SBO-01", "r1");
        let interval = Interval::new(
            key,
            CheckpointKind::IdpSend,
            CheckpointKind::IdpReceive,
            -0.5,
            Timestamp::from_secs(1.0),
        );
        assert_eq!(interval.duration, 0.0);
    }
}
