//! Inbound checkpoint events.

use crate::entity::{CheckpointKind, EntityKey};
use crate::error::{CoreError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque producer attributes attached to a checkpoint (e.g. winning number).
pub type Payload = BTreeMap<String, serde_json::Value>;

/// High-resolution timestamp in seconds.
///
/// Producers supply their own clock; the pipeline only relies on the values
/// being comparable within one entity.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn from_millis(ms: u64) -> Self {
        Self(ms as f64 / 1000.0)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self(now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    /// Seconds elapsed since `earlier` (negative if `earlier` is later).
    pub fn seconds_since(&self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Immutable fact reported by a game engine or device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEvent {
    pub entity_key: EntityKey,
    pub kind: CheckpointKind,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: Payload,
}

impl CheckpointEvent {
    pub fn new(entity_key: EntityKey, kind: CheckpointKind, timestamp: Timestamp) -> Self {
        Self {
            entity_key,
            kind,
            timestamp,
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Structural validation that needs no tracker state.
    pub fn validate(&self) -> Result<()> {
        if !self.timestamp.is_finite() {
            return Err(CoreError::InvalidTimestamp(self.timestamp.as_secs().to_string()));
        }
        if self.kind.class() != self.entity_key.class {
            return Err(CoreError::KindClassMismatch {
                kind: self.kind.to_string(),
                class: self.entity_key.class.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityClass;

    fn key(class: EntityClass) -> EntityKey {
        EntityKey::new(class, "baccarat", "BCR-01", "round-1")
    }

    #[test]
    fn test_validate_rejects_foreign_kind() {
        let event = CheckpointEvent::new(
            key(EntityClass::TableApi),
            CheckpointKind::X3,
            Timestamp::from_secs(1.0),
        );
        assert!(matches!(
            event.validate(),
            Err(CoreError::KindClassMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let event = CheckpointEvent::new(
            key(EntityClass::TableApi),
            CheckpointKind::Start,
            Timestamp::from_secs(f64::NAN),
        );
        assert!(matches!(
            event.validate(),
            Err(CoreError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_timestamp_conversions() {
        assert_eq!(Timestamp::from_millis(1_500).as_secs(), 1.5);
        assert_eq!(Timestamp::from_secs(16.0).seconds_since(Timestamp::from_secs(14.5)), 1.5);
    }
}
