//! Per-entity cycle progress.

use rtm_core::{CheckpointKind, CycleTable, EntityKey, Timestamp};

/// Progress of one entity through its checkpoint cycle.
///
/// Owned exclusively by the tracker.
#[derive(Debug, Clone)]
pub struct EntityProgress {
    pub key: EntityKey,
    pub cycle: &'static CycleTable,
    /// Most recent accepted checkpoint. `None` while waiting for the cycle's
    /// first checkpoint after a restart.
    pub last: Option<(CheckpointKind, Timestamp)>,
    pub cycles_completed: u64,
    pub(crate) touched_seq: u64,
    pub(crate) touched_at_ms: u64,
}

impl EntityProgress {
    pub(crate) fn new(key: EntityKey, cycle: &'static CycleTable) -> Self {
        Self {
            key,
            cycle,
            last: None,
            cycles_completed: 0,
            touched_seq: 0,
            touched_at_ms: 0,
        }
    }

    /// Kind expected next, if any checkpoint has been accepted.
    pub fn expected_next(&self) -> Option<CheckpointKind> {
        self.last.and_then(|(kind, _)| self.cycle.successor(kind))
    }

    pub fn last_kind(&self) -> Option<CheckpointKind> {
        self.last.map(|(kind, _)| kind)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last.map(|(_, ts)| ts)
    }

    /// Whether an interval would be lost if this entity were dropped now.
    ///
    /// An entity resting on the cycle's final checkpoint has completed its
    /// round; only the wrap-around interval is pending.
    pub fn is_mid_cycle(&self) -> bool {
        match self.last_kind() {
            Some(kind) => self.cycle.kinds.last() != Some(&kind),
            None => false,
        }
    }

    /// Wall-clock millis of the last update.
    pub fn touched_at_ms(&self) -> u64 {
        self.touched_at_ms
    }
}
