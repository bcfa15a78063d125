//! Checkpoint tracker.
//!
//! Follows every entity through its class's checkpoint cycle and derives
//! intervals between adjacent checkpoints.
//!
//! # Memory bound
//!
//! Progress is kept in a map keyed by entity plus a recency index ordered by
//! a monotonically increasing touch sequence. Inserting beyond
//! `max_tracked_entities` evicts the least-recently-updated entity first;
//! `evict_idle` walks the recency index oldest-first and stops at the first
//! entity that is still fresh.

use std::collections::{BTreeMap, HashMap};

use rtm_core::{
    CheckpointEvent, CheckpointKind, Clock, CoreError, CycleTable, Diagnostic, DiagnosticKind,
    EntityClass, EntityKey, Interval, Severity, SystemClock, Timestamp,
};
use rtm_telemetry::Metrics;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::{GapPolicy, TrackerConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::progress::EntityProgress;

/// How an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// First checkpoint for the entity (or first after a restart).
    Anchored,
    /// In-order successor; an interval was emitted.
    Interval,
    /// Same kind as the previous checkpoint; ignored.
    Duplicate,
    /// Out of cycle order; diagnostic emitted, progress handled per policy.
    Gap,
    /// Rejected as malformed; progress untouched.
    Rejected,
    /// Waiting for the cycle's first checkpoint; ignored.
    AwaitingCycleStart,
}

/// Result of observing one checkpoint event.
#[derive(Debug, Clone)]
pub struct Observation {
    pub outcome: ObserveOutcome,
    pub interval: Option<Interval>,
    /// Gap, rejection and eviction diagnostics caused by this event.
    pub diagnostics: Vec<Diagnostic>,
}

impl Observation {
    fn new(outcome: ObserveOutcome) -> Self {
        Self {
            outcome,
            interval: None,
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub events: u64,
    pub intervals: u64,
    pub duplicates: u64,
    pub gaps: u64,
    pub rejected: u64,
    pub evicted_idle: u64,
    pub evicted_capacity: u64,
    pub cycles_completed: u64,
}

/// Per-entity checkpoint tracker.
pub struct CheckpointTracker<C: Clock = SystemClock> {
    config: TrackerConfig,
    cycles: HashMap<EntityClass, &'static CycleTable>,
    entities: HashMap<EntityKey, EntityProgress>,
    recency: BTreeMap<u64, EntityKey>,
    next_seq: u64,
    clock: C,
    stats: TrackerStats,
}

impl CheckpointTracker<SystemClock> {
    pub fn new(config: TrackerConfig) -> TrackerResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CheckpointTracker<C> {
    pub fn with_clock(config: TrackerConfig, clock: C) -> TrackerResult<Self> {
        config.validate().map_err(TrackerError::InvalidConfig)?;
        let cycles = config
            .enabled_classes
            .iter()
            .map(|class| (*class, class.cycle()))
            .collect();
        Ok(Self {
            config,
            cycles,
            entities: HashMap::new(),
            recency: BTreeMap::new(),
            next_seq: 0,
            clock,
            stats: TrackerStats::default(),
        })
    }

    /// Process one checkpoint event.
    pub fn observe(&mut self, event: &CheckpointEvent) -> Observation {
        self.stats.events += 1;
        let class = event.entity_key.class;
        Metrics::checkpoint_observed(class.as_str(), event.kind.as_str());

        if let Err(e) = event.validate() {
            let reason = match e {
                CoreError::InvalidTimestamp(_) => "invalid_timestamp",
                _ => "kind_mismatch",
            };
            return self.reject(event, reason, e.to_string());
        }
        let Some(cycle) = self.cycles.get(&class).copied() else {
            return self.reject(
                event,
                "class_disabled",
                format!("entity class {class} is not enabled"),
            );
        };

        let key = self.tracking_key(&event.entity_key);
        let mut observation = Observation::new(ObserveOutcome::Anchored);

        if !self.entities.contains_key(&key) {
            if self.entities.len() >= self.config.max_tracked_entities {
                if let Some(diag) = self.evict_lru() {
                    observation.diagnostics.push(diag);
                }
            }
            self.entities
                .insert(key.clone(), EntityProgress::new(key.clone(), cycle));
        }

        let Some(progress) = self.entities.get(&key) else {
            return observation;
        };
        let last = progress.last;

        match last {
            None => {
                if progress.cycles_completed > 0 || progress.touched_seq > 0 {
                    // Restarted after a gap: only the cycle's first kind re-anchors.
                    if event.kind != cycle.first() {
                        trace!(entity = %key, kind = %event.kind, "Awaiting cycle start");
                        observation.outcome = ObserveOutcome::AwaitingCycleStart;
                        return observation;
                    }
                }
                self.set_last(&key, event.kind, event.timestamp);
                trace!(entity = %key, kind = %event.kind, "Entity anchored");
                observation.outcome = ObserveOutcome::Anchored;
            }
            Some((prev_kind, _)) if prev_kind == event.kind => {
                self.stats.duplicates += 1;
                Metrics::duplicate_checkpoint(class.as_str());
                trace!(entity = %key, kind = %event.kind, "Duplicate checkpoint ignored");
                observation.outcome = ObserveOutcome::Duplicate;
            }
            Some((_, prev_ts)) if event.timestamp < prev_ts => {
                let mut rejected = self.reject(
                    event,
                    "non_monotonic",
                    format!(
                        "timestamp {} precedes previous checkpoint at {}",
                        event.timestamp, prev_ts
                    ),
                );
                observation.diagnostics.append(&mut rejected.diagnostics);
                observation.outcome = ObserveOutcome::Rejected;
            }
            Some((prev_kind, prev_ts)) if cycle.successor(prev_kind) == Some(event.kind) => {
                let interval = Interval::new(
                    event.entity_key.clone(),
                    prev_kind,
                    event.kind,
                    event.timestamp.seconds_since(prev_ts),
                    event.timestamp,
                )
                .with_payload(event.payload.clone());

                self.stats.intervals += 1;
                Metrics::interval_emitted(class.as_str(), &interval.label());
                debug!(
                    entity = %event.entity_key,
                    interval = %interval.label(),
                    duration = interval.duration,
                    "Interval measured"
                );

                if event.kind == cycle.first() {
                    self.stats.cycles_completed += 1;
                    if let Some(p) = self.entities.get_mut(&key) {
                        p.cycles_completed += 1;
                    }
                    trace!(entity = %key, "Cycle completed, re-anchored at cycle start");
                }
                self.set_last(&key, event.kind, event.timestamp);
                observation.interval = Some(interval);
                observation.outcome = ObserveOutcome::Interval;
            }
            Some((prev_kind, _)) => {
                let expected = cycle.successor(prev_kind);
                self.stats.gaps += 1;
                Metrics::sequence_gap(class.as_str());

                let expected_str = expected.map(|k| k.as_str()).unwrap_or("?");
                let diag = Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::SequenceGap,
                    format!(
                        "expected {} after {}, received {}",
                        expected_str, prev_kind, event.kind
                    ),
                )
                .at(event.timestamp)
                .with_context("entity", &event.entity_key)
                .with_context("previous", prev_kind)
                .with_context("expected", expected_str)
                .with_context("received", event.kind)
                .with_context("policy", format!("{:?}", self.config.gap_policy));
                debug!(entity = %key, %diag, "Sequence gap");
                observation.diagnostics.push(diag);
                observation.outcome = ObserveOutcome::Gap;

                match self.config.gap_policy {
                    GapPolicy::Resync => self.set_last(&key, event.kind, event.timestamp),
                    GapPolicy::RestartCycle => {
                        if event.kind == cycle.first() {
                            self.set_last(&key, event.kind, event.timestamp);
                        } else {
                            if let Some(p) = self.entities.get_mut(&key) {
                                p.last = None;
                            }
                            self.touch(&key);
                        }
                    }
                }
            }
        }

        Metrics::tracked_entities(self.entities.len());
        observation
    }

    /// Record a checkpoint whose kind could not be parsed.
    pub fn reject_unparsed(
        &mut self,
        entity_key: &EntityKey,
        raw_kind: &str,
        timestamp: Timestamp,
    ) -> Diagnostic {
        self.stats.events += 1;
        self.stats.rejected += 1;
        Metrics::event_rejected("unknown_kind");
        warn!(entity = %entity_key, kind = raw_kind, "Rejected checkpoint with unknown kind");
        Diagnostic::new(
            Severity::Warning,
            DiagnosticKind::MalformedEvent,
            format!("unknown checkpoint kind '{raw_kind}' for class {}", entity_key.class),
        )
        .at(timestamp)
        .with_context("entity", entity_key)
        .with_context("reason", "unknown_kind")
    }

    /// Evict every entity idle longer than the configured timeout.
    pub fn evict_idle(&mut self) -> Vec<Diagnostic> {
        let now_ms = self.clock.now_ms();
        let timeout_ms = self.config.idle_timeout_ms();
        let mut diagnostics = Vec::new();

        loop {
            let Some((_, key)) = self.recency.first_key_value() else {
                break;
            };
            let Some(progress) = self.entities.get(key) else {
                break;
            };
            if now_ms.saturating_sub(progress.touched_at_ms) <= timeout_ms {
                break;
            }
            let key = key.clone();
            if let Some(diag) = self.evict(&key, "idle") {
                diagnostics.push(diag);
            }
        }

        if !diagnostics.is_empty() {
            info!(
                evicted = diagnostics.len(),
                remaining = self.entities.len(),
                "Evicted idle entities"
            );
            Metrics::tracked_entities(self.entities.len());
        }
        diagnostics
    }

    pub fn tracked_entities(&self) -> usize {
        self.entities.len()
    }

    /// Progress for an entity key as supplied by producers.
    pub fn progress(&self, entity_key: &EntityKey) -> Option<&EntityProgress> {
        self.entities.get(&self.tracking_key(entity_key))
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Registered cycle for a class, if enabled.
    pub fn cycle(&self, class: EntityClass) -> Option<&'static CycleTable> {
        self.cycles.get(&class).copied()
    }

    fn tracking_key(&self, entity_key: &EntityKey) -> EntityKey {
        if self.config.round_scoped {
            entity_key.clone()
        } else {
            entity_key.without_round()
        }
    }

    fn set_last(&mut self, key: &EntityKey, kind: CheckpointKind, timestamp: Timestamp) {
        if let Some(p) = self.entities.get_mut(key) {
            p.last = Some((kind, timestamp));
        }
        self.touch(key);
    }

    fn touch(&mut self, key: &EntityKey) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let now_ms = self.clock.now_ms();
        if let Some(p) = self.entities.get_mut(key) {
            if p.touched_seq != 0 {
                self.recency.remove(&p.touched_seq);
            }
            p.touched_seq = seq;
            p.touched_at_ms = now_ms;
            self.recency.insert(seq, key.clone());
        }
    }

    fn evict_lru(&mut self) -> Option<Diagnostic> {
        let key = self.recency.first_key_value().map(|(_, k)| k.clone())?;
        self.evict(&key, "capacity")
    }

    fn evict(&mut self, key: &EntityKey, reason: &str) -> Option<Diagnostic> {
        let progress = self.entities.remove(key)?;
        self.recency.remove(&progress.touched_seq);
        match reason {
            "idle" => self.stats.evicted_idle += 1,
            _ => self.stats.evicted_capacity += 1,
        }
        Metrics::entity_evicted(reason);

        // Entities resting at the end of their cycle lose nothing of interest.
        let severity = if progress.is_mid_cycle() {
            Severity::Info
        } else {
            Severity::Debug
        };
        let pending = progress
            .last_kind()
            .map(|k| k.as_str())
            .unwrap_or("none");
        debug!(entity = %key, reason, pending, "Entity evicted");

        Some(
            Diagnostic::new(
                severity,
                DiagnosticKind::EntityEvicted,
                format!("entity evicted ({reason}), pending checkpoint {pending} discarded"),
            )
            .at(Timestamp::from_millis(self.clock.now_ms()))
            .with_context("entity", key)
            .with_context("reason", reason)
            .with_context("pending", pending),
        )
    }

    fn reject(&mut self, event: &CheckpointEvent, reason: &str, message: String) -> Observation {
        self.stats.rejected += 1;
        Metrics::event_rejected(reason);
        warn!(
            entity = %event.entity_key,
            kind = %event.kind,
            reason,
            "Rejected malformed checkpoint"
        );
        let diag = Diagnostic::new(Severity::Warning, DiagnosticKind::MalformedEvent, message)
            .at(if event.timestamp.is_finite() {
                event.timestamp
            } else {
                Timestamp::now()
            })
            .with_context("entity", &event.entity_key)
            .with_context("kind", event.kind)
            .with_context("reason", reason);
        let mut observation = Observation::new(ObserveOutcome::Rejected);
        observation.diagnostics.push(diag);
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_core::ManualClock;
    use std::sync::Arc;

    const BASE_MS: u64 = 1_700_000_000_000;

    fn table_key(round: &str) -> EntityKey {
        EntityKey::new(EntityClass::TableApi, "baccarat", "BCR-01", round)
    }

    fn roulette_key() -> EntityKey {
        EntityKey::new(EntityClass::Roulette, "roulette", "ARO-001", "")
    }

    fn event(key: &EntityKey, kind: CheckpointKind, ts: f64) -> CheckpointEvent {
        CheckpointEvent::new(key.clone(), kind, Timestamp::from_secs(ts))
    }

    fn tracker(config: TrackerConfig) -> (CheckpointTracker<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(BASE_MS));
        let tracker = CheckpointTracker::with_clock(config, Arc::clone(&clock)).unwrap();
        (tracker, clock)
    }

    fn intervals_of(
        tracker: &mut CheckpointTracker<Arc<ManualClock>>,
        events: &[CheckpointEvent],
    ) -> Vec<(CheckpointKind, CheckpointKind, f64)> {
        events
            .iter()
            .filter_map(|e| tracker.observe(e).interval)
            .map(|i| (i.from_kind, i.to_kind, i.duration))
            .collect()
    }

    #[test]
    fn test_tableapi_round() {
        let (mut t, _) = tracker(TrackerConfig::default());
        let key = table_key("r1");
        let got = intervals_of(
            &mut t,
            &[
                event(&key, CheckpointKind::Start, 0.0),
                event(&key, CheckpointKind::BetStop, 12.0),
                event(&key, CheckpointKind::Deal, 14.5),
                event(&key, CheckpointKind::Finish, 16.0),
            ],
        );

        assert_eq!(
            got,
            vec![
                (CheckpointKind::Start, CheckpointKind::BetStop, 12.0),
                (CheckpointKind::BetStop, CheckpointKind::Deal, 2.5),
                (CheckpointKind::Deal, CheckpointKind::Finish, 1.5),
            ]
        );
        assert_eq!(t.stats().intervals, 3);
    }

    #[test]
    fn test_roulette_gap_resyncs() {
        let (mut t, _) = tracker(TrackerConfig::default());
        let key = roulette_key();

        assert_eq!(
            t.observe(&event(&key, CheckpointKind::X2, 0.0)).outcome,
            ObserveOutcome::Anchored
        );

        let gap = t.observe(&event(&key, CheckpointKind::X4, 9.0));
        assert_eq!(gap.outcome, ObserveOutcome::Gap);
        assert!(gap.interval.is_none());
        assert_eq!(gap.diagnostics.len(), 1);
        let diag = &gap.diagnostics[0];
        assert_eq!(diag.kind, DiagnosticKind::SequenceGap);
        assert_eq!(diag.context.get("expected").map(String::as_str), Some("x3"));
        assert_eq!(diag.context.get("received").map(String::as_str), Some("x4"));

        let progress = t.progress(&key).unwrap();
        assert_eq!(
            progress.last,
            Some((CheckpointKind::X4, Timestamp::from_secs(9.0)))
        );

        let next = t.observe(&event(&key, CheckpointKind::X5, 10.5));
        let interval = next.interval.unwrap();
        assert_eq!(
            (interval.from_kind, interval.to_kind, interval.duration),
            (CheckpointKind::X4, CheckpointKind::X5, 1.5)
        );
    }

    #[test]
    fn test_restart_cycle_policy_waits_for_first_kind() {
        let config = TrackerConfig {
            gap_policy: GapPolicy::RestartCycle,
            ..Default::default()
        };
        let (mut t, _) = tracker(config);
        let key = roulette_key();

        t.observe(&event(&key, CheckpointKind::X2, 0.0));
        assert_eq!(
            t.observe(&event(&key, CheckpointKind::X4, 9.0)).outcome,
            ObserveOutcome::Gap
        );
        assert_eq!(t.progress(&key).unwrap().last, None);
        assert_eq!(
            t.observe(&event(&key, CheckpointKind::X5, 10.5)).outcome,
            ObserveOutcome::AwaitingCycleStart
        );
        assert_eq!(
            t.observe(&event(&key, CheckpointKind::X2, 20.0)).outcome,
            ObserveOutcome::Anchored
        );
        let next = t.observe(&event(&key, CheckpointKind::X3, 21.0));
        assert_eq!(next.interval.map(|i| i.duration), Some(1.0));
    }

    #[test]
    fn test_duplicate_does_not_move_timestamp() {
        let (mut t, _) = tracker(TrackerConfig::default());
        let key = table_key("r1");
        t.observe(&event(&key, CheckpointKind::Start, 0.0));

        let dup = t.observe(&event(&key, CheckpointKind::Start, 5.0));
        assert_eq!(dup.outcome, ObserveOutcome::Duplicate);
        assert!(dup.interval.is_none());

        let next = t.observe(&event(&key, CheckpointKind::BetStop, 12.0));
        assert_eq!(next.interval.unwrap().duration, 12.0);
    }

    #[test]
    fn test_replaying_event_is_idempotent() {
        let (mut once, _) = tracker(TrackerConfig::default());
        let (mut twice, _) = tracker(TrackerConfig::default());
        let key = table_key("r1");
        let events = [
            event(&key, CheckpointKind::Start, 0.0),
            event(&key, CheckpointKind::BetStop, 12.0),
        ];

        for e in &events {
            once.observe(e);
            twice.observe(e);
            twice.observe(e);
        }

        let a = once.progress(&key).unwrap();
        let b = twice.progress(&key).unwrap();
        assert_eq!(a.last, b.last);
        assert_eq!(a.cycles_completed, b.cycles_completed);
        assert_eq!(once.stats().intervals, twice.stats().intervals);
        assert_eq!(once.tracked_entities(), twice.tracked_entities());
    }

    #[test]
    fn test_non_monotonic_rejected_without_mutation() {
        let (mut t, _) = tracker(TrackerConfig::default());
        let key = table_key("r1");
        t.observe(&event(&key, CheckpointKind::Start, 10.0));

        let obs = t.observe(&event(&key, CheckpointKind::BetStop, 9.0));
        assert_eq!(obs.outcome, ObserveOutcome::Rejected);
        assert_eq!(obs.diagnostics[0].kind, DiagnosticKind::MalformedEvent);
        assert_eq!(
            t.progress(&key).unwrap().last,
            Some((CheckpointKind::Start, Timestamp::from_secs(10.0)))
        );
    }

    #[test]
    fn test_foreign_kind_rejected_without_creating_entity() {
        let (mut t, _) = tracker(TrackerConfig::default());
        let key = table_key("r1");

        let obs = t.observe(&event(&key, CheckpointKind::X2, 1.0));
        assert_eq!(obs.outcome, ObserveOutcome::Rejected);
        assert_eq!(t.tracked_entities(), 0);
        assert_eq!(t.stats().rejected, 1);
    }

    #[test]
    fn test_disabled_class_rejected() {
        let config = TrackerConfig {
            enabled_classes: vec![EntityClass::TableApi],
            ..Default::default()
        };
        let (mut t, _) = tracker(config);
        let obs = t.observe(&event(&roulette_key(), CheckpointKind::X2, 1.0));
        assert_eq!(obs.outcome, ObserveOutcome::Rejected);
        assert!(t.cycle(EntityClass::Roulette).is_none());
    }

    #[test]
    fn test_cycle_wrap_emits_interval_and_counts_cycle() {
        let config = TrackerConfig {
            round_scoped: false,
            ..Default::default()
        };
        let (mut t, _) = tracker(config);
        let r1 = table_key("r1");
        let r2 = table_key("r2");

        t.observe(&event(&r1, CheckpointKind::Start, 0.0));
        t.observe(&event(&r1, CheckpointKind::BetStop, 12.0));
        t.observe(&event(&r1, CheckpointKind::Deal, 14.0));
        t.observe(&event(&r1, CheckpointKind::Finish, 16.0));
        let wrap = t.observe(&event(&r2, CheckpointKind::Start, 20.0));

        let interval = wrap.interval.unwrap();
        assert_eq!(interval.from_kind, CheckpointKind::Finish);
        assert_eq!(interval.to_kind, CheckpointKind::Start);
        assert_eq!(interval.duration, 4.0);
        // Emitted interval keeps the closing checkpoint's round.
        assert_eq!(interval.entity_key.round_id, "r2");
        assert_eq!(t.progress(&r2).unwrap().cycles_completed, 1);
        assert_eq!(t.tracked_entities(), 1);
    }

    #[test]
    fn test_lru_eviction_bound() {
        let config = TrackerConfig {
            max_tracked_entities: 3,
            ..Default::default()
        };
        let (mut t, _) = tracker(config);
        let keys: Vec<_> = (0..4).map(|i| table_key(&format!("r{i}"))).collect();

        for (i, key) in keys.iter().take(3).enumerate() {
            t.observe(&event(key, CheckpointKind::Start, i as f64));
        }
        // Refresh r0 so r1 becomes least recently updated.
        t.observe(&event(&keys[0], CheckpointKind::BetStop, 5.0));

        let obs = t.observe(&event(&keys[3], CheckpointKind::Start, 6.0));
        assert_eq!(t.tracked_entities(), 3);
        assert!(t.progress(&keys[1]).is_none());
        assert!(t.progress(&keys[0]).is_some());
        assert_eq!(obs.diagnostics.len(), 1);
        assert_eq!(obs.diagnostics[0].kind, DiagnosticKind::EntityEvicted);
        assert_eq!(obs.diagnostics[0].severity, Severity::Info);
        assert_eq!(t.stats().evicted_capacity, 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let config = TrackerConfig {
            max_tracked_entities: 10,
            ..Default::default()
        };
        let (mut t, _) = tracker(config);
        for i in 0..100 {
            t.observe(&event(&table_key(&format!("r{i}")), CheckpointKind::Start, 0.0));
            assert!(t.tracked_entities() <= 10);
        }
        assert_eq!(t.stats().evicted_capacity, 90);
    }

    #[test]
    fn test_idle_eviction() {
        let config = TrackerConfig {
            entity_idle_timeout_secs: 60,
            ..Default::default()
        };
        let (mut t, clock) = tracker(config);
        let stale = table_key("stale");
        let fresh = table_key("fresh");

        t.observe(&event(&stale, CheckpointKind::Start, 0.0));
        clock.advance(45_000);
        t.observe(&event(&fresh, CheckpointKind::Start, 45.0));
        clock.advance(30_000);

        let diags = t.evict_idle();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].context.get("reason").map(String::as_str), Some("idle"));
        assert!(t.progress(&stale).is_none());
        assert!(t.progress(&fresh).is_some());

        // Evicted entity starts over: no interval spanning the eviction.
        let obs = t.observe(&event(&stale, CheckpointKind::BetStop, 80.0));
        assert_eq!(obs.outcome, ObserveOutcome::Anchored);
        assert!(obs.interval.is_none());
    }

    #[test]
    fn test_unparsed_kind_diagnostic() {
        let (mut t, _) = tracker(TrackerConfig::default());
        let diag = t.reject_unparsed(&table_key("r1"), "shuffle", Timestamp::from_secs(1.0));
        assert_eq!(diag.kind, DiagnosticKind::MalformedEvent);
        assert!(diag.message.contains("shuffle"));
        assert_eq!(t.stats().rejected, 1);
    }
}
