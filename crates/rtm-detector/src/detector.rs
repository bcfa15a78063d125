//! Rolling z-score anomaly detector.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use rtm_core::{CheckpointKind, EntityClass, Interval};
use rtm_telemetry::Metrics;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult};
use crate::rolling::RollingStat;

/// Relative tolerance for "same duration" when the window has no spread.
const ZERO_SPREAD_TOLERANCE: f64 = 1e-9;

/// Baseline key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatKey {
    pub class: EntityClass,
    pub from_kind: CheckpointKind,
    pub to_kind: CheckpointKind,
    /// Set only when per-table baselines are enabled.
    pub table: Option<String>,
}

impl StatKey {
    pub fn interval_label(&self) -> String {
        format!("{}-to-{}", self.from_kind, self.to_kind)
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-to-{}", self.class, self.from_kind, self.to_kind)?;
        if let Some(table) = &self.table {
            write!(f, "@{table}")?;
        }
        Ok(())
    }
}

/// Snapshot of one baseline.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalStatistics {
    pub key: String,
    pub entity_class: EntityClass,
    pub interval: String,
    pub table: Option<String>,
    /// Samples ever observed.
    pub count: u64,
    pub window_len: usize,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub anomalies: u64,
}

struct Baseline {
    stat: RollingStat,
    anomalies: u64,
    /// Annotated copies tagged with their arrival sequence.
    recent: VecDeque<(u64, Interval)>,
}

/// Classifies intervals against rolling per-kind baselines.
pub struct AnomalyDetector {
    config: DetectorConfig,
    baselines: HashMap<StatKey, Baseline>,
    seq: u64,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> DetectorResult<Self> {
        config.validate().map_err(DetectorError::InvalidConfig)?;
        Ok(Self {
            config,
            baselines: HashMap::new(),
            seq: 0,
        })
    }

    /// Classify `interval` against its baseline, then add it to the baseline.
    ///
    /// Returns a copy with `anomaly` set. During warm-up (fewer than
    /// `anomaly_min_samples` in the window) the interval is never anomalous
    /// and carries no score.
    pub fn annotate(&mut self, interval: &Interval) -> Interval {
        let key = self.key_for(interval);
        let min_samples = self.config.anomaly_min_samples;
        let threshold = self.config.anomaly_score_threshold;
        let capacity = self.config.rolling_window_size;
        let recent_kept = self.config.recent_intervals_kept;

        let baseline = self.baselines.entry(key).or_insert_with(|| Baseline {
            stat: RollingStat::new(capacity),
            anomalies: 0,
            recent: VecDeque::with_capacity(recent_kept.min(capacity)),
        });

        let (anomalous, score) = if baseline.stat.len() < min_samples {
            (false, None)
        } else {
            let score = z_score(interval.duration, baseline.stat.mean(), baseline.stat.stddev());
            (score > threshold, Some(score))
        };

        if anomalous {
            baseline.anomalies += 1;
            info!(
                entity = %interval.entity_key,
                interval = %interval.label(),
                duration = interval.duration,
                mean = baseline.stat.mean(),
                stddev = baseline.stat.stddev(),
                score,
                "Anomalous interval"
            );
        } else {
            debug!(
                interval = %interval.label(),
                duration = interval.duration,
                ?score,
                "Interval within baseline"
            );
        }
        baseline.stat.push(interval.duration);

        let label = interval.label();
        Metrics::interval_observed(
            interval.entity_key.class.as_str(),
            &label,
            interval.duration,
            score,
            anomalous,
        );

        let annotated = interval.annotated(anomalous, score);
        if baseline.recent.len() == recent_kept {
            baseline.recent.pop_front();
        }
        self.seq += 1;
        baseline.recent.push_back((self.seq, annotated.clone()));
        annotated
    }

    /// The most recent annotated intervals, oldest first.
    ///
    /// `interval_label` (e.g. `start-to-betstop`) restricts the result to one
    /// interval kind; `None` spans every baseline. At most `limit` intervals
    /// are returned, and each baseline contributes at most
    /// `recent_intervals_kept`.
    pub fn recent_intervals(&self, interval_label: Option<&str>, limit: usize) -> Vec<Interval> {
        let mut recent: Vec<&(u64, Interval)> = self
            .baselines
            .iter()
            .filter(|(key, _)| interval_label.map_or(true, |l| key.interval_label() == l))
            .flat_map(|(_, baseline)| baseline.recent.iter())
            .collect();
        recent.sort_unstable_by_key(|(seq, _)| *seq);
        let skip = recent.len().saturating_sub(limit);
        recent
            .into_iter()
            .skip(skip)
            .map(|(_, interval)| interval.clone())
            .collect()
    }

    /// Snapshot of every baseline, sorted by key.
    pub fn statistics(&self) -> Vec<IntervalStatistics> {
        let mut keys: Vec<&StatKey> = self.baselines.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| {
                let baseline = self.baselines.get(key)?;
                let stat = &baseline.stat;
                Some(IntervalStatistics {
                    key: key.to_string(),
                    entity_class: key.class,
                    interval: key.interval_label(),
                    table: key.table.clone(),
                    count: stat.total(),
                    window_len: stat.len(),
                    mean: stat.mean(),
                    stddev: stat.stddev(),
                    min: stat.min().unwrap_or(0.0),
                    max: stat.max().unwrap_or(0.0),
                    anomalies: baseline.anomalies,
                })
            })
            .collect()
    }

    pub fn baseline_count(&self) -> usize {
        self.baselines.len()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn key_for(&self, interval: &Interval) -> StatKey {
        StatKey {
            class: interval.entity_key.class,
            from_kind: interval.from_kind,
            to_kind: interval.to_kind,
            table: self
                .config
                .per_table_baselines
                .then(|| interval.entity_key.entity_id.clone()),
        }
    }
}

/// `|x - mean| / stddev`, with a zero-spread window scoring exact matches 0
/// and any deviation as maximally anomalous.
fn z_score(x: f64, mean: f64, stddev: f64) -> f64 {
    let deviation = (x - mean).abs();
    let scale = mean.abs().max(1.0);
    if stddev <= ZERO_SPREAD_TOLERANCE * scale {
        if deviation <= ZERO_SPREAD_TOLERANCE * scale {
            0.0
        } else {
            f64::MAX
        }
    } else {
        deviation / stddev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_core::{EntityKey, Timestamp};

    fn interval(table: &str, duration: f64) -> Interval {
        Interval::new(
            EntityKey::new(EntityClass::TableApi, "baccarat", table, "r1"),
            CheckpointKind::Start,
            CheckpointKind::BetStop,
            duration,
            Timestamp::from_secs(duration),
        )
    }

    fn detector(min_samples: usize) -> AnomalyDetector {
        AnomalyDetector::new(DetectorConfig {
            rolling_window_size: 50,
            anomaly_min_samples: min_samples,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_no_anomaly_during_warm_up() {
        let mut d = detector(10);
        for i in 0..10 {
            // Wildly varying durations, still warm-up.
            let out = d.annotate(&interval("T1", if i % 2 == 0 { 1.0 } else { 1000.0 }));
            assert_eq!(out.anomaly, Some(false));
            assert_eq!(out.anomaly_score, None);
        }
    }

    #[test]
    fn test_identical_baseline_scores_zero_and_flags_outlier() {
        let mut d = detector(10);
        for _ in 0..10 {
            d.annotate(&interval("T1", 12.0));
        }

        let same = d.annotate(&interval("T1", 12.0));
        assert_eq!(same.anomaly, Some(false));
        assert_eq!(same.anomaly_score, Some(0.0));

        let outlier = d.annotate(&interval("T1", 12_000.0));
        assert_eq!(outlier.anomaly, Some(true));
        assert!(outlier.anomaly_score.unwrap() > 3.0);
    }

    #[test]
    fn test_z_score_threshold() {
        let mut d = detector(5);
        for x in [10.0, 11.0, 9.0, 10.0, 10.0, 11.0, 9.0, 10.0] {
            d.annotate(&interval("T1", x));
        }
        // mean 10, sample stddev ~0.756
        let normal = d.annotate(&interval("T1", 11.0));
        assert_eq!(normal.anomaly, Some(false));

        let far = d.annotate(&interval("T1", 14.0));
        assert_eq!(far.anomaly, Some(true));
        let score = far.anomaly_score.unwrap();
        assert!(score > 3.0 && score < 10.0, "score {score}");
    }

    #[test]
    fn test_classify_before_insert() {
        let mut d = detector(3);
        for _ in 0..3 {
            d.annotate(&interval("T1", 5.0));
        }
        // Scored against the three 5.0s only, not against itself.
        let out = d.annotate(&interval("T1", 6.0));
        assert_eq!(out.anomaly_score, Some(f64::MAX));
        assert_eq!(d.statistics()[0].window_len, 4);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut d = detector(3);
        for _ in 0..3 {
            d.annotate(&interval("T1", 5.0));
        }
        let other = Interval::new(
            EntityKey::new(EntityClass::TableApi, "baccarat", "T1", "r1"),
            CheckpointKind::BetStop,
            CheckpointKind::Deal,
            50.0,
            Timestamp::from_secs(55.0),
        );
        let out = d.annotate(&other);
        assert_eq!(out.anomaly_score, None);
        assert_eq!(d.baseline_count(), 2);
    }

    #[test]
    fn test_per_table_baselines() {
        let mut d = AnomalyDetector::new(DetectorConfig {
            rolling_window_size: 10,
            anomaly_min_samples: 3,
            per_table_baselines: true,
            ..Default::default()
        })
        .unwrap();
        for _ in 0..3 {
            d.annotate(&interval("T1", 5.0));
        }
        // T2 has its own, still empty, baseline.
        assert_eq!(d.annotate(&interval("T2", 500.0)).anomaly, Some(false));
        let stats = d.statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].table.as_deref(), Some("T1"));
        assert_eq!(stats[0].key, "tableapi/start-to-betstop@T1");
    }

    #[test]
    fn test_statistics_snapshot() {
        let mut d = detector(2);
        for x in [1.0, 2.0, 3.0] {
            d.annotate(&interval("T1", x));
        }
        let s = &d.statistics()[0];
        assert_eq!(s.count, 3);
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 3.0);
        assert!((s.stddev - 1.0).abs() < 1e-12);
        assert_eq!(s.interval, "start-to-betstop");
    }

    #[test]
    fn test_recent_intervals_filtered_and_ordered() {
        let mut d = AnomalyDetector::new(DetectorConfig {
            rolling_window_size: 10,
            anomaly_min_samples: 2,
            recent_intervals_kept: 3,
            ..Default::default()
        })
        .unwrap();
        for x in [1.0, 2.0, 3.0, 4.0] {
            d.annotate(&interval("T1", x));
        }
        let other = Interval::new(
            EntityKey::new(EntityClass::TableApi, "baccarat", "T1", "r2"),
            CheckpointKind::BetStop,
            CheckpointKind::Deal,
            50.0,
            Timestamp::from_secs(55.0),
        );
        d.annotate(&other);

        let all = d.recent_intervals(None, 10);
        let durations: Vec<f64> = all.iter().map(|i| i.duration).collect();
        assert_eq!(durations, vec![2.0, 3.0, 4.0, 50.0]);
        assert!(all.iter().all(|i| i.anomaly.is_some()));

        let limited = d.recent_intervals(Some("start-to-betstop"), 2);
        let durations: Vec<f64> = limited.iter().map(|i| i.duration).collect();
        assert_eq!(durations, vec![3.0, 4.0]);
        assert!(d.recent_intervals(Some("deal-to-finish"), 10).is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = AnomalyDetector::new(DetectorConfig {
            rolling_window_size: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(DetectorError::InvalidConfig(_))));
    }
}
