//! Periodic interval summary.
//!
//! Reads the interval duration histogram back out of the registry and logs
//! per-interval percentiles together with anomaly counts.

use crate::metrics::{ANOMALIES_TOTAL, INTERVAL_DURATION_SECONDS};
use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use serde::Serialize;
use tracing::info;

/// Summary of one (entity class, interval) series.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalSummary {
    pub entity_class: String,
    pub interval: String,
    pub count: u64,
    pub mean_secs: f64,
    pub p50_secs: f64,
    pub p95_secs: f64,
    pub p99_secs: f64,
    pub anomalies: u64,
}

/// Interval summary reporter.
pub struct IntervalSummaryReporter {
    start_time: DateTime<Utc>,
}

impl Default for IntervalSummaryReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalSummaryReporter {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
        }
    }

    /// Current summaries for every series with at least one sample.
    pub fn get_summaries(&self) -> Vec<IntervalSummary> {
        let mut summaries = Vec::new();
        for mf in INTERVAL_DURATION_SECONDS.collect() {
            for m in mf.get_metric() {
                let mut entity_class = String::new();
                let mut interval = String::new();
                for pair in m.get_label() {
                    match pair.get_name() {
                        "entity_class" => entity_class = pair.get_value().to_string(),
                        "interval" => interval = pair.get_value().to_string(),
                        _ => {}
                    }
                }

                let h = m.get_histogram();
                let count = h.get_sample_count();
                if count == 0 {
                    continue;
                }
                let buckets = h.get_bucket();
                let anomalies = ANOMALIES_TOTAL
                    .with_label_values(&[entity_class.as_str(), interval.as_str()])
                    .get();

                summaries.push(IntervalSummary {
                    mean_secs: h.get_sample_sum() / count as f64,
                    p50_secs: percentile_from_buckets(buckets, count, 0.50),
                    p95_secs: percentile_from_buckets(buckets, count, 0.95),
                    p99_secs: percentile_from_buckets(buckets, count, 0.99),
                    entity_class,
                    interval,
                    count,
                    anomalies,
                });
            }
        }
        summaries.sort_by(|a, b| {
            (a.entity_class.as_str(), a.interval.as_str())
                .cmp(&(b.entity_class.as_str(), b.interval.as_str()))
        });
        summaries
    }

    /// Output the summary to logs.
    pub fn output_summary(&self) {
        let summaries = self.get_summaries();
        let duration = Utc::now() - self.start_time;

        info!("========== Interval Summary ==========");
        info!(
            "Since: {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            duration.num_hours(),
            duration.num_minutes() % 60
        );
        for s in &summaries {
            info!(
                "  {} {}: n={} mean={:.3}s P50={:.3}s P95={:.3}s P99={:.3}s anomalies={}",
                s.entity_class,
                s.interval,
                s.count,
                s.mean_secs,
                s.p50_secs,
                s.p95_secs,
                s.p99_secs,
                s.anomalies
            );
        }
        info!("======================================");
    }
}

/// Percentile from cumulative histogram buckets with linear interpolation.
fn percentile_from_buckets(
    buckets: &[prometheus::proto::Bucket],
    total_count: u64,
    percentile: f64,
) -> f64 {
    let target = ((total_count as f64 * percentile).ceil() as u64).max(1);
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for bucket in buckets {
        let upper_bound = bucket.get_upper_bound();
        let cumulative_count = bucket.get_cumulative_count();

        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    // Beyond the last finite bucket.
    buckets.last().map(|b| b.get_upper_bound()).unwrap_or(0.0)
}
