//! Prometheus self-metrics for the round-time monitor.
//!
//! Covers every pipeline stage:
//! - Event bus publishes, overflow drops and handler failures
//! - Checkpoint tracker intervals, gaps, rejections and evictions
//! - Interval duration distribution and anomalies
//! - Per-sink delivery, failures, drops and queue depth
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, CounterVec, GaugeVec,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

// =============================================================================
// Event bus
// =============================================================================

/// Events published per topic.
pub static BUS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_bus_published_total",
        "Total events published on the bus",
        &["topic"]
    )
    .unwrap()
});

/// Events dropped because a subscriber queue was full (drop-oldest).
pub static BUS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_bus_dropped_total",
        "Total events dropped from full subscriber queues",
        &["topic"]
    )
    .unwrap()
});

/// Subscriber handler failures (error return or panic).
pub static BUS_HANDLER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_bus_handler_failures_total",
        "Total subscriber handler failures",
        &["topic"]
    )
    .unwrap()
});

/// Publishes rejected because the pipeline was not accepting events.
pub static PUBLISH_REJECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "rtm_publish_rejected_total",
        "Checkpoint publishes rejected while the pipeline was stopped"
    )
    .unwrap()
});

/// Events still queued when the shutdown drain timed out.
pub static SHUTDOWN_ABANDONED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "rtm_shutdown_abandoned_total",
        "Events abandoned because the shutdown drain timed out"
    )
    .unwrap()
});

// =============================================================================
// Checkpoint tracker
// =============================================================================

/// Checkpoint events observed.
/// Labels: entity_class, kind
pub static CHECKPOINTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_checkpoints_total",
        "Total checkpoint events observed by the tracker",
        &["entity_class", "kind"]
    )
    .unwrap()
});

/// Intervals emitted by the tracker.
pub static INTERVALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_intervals_total",
        "Total intervals emitted",
        &["entity_class", "interval"]
    )
    .unwrap()
});

/// Duplicate checkpoints ignored.
pub static DUPLICATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_duplicate_checkpoints_total",
        "Total duplicate checkpoints ignored",
        &["entity_class"]
    )
    .unwrap()
});

/// Sequence gaps detected.
pub static SEQUENCE_GAPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_sequence_gaps_total",
        "Total out-of-order or skipped checkpoints",
        &["entity_class"]
    )
    .unwrap()
});

/// Events rejected as malformed.
/// Labels: reason (kind_mismatch/non_monotonic/invalid_timestamp/unknown_kind/class_disabled)
pub static REJECTED_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_rejected_events_total",
        "Total checkpoint events rejected as malformed",
        &["reason"]
    )
    .unwrap()
});

/// Entity evictions.
/// Labels: reason (idle/capacity)
pub static EVICTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_entity_evictions_total",
        "Total tracked entities evicted",
        &["reason"]
    )
    .unwrap()
});

/// Currently tracked entities.
pub static TRACKED_ENTITIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("rtm_tracked_entities", "Number of tracked entities").unwrap()
});

// =============================================================================
// Anomaly detector
// =============================================================================

/// Interval duration distribution in seconds.
pub static INTERVAL_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rtm_interval_duration_seconds",
        "Interval duration in seconds",
        &["entity_class", "interval"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 20.0, 30.0, 60.0, 120.0]
    )
    .unwrap()
});

/// Intervals flagged as anomalous.
pub static ANOMALIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_anomalies_total",
        "Total intervals flagged as anomalous",
        &["entity_class", "interval"]
    )
    .unwrap()
});

/// Most recent anomaly score per interval kind.
pub static ANOMALY_SCORE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rtm_anomaly_score",
        "Most recent anomaly score",
        &["entity_class", "interval"]
    )
    .unwrap()
});

// =============================================================================
// Storage router
// =============================================================================

/// Records delivered per sink.
pub static SINK_DELIVERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_sink_delivered_total",
        "Total records delivered to a sink",
        &["sink"]
    )
    .unwrap()
});

/// Failed deliver/flush calls per sink.
pub static SINK_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_sink_failures_total",
        "Total failed sink delivery attempts",
        &["sink"]
    )
    .unwrap()
});

/// Records dropped per sink.
/// Labels: sink, reason (overflow/retries_exhausted/shutdown)
pub static SINK_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rtm_sink_dropped_total",
        "Total records dropped before reaching a sink",
        &["sink", "reason"]
    )
    .unwrap()
});

/// Current queue depth per sink lane.
pub static SINK_QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "rtm_sink_queue_depth",
        "Records queued for a sink",
        &["sink"]
    )
    .unwrap()
});

/// Batch delivery latency per sink in milliseconds.
pub static SINK_DELIVER_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rtm_sink_deliver_latency_ms",
        "Sink batch delivery latency in milliseconds",
        &["sink"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

// =============================================================================
// Per-table interval view (updated by the Prometheus sink)
// =============================================================================

/// Last measured duration per table and interval.
pub static TABLE_INTERVAL_LAST_SECONDS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rtm_table_interval_last_seconds",
        "Most recent interval duration per table",
        &["game_type", "table", "interval"]
    )
    .unwrap()
});

/// Interval count per table and interval.
pub static TABLE_INTERVALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rtm_table_intervals_total",
        "Intervals recorded per table",
        &["game_type", "table", "interval", "anomaly"]
    )
    .unwrap()
});

use crate::error::TelemetryResult;

/// Metrics facade.
pub struct Metrics;

/// The process registry in Prometheus text exposition format.
#[derive(Debug, Clone)]
pub struct RenderedMetrics {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Metrics {
    /// Encode every registered metric for a scrape or push.
    pub fn render() -> TelemetryResult<RenderedMetrics> {
        let encoder = TextEncoder::new();
        let mut body = Vec::new();
        encoder.encode(&prometheus::gather(), &mut body)?;
        Ok(RenderedMetrics {
            content_type: encoder.format_type().to_string(),
            body,
        })
    }

    // Bus

    pub fn bus_published(topic: &str) {
        BUS_PUBLISHED_TOTAL.with_label_values(&[topic]).inc();
    }

    pub fn bus_dropped(topic: &str) {
        BUS_DROPPED_TOTAL.with_label_values(&[topic]).inc();
    }

    pub fn bus_handler_failure(topic: &str) {
        BUS_HANDLER_FAILURES_TOTAL.with_label_values(&[topic]).inc();
    }

    pub fn publish_rejected() {
        PUBLISH_REJECTED_TOTAL.inc();
    }

    pub fn shutdown_abandoned(count: u64) {
        SHUTDOWN_ABANDONED_TOTAL.inc_by(count);
    }

    // Tracker

    pub fn checkpoint_observed(entity_class: &str, kind: &str) {
        CHECKPOINTS_TOTAL
            .with_label_values(&[entity_class, kind])
            .inc();
    }

    pub fn interval_emitted(entity_class: &str, interval: &str) {
        INTERVALS_TOTAL
            .with_label_values(&[entity_class, interval])
            .inc();
    }

    pub fn duplicate_checkpoint(entity_class: &str) {
        DUPLICATES_TOTAL.with_label_values(&[entity_class]).inc();
    }

    pub fn sequence_gap(entity_class: &str) {
        SEQUENCE_GAPS_TOTAL.with_label_values(&[entity_class]).inc();
    }

    pub fn event_rejected(reason: &str) {
        REJECTED_EVENTS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn entity_evicted(reason: &str) {
        EVICTIONS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn tracked_entities(count: usize) {
        TRACKED_ENTITIES.set(count as i64);
    }

    // Detector

    /// Record an annotated interval.
    pub fn interval_observed(
        entity_class: &str,
        interval: &str,
        duration_secs: f64,
        score: Option<f64>,
        anomalous: bool,
    ) {
        INTERVAL_DURATION_SECONDS
            .with_label_values(&[entity_class, interval])
            .observe(duration_secs);
        if let Some(score) = score.filter(|s| s.is_finite()) {
            ANOMALY_SCORE
                .with_label_values(&[entity_class, interval])
                .set(score);
        }
        if anomalous {
            ANOMALIES_TOTAL
                .with_label_values(&[entity_class, interval])
                .inc();
        }
    }

    // Router

    pub fn sink_delivered(sink: &str, count: usize) {
        SINK_DELIVERED_TOTAL
            .with_label_values(&[sink])
            .inc_by(count as u64);
    }

    pub fn sink_failure(sink: &str) {
        SINK_FAILURES_TOTAL.with_label_values(&[sink]).inc();
    }

    pub fn sink_dropped(sink: &str, reason: &str, count: usize) {
        SINK_DROPPED_TOTAL
            .with_label_values(&[sink, reason])
            .inc_by(count as u64);
    }

    pub fn sink_queue_depth(sink: &str, depth: usize) {
        SINK_QUEUE_DEPTH
            .with_label_values(&[sink])
            .set(depth as i64);
    }

    pub fn sink_deliver_latency(sink: &str, latency_ms: f64) {
        SINK_DELIVER_LATENCY_MS
            .with_label_values(&[sink])
            .observe(latency_ms);
    }

    // Per-table view

    pub fn table_interval(
        game_type: &str,
        table: &str,
        interval: &str,
        duration_secs: f64,
        anomalous: bool,
    ) {
        TABLE_INTERVAL_LAST_SECONDS
            .with_label_values(&[game_type, table, interval])
            .set(duration_secs);
        TABLE_INTERVALS_TOTAL
            .with_label_values(&[game_type, table, interval, if anomalous { "true" } else { "false" }])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_counters_accumulate() {
        Metrics::sink_delivered("metrics-test-sink", 3);
        Metrics::sink_delivered("metrics-test-sink", 2);
        let value = SINK_DELIVERED_TOTAL
            .with_label_values(&["metrics-test-sink"])
            .get();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_interval_observed_counts_anomalies() {
        Metrics::interval_observed("metrics_test", "a-to-b", 1.0, Some(0.5), false);
        Metrics::interval_observed("metrics_test", "a-to-b", 9.0, Some(f64::MAX), true);

        let anomalies = ANOMALIES_TOTAL
            .with_label_values(&["metrics_test", "a-to-b"])
            .get();
        assert_eq!(anomalies, 1);
        let samples = INTERVAL_DURATION_SECONDS
            .with_label_values(&["metrics_test", "a-to-b"])
            .get_sample_count();
        assert_eq!(samples, 2);
        let score = ANOMALY_SCORE
            .with_label_values(&["metrics_test", "a-to-b"])
            .get();
        assert_eq!(score, f64::MAX);
    }

    #[test]
    fn test_render_includes_registered_metrics() {
        Metrics::sink_failure("metrics-render-sink");
        let rendered = Metrics::render().unwrap();
        let text = String::from_utf8(rendered.body).unwrap();
        assert!(rendered.content_type.starts_with("text/plain"));
        assert!(text.contains("metrics-render-sink"));
    }
}
