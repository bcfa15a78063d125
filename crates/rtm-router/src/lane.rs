//! Per-sink delivery lane.
//!
//! A lane owns the bounded queue for one sink. The ingestion path only ever
//! appends to the queue; the lane's flush task takes batches off the front,
//! delivers them and requeues failed batches at the front so ordering is
//! kept across retries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rtm_core::{
    Diagnostic, DiagnosticKind, DynSink, Severity, SinkError, SinkRecord, SinkResult,
};
use rtm_telemetry::Metrics;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::RoutingRule;

struct QueuedRecord {
    record: Arc<SinkRecord>,
    attempts: u32,
}

/// Counters for one lane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub name: String,
    pub queued: usize,
    pub delivered: u64,
    /// Failed delivery attempts (batches).
    pub failures: u64,
    pub dropped_overflow: u64,
    pub dropped_retries: u64,
    pub dropped_shutdown: u64,
    pub last_error: Option<String>,
}

/// Result of one flush pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlushOutcome {
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
    /// Set when the pass stopped on a failed batch.
    pub error: Option<String>,
}

/// Settings copied into each lane's flush pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LaneSettings {
    pub max_batch_size: usize,
    pub max_delivery_attempts: u32,
    pub deliver_timeout: Duration,
}

/// Bounded queue plus delivery state for one sink.
pub struct SinkLane {
    name: String,
    sink: DynSink,
    rule: RoutingRule,
    capacity: usize,
    queue: Mutex<VecDeque<QueuedRecord>>,
    /// Serializes flush passes (timer task vs. shutdown flush).
    flushing: tokio::sync::Mutex<()>,
    delivered: AtomicU64,
    failures: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_retries: AtomicU64,
    dropped_shutdown: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl SinkLane {
    pub(crate) fn new(sink: DynSink, rule: RoutingRule, capacity: usize) -> Self {
        Self {
            name: sink.name().to_string(),
            sink,
            rule,
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            flushing: tokio::sync::Mutex::new(()),
            delivered: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            dropped_overflow: AtomicU64::new(0),
            dropped_retries: AtomicU64::new(0),
            dropped_shutdown: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn accepts(&self, record: &SinkRecord) -> bool {
        self.rule.matches(record)
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Append a record, dropping the oldest queued record when full.
    pub fn enqueue(&self, record: Arc<SinkRecord>) {
        let (depth, overflowed) = {
            let mut queue = self.queue.lock();
            let overflowed = if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(QueuedRecord {
                record,
                attempts: 0,
            });
            (queue.len(), overflowed)
        };

        if overflowed {
            let prev = self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
            Metrics::sink_dropped(&self.name, "overflow", 1);
            if prev == 0 {
                warn!(
                    sink = %self.name,
                    capacity = self.capacity,
                    "Sink queue full, dropping oldest records"
                );
            }
        }
        Metrics::sink_queue_depth(&self.name, depth);
    }

    fn take_batch(&self, max: usize) -> Vec<QueuedRecord> {
        let mut queue = self.queue.lock();
        let n = queue.len().min(max);
        queue.drain(..n).collect()
    }

    /// Put a failed batch back at the front, preserving its order.
    fn requeue_front(&self, batch: Vec<QueuedRecord>) {
        let overflow = {
            let mut queue = self.queue.lock();
            for item in batch.into_iter().rev() {
                queue.push_front(item);
            }
            let mut overflow = 0;
            while queue.len() > self.capacity {
                queue.pop_front();
                overflow += 1;
            }
            overflow
        };
        if overflow > 0 {
            self.dropped_overflow
                .fetch_add(overflow as u64, Ordering::Relaxed);
            Metrics::sink_dropped(&self.name, "overflow", overflow);
        }
    }

    /// Deliver queued records in batches until the queue is empty or a batch fails.
    ///
    /// Only records queued when the pass starts are considered.
    pub(crate) async fn flush(
        &self,
        settings: LaneSettings,
        report: &(dyn Fn(Diagnostic) + Send + Sync),
    ) -> FlushOutcome {
        let _guard = self.flushing.lock().await;
        let mut outcome = FlushOutcome::default();
        let mut remaining = self.queued();

        while remaining > 0 {
            let batch = self.take_batch(settings.max_batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(batch.len());

            let records: Vec<Arc<SinkRecord>> =
                batch.iter().map(|q| Arc::clone(&q.record)).collect();
            let started = Instant::now();
            let result = self.deliver_and_flush(&records, settings.deliver_timeout).await;
            Metrics::sink_deliver_latency(&self.name, started.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(()) => {
                    outcome.delivered += records.len();
                    self.delivered
                        .fetch_add(records.len() as u64, Ordering::Relaxed);
                    Metrics::sink_delivered(&self.name, records.len());
                    trace!(sink = %self.name, count = records.len(), "Batch delivered");
                }
                Err(e) => {
                    let (requeued, dropped) =
                        self.handle_failure(batch, &e, settings.max_delivery_attempts, report);
                    outcome.requeued += requeued;
                    outcome.dropped += dropped;
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        Metrics::sink_queue_depth(&self.name, self.queued());
        outcome
    }

    async fn deliver_and_flush(
        &self,
        records: &[Arc<SinkRecord>],
        timeout: Duration,
    ) -> SinkResult<()> {
        let timeout_ms = timeout.as_millis() as u64;
        tokio::time::timeout(timeout, self.sink.deliver(records))
            .await
            .map_err(|_| SinkError::Timeout(timeout_ms))??;
        tokio::time::timeout(timeout, self.sink.flush())
            .await
            .map_err(|_| SinkError::Timeout(timeout_ms))?
    }

    fn handle_failure(
        &self,
        batch: Vec<QueuedRecord>,
        error: &SinkError,
        max_attempts: u32,
        report: &(dyn Fn(Diagnostic) + Send + Sync),
    ) -> (usize, usize) {
        let batch_len = batch.len();
        let consecutive = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        Metrics::sink_failure(&self.name);
        *self.last_error.lock() = Some(error.to_string());

        let mut retry = Vec::with_capacity(batch_len);
        let mut dropped = 0;
        for mut item in batch {
            item.attempts += 1;
            if item.attempts >= max_attempts {
                dropped += 1;
            } else {
                retry.push(item);
            }
        }
        let requeued = retry.len();
        if requeued > 0 {
            self.requeue_front(retry);
        }
        if dropped > 0 {
            self.dropped_retries
                .fetch_add(dropped as u64, Ordering::Relaxed);
            Metrics::sink_dropped(&self.name, "retries_exhausted", dropped);
        }

        warn!(
            sink = %self.name,
            error = %error,
            records = batch_len,
            requeued,
            dropped,
            "Sink delivery failed"
        );
        report(
            Diagnostic::new(
                Severity::Error,
                DiagnosticKind::SinkDeliveryFailure,
                format!("delivery to sink '{}' failed: {}", self.name, error),
            )
            .with_context("sink", &self.name)
            .with_context("records", batch_len)
            .with_context("requeued", requeued)
            .with_context("dropped", dropped)
            .with_context("failures", consecutive),
        );
        (requeued, dropped)
    }

    /// Close the sink and count anything still queued as dropped.
    pub(crate) async fn close(&self, timeout: Duration) -> usize {
        let leftover = {
            let mut queue = self.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if leftover > 0 {
            self.dropped_shutdown
                .fetch_add(leftover as u64, Ordering::Relaxed);
            Metrics::sink_dropped(&self.name, "shutdown", leftover);
            warn!(sink = %self.name, leftover, "Records left undelivered at shutdown");
        }
        Metrics::sink_queue_depth(&self.name, 0);

        match tokio::time::timeout(timeout, self.sink.close()).await {
            Ok(Ok(())) => debug!(sink = %self.name, "Sink closed"),
            Ok(Err(e)) => warn!(sink = %self.name, error = %e, "Sink close failed"),
            Err(_) => warn!(sink = %self.name, "Sink close timed out"),
        }
        leftover
    }

    /// Drop records routed after shutdown.
    pub(crate) fn reject_closed(&self) {
        self.dropped_shutdown.fetch_add(1, Ordering::Relaxed);
        Metrics::sink_dropped(&self.name, "shutdown", 1);
    }

    #[must_use]
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            name: self.name.clone(),
            queued: self.queued(),
            delivered: self.delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_retries: self.dropped_retries.load(Ordering::Relaxed),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}
