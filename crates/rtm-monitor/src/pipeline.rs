//! Pipeline wiring.
//!
//! One [`EventBus`] carries every stage's input:
//!
//! | Topic                 | Publisher             | Subscriber      |
//! |-----------------------|-----------------------|-----------------|
//! | `checkpoints`         | producers, sweep task | tracker         |
//! | `intervals.raw`       | tracker               | detector        |
//! | `intervals.annotated` | detector              | router          |
//! | `diagnostics`         | tracker, router       | router          |
//! | `bus.errors`          | bus                   | router          |
//!
//! Each stage owns one subscription, so its state is mutated sequentially.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rtm_bus::{
    BusConfig, BusError, BusStats, DrainReport, EventBus, PublishOutcome, SubscriberFailure,
    SubscriberStats, ERROR_TOPIC,
};
use rtm_core::{
    CheckpointEvent, CheckpointKind, Diagnostic, DiagnosticKind, EntityKey, Interval,
    IntervalRecord, Payload, Severity, SinkRecord, Timestamp,
};
use rtm_detector::{AnomalyDetector, DetectorConfig, IntervalStatistics};
use rtm_persistence::{build_sink, ExportFormat};
use rtm_router::{
    DiagnosticReporter, RouterConfig, RoutingRule, SinkRoute, SinkStats, StorageRouter,
};
use rtm_telemetry::{IntervalSummaryReporter, Metrics};
use rtm_tracker::{CheckpointTracker, TrackerConfig, TrackerStats};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

pub const CHECKPOINTS_TOPIC: &str = "checkpoints";
pub const RAW_INTERVALS_TOPIC: &str = "intervals.raw";
pub const ANNOTATED_INTERVALS_TOPIC: &str = "intervals.annotated";
pub const DIAGNOSTICS_TOPIC: &str = "diagnostics";

/// Emit a queue overflow diagnostic on the first displacement and then
/// every this many.
const OVERFLOW_REPORT_EVERY: u64 = 1_000;

/// Recent intervals included in [`HealthStatus`].
const HEALTH_RECENT_INTERVALS: usize = 10;

/// A checkpoint whose kind string did not parse.
#[derive(Debug, Clone)]
pub struct UnparsedCheckpoint {
    pub entity_key: EntityKey,
    pub raw_kind: String,
    pub timestamp: Timestamp,
}

/// Everything that travels over the pipeline bus.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Checkpoint(Arc<CheckpointEvent>),
    Unparsed(Arc<UnparsedCheckpoint>),
    /// Idle-eviction tick, ordered with the checkpoints.
    Sweep,
    RawInterval(Arc<Interval>),
    AnnotatedInterval(Arc<Interval>),
    Diagnostic(Arc<Diagnostic>),
}

impl From<SubscriberFailure> for PipelineEvent {
    fn from(failure: SubscriberFailure) -> Self {
        let diagnostic = Diagnostic::new(
            Severity::Error,
            DiagnosticKind::SubscriberFailure,
            format!(
                "subscriber '{}' failed on {}: {}",
                failure.subscriber, failure.topic, failure.reason
            ),
        )
        .with_context("subscriber", &failure.subscriber)
        .with_context("topic", &failure.topic)
        .with_context("panicked", failure.panicked);
        Self::Diagnostic(Arc::new(diagnostic))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
    pub router: RouterConfig,
    pub bus: BusConfig,
    pub shutdown_drain_timeout: Duration,
    /// Period of the interval summary log; `None` disables it.
    pub summary_interval: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let summary_secs = config.telemetry.summary_interval_secs;
        Self {
            tracker: config.tracker.clone(),
            detector: config.detector.clone(),
            router: config.router.clone(),
            bus: config.bus.clone(),
            shutdown_drain_timeout: config.shutdown_drain_timeout(),
            summary_interval: (summary_secs > 0).then(|| Duration::from_secs(summary_secs)),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.shutdown_drain_timeout.is_zero() {
            return Err(AppError::Config(
                "shutdown_drain_timeout must be > 0".to_string(),
            ));
        }
        self.bus
            .validate()
            .map_err(|e| AppError::Config(format!("bus: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    Running,
    Stopped,
}

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub state: PipelineState,
    pub running: bool,
    pub accepting: bool,
    pub bus: BusStats,
    pub subscriptions: Vec<SubscriberStats>,
    pub tracked_entities: usize,
    pub tracker: TrackerStats,
    pub intervals: Vec<IntervalStatistics>,
    /// Latest annotated intervals across every baseline, oldest first.
    pub recent_intervals: Vec<IntervalRecord>,
    pub sinks: Vec<SinkStats>,
    pub rejected_publishes: u64,
}

/// Outcome of [`Pipeline::stop`].
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Every queued event was processed before the drain timeout.
    pub drained: bool,
    pub abandoned_events: u64,
    pub rejected_publishes: u64,
    pub bus: BusStats,
    pub sinks: Vec<SinkStats>,
}

/// The assembled monitor.
///
/// Construct with [`Pipeline::new`] or [`Pipeline::from_config`], then
/// [`start`](Pipeline::start) inside a tokio runtime. Always finish with
/// [`stop`](Pipeline::stop); stage subscriptions keep the bus alive until then.
pub struct Pipeline {
    config: PipelineConfig,
    bus: EventBus<PipelineEvent>,
    tracker: Arc<Mutex<CheckpointTracker>>,
    detector: Arc<Mutex<AnomalyDetector>>,
    router: Arc<StorageRouter>,
    summary: Arc<IntervalSummaryReporter>,
    state: Mutex<PipelineState>,
    accepting: AtomicBool,
    rejected: AtomicU64,
    overflowed: AtomicU64,
    shutdown_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    report: tokio::sync::Mutex<Option<ShutdownReport>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, routes: Vec<SinkRoute>) -> AppResult<Self> {
        config.validate()?;

        let bus = EventBus::new(config.bus.clone());
        let tracker = CheckpointTracker::new(config.tracker.clone())?;
        let detector = AnomalyDetector::new(config.detector.clone())?;

        let reporter_bus = bus.clone();
        let reporter: DiagnosticReporter = Arc::new(move |diagnostic: Diagnostic| {
            reporter_bus.publish(
                DIAGNOSTICS_TOPIC,
                PipelineEvent::Diagnostic(Arc::new(diagnostic)),
            );
        });
        let router =
            StorageRouter::configure(routes, config.router.clone())?.with_reporter(reporter);

        info!(
            sinks = ?router.sink_names(),
            classes = ?config.tracker.enabled_classes,
            "Pipeline constructed"
        );

        Ok(Self {
            config,
            bus,
            tracker: Arc::new(Mutex::new(tracker)),
            detector: Arc::new(Mutex::new(detector)),
            router: Arc::new(router),
            summary: Arc::new(IntervalSummaryReporter::new()),
            state: Mutex::new(PipelineState::Created),
            accepting: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
            shutdown_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            report: tokio::sync::Mutex::new(None),
        })
    }

    /// Build every configured sink and the pipeline around them.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let mut routes = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            let sink = build_sink(sink_config)?;
            let rule = RoutingRule {
                accepts: sink_config.accepts.iter().copied().collect(),
                min_severity: sink_config.min_severity,
            };
            routes.push(SinkRoute::new(sink, rule));
        }

        Self::new(PipelineConfig::from(config), routes)
    }

    /// Subscribe every stage and start the background tasks.
    ///
    /// Idempotent while running. Fails once the pipeline has been stopped or
    /// when called outside a tokio runtime.
    pub fn start(&self) -> AppResult<()> {
        let mut state = self.state.lock();
        match *state {
            PipelineState::Running => return Ok(()),
            PipelineState::Stopped => return Err(AppError::Stopped),
            PipelineState::Created => {}
        }
        tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        self.subscribe_tracker()?;
        self.subscribe_detector()?;
        self.subscribe_router()?;
        self.router.start()?;

        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_sweeper());
        if let Some(period) = self.config.summary_interval {
            tasks.push(self.spawn_summary(period));
        }

        self.accepting.store(true, Ordering::Release);
        *state = PipelineState::Running;
        info!(
            topics = ?self.bus.topics(),
            sinks = ?self.router.sink_names(),
            "Pipeline started"
        );
        Ok(())
    }

    fn subscribe_tracker(&self) -> AppResult<()> {
        let tracker = Arc::clone(&self.tracker);
        let bus = self.bus.clone();

        self.bus.subscribe_topics(
            "checkpoint-tracker",
            &[CHECKPOINTS_TOPIC],
            move |event| {
                match event {
                    PipelineEvent::Checkpoint(checkpoint) => {
                        let observation = tracker.lock().observe(&checkpoint);
                        if let Some(interval) = observation.interval {
                            bus.publish(
                                RAW_INTERVALS_TOPIC,
                                PipelineEvent::RawInterval(Arc::new(interval)),
                            );
                        }
                        publish_diagnostics(&bus, observation.diagnostics);
                    }
                    PipelineEvent::Unparsed(unparsed) => {
                        let diagnostic = tracker.lock().reject_unparsed(
                            &unparsed.entity_key,
                            &unparsed.raw_kind,
                            unparsed.timestamp,
                        );
                        publish_diagnostics(&bus, vec![diagnostic]);
                    }
                    PipelineEvent::Sweep => {
                        let evicted = tracker.lock().evict_idle();
                        publish_diagnostics(&bus, evicted);
                    }
                    other => trace!(event = ?other, "Tracker ignored event"),
                }
                Ok(())
            },
        )?;
        Ok(())
    }

    fn subscribe_detector(&self) -> AppResult<()> {
        let detector = Arc::clone(&self.detector);
        let bus = self.bus.clone();

        self.bus.subscribe_topics(
            "anomaly-detector",
            &[RAW_INTERVALS_TOPIC],
            move |event| {
                if let PipelineEvent::RawInterval(interval) = event {
                    let annotated = detector.lock().annotate(&interval);
                    bus.publish(
                        ANNOTATED_INTERVALS_TOPIC,
                        PipelineEvent::AnnotatedInterval(Arc::new(annotated)),
                    );
                }
                Ok(())
            },
        )?;
        Ok(())
    }

    fn subscribe_router(&self) -> AppResult<()> {
        let router = Arc::clone(&self.router);

        self.bus.subscribe_topics(
            "storage-router",
            &[ANNOTATED_INTERVALS_TOPIC, DIAGNOSTICS_TOPIC, ERROR_TOPIC],
            move |event| {
                let record = match event {
                    PipelineEvent::AnnotatedInterval(interval) => {
                        SinkRecord::Interval(interval.as_ref().clone())
                    }
                    PipelineEvent::Diagnostic(diagnostic) => {
                        SinkRecord::Diagnostic(diagnostic.as_ref().clone())
                    }
                    other => {
                        trace!(event = ?other, "Router ignored event");
                        return Ok(());
                    }
                };
                router.route(Arc::new(record));
                Ok(())
            },
        )?;
        Ok(())
    }

    fn spawn_sweeper(&self) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let token = self.shutdown_token.clone();
        let period = Duration::from_millis(self.config.tracker.sweep_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        bus.publish(CHECKPOINTS_TOPIC, PipelineEvent::Sweep);
                    }
                }
            }
        })
    }

    fn spawn_summary(&self, period: Duration) -> JoinHandle<()> {
        let summary = Arc::clone(&self.summary);
        let token = self.shutdown_token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        info!("Outputting periodic interval summary");
                        summary.output_summary();
                    }
                }
            }
        })
    }

    /// Publish one checkpoint. Never blocks and never fails; the outcome says
    /// what happened to the event.
    pub fn publish_checkpoint(
        &self,
        entity_key: EntityKey,
        kind: CheckpointKind,
        timestamp: Timestamp,
        payload: Payload,
    ) -> PublishOutcome {
        let event = CheckpointEvent::new(entity_key, kind, timestamp).with_payload(payload);
        self.publish_inbound(PipelineEvent::Checkpoint(Arc::new(event)))
    }

    /// Like [`publish_checkpoint`](Self::publish_checkpoint) with the kind
    /// still in its wire form. An unknown kind is reported as a malformed
    /// event diagnostic.
    pub fn publish_raw_checkpoint(
        &self,
        entity_key: EntityKey,
        raw_kind: &str,
        timestamp: Timestamp,
        payload: Payload,
    ) -> PublishOutcome {
        match raw_kind.parse::<CheckpointKind>() {
            Ok(kind) => self.publish_checkpoint(entity_key, kind, timestamp, payload),
            Err(_) => self.publish_inbound(PipelineEvent::Unparsed(Arc::new(
                UnparsedCheckpoint {
                    entity_key,
                    raw_kind: raw_kind.to_string(),
                    timestamp,
                },
            ))),
        }
    }

    fn publish_inbound(&self, event: PipelineEvent) -> PublishOutcome {
        if !self.accepting.load(Ordering::Acquire) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            Metrics::publish_rejected();
            trace!("Publish rejected, pipeline not accepting");
            return PublishOutcome::Closed;
        }

        let outcome = self.bus.publish(CHECKPOINTS_TOPIC, event);
        if let PublishOutcome::Delivered { displaced, .. } = outcome {
            if displaced > 0 {
                self.report_overflow(displaced as u64);
            }
        }
        outcome
    }

    fn report_overflow(&self, displaced: u64) {
        let before = self.overflowed.fetch_add(displaced, Ordering::Relaxed);
        let after = before + displaced;
        if before > 0 && before / OVERFLOW_REPORT_EVERY == after / OVERFLOW_REPORT_EVERY {
            return;
        }
        let diagnostic = Diagnostic::new(
            Severity::Warning,
            DiagnosticKind::QueueOverflow,
            format!("checkpoint queue full, {after} events displaced so far"),
        )
        .with_context("topic", CHECKPOINTS_TOPIC)
        .with_context("displaced_total", after);
        warn!(%diagnostic, "Checkpoint queue overflow");
        publish_diagnostics(&self.bus, vec![diagnostic]);
    }

    /// Stop accepting, drain queued events, then flush and close every sink.
    ///
    /// Idempotent: later calls return the first call's report.
    pub async fn stop(&self) -> ShutdownReport {
        let mut slot = self.report.lock().await;
        if let Some(report) = slot.as_ref() {
            return report.clone();
        }

        let was_running = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = PipelineState::Stopped;
            previous == PipelineState::Running
        };
        self.accepting.store(false, Ordering::Release);
        info!(was_running, "Stopping pipeline");

        self.shutdown_token.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Pipeline task ended abnormally");
            }
        }

        let drain = if was_running {
            self.drain_with_final_pass().await
        } else {
            DrainReport {
                completed: true,
                abandoned: 0,
            }
        };
        self.bus.shutdown().await;

        if drain.abandoned > 0 {
            Metrics::shutdown_abandoned(drain.abandoned);
            let diagnostic = Diagnostic::new(
                Severity::Warning,
                DiagnosticKind::ShutdownAbandoned,
                format!("{} queued events abandoned at shutdown", drain.abandoned),
            )
            .with_context("abandoned", drain.abandoned)
            .with_context(
                "drain_timeout_ms",
                self.config.shutdown_drain_timeout.as_millis(),
            );
            warn!(%diagnostic, "Drain timed out");
            self.router
                .route(Arc::new(SinkRecord::Diagnostic(diagnostic)));
        }

        // Delivery failures in this last pass can no longer be routed; they
        // are logged and kept in the sink stats of the report.
        let sinks = self.router.shutdown().await;

        if was_running && self.config.summary_interval.is_some() {
            info!("Final interval summary:");
            self.summary.output_summary();
        }

        let report = ShutdownReport {
            drained: drain.completed,
            abandoned_events: drain.abandoned,
            rejected_publishes: self.rejected.load(Ordering::Relaxed),
            bus: self.bus.stats(),
            sinks,
        };
        info!(
            drained = report.drained,
            abandoned = report.abandoned_events,
            rejected = report.rejected_publishes,
            "Pipeline stopped"
        );

        *slot = Some(report.clone());
        report
    }

    /// Drain the bus, run one delivery pass on every sink while the bus is
    /// still open, then drain again so failure diagnostics from that pass
    /// reach the sink lanes before the router closes.
    async fn drain_with_final_pass(&self) -> DrainReport {
        let timeout = self.config.shutdown_drain_timeout;
        let first = self.bus.drain(timeout).await;

        let failed: Vec<String> = self
            .router
            .flush_all()
            .await
            .into_iter()
            .filter(|(_, outcome)| outcome.error.is_some())
            .map(|(name, _)| name)
            .collect();
        if !failed.is_empty() {
            debug!(sinks = ?failed, "Pre-close delivery pass had failures");
        }

        let second = self.bus.drain(timeout).await;
        DrainReport {
            completed: first.completed && second.completed,
            abandoned: first.abandoned + second.abandoned,
        }
    }

    /// Wait for queued events to pass through every stage.
    ///
    /// Sink lanes filled past half their capacity are flushed right away.
    /// Returns `false` if the bus did not go quiet within `timeout`.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let idle = self.bus.wait_idle(timeout).await;
        let high_water = self.config.router.max_queue_depth_per_sink / 2;
        if self.router.stats().iter().any(|s| s.queued > high_water) {
            debug!(high_water, "Flushing sink lanes early");
            self.router.flush_all().await;
        }
        idle
    }

    pub fn health(&self) -> HealthStatus {
        let state = self.state();
        let (tracked_entities, tracker) = {
            let tracker = self.tracker.lock();
            (tracker.tracked_entities(), tracker.stats().clone())
        };
        let (intervals, recent) = {
            let detector = self.detector.lock();
            (
                detector.statistics(),
                detector.recent_intervals(None, HEALTH_RECENT_INTERVALS),
            )
        };

        HealthStatus {
            state,
            running: state == PipelineState::Running,
            accepting: self.is_accepting(),
            bus: self.bus.stats(),
            subscriptions: self.bus.subscriptions(),
            tracked_entities,
            tracker,
            intervals,
            recent_intervals: recent.iter().map(IntervalRecord::from).collect(),
            sinks: self.router.stats(),
            rejected_publishes: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Latest annotated intervals, optionally of one kind (`start-to-betstop`).
    pub fn recent_intervals(&self, interval_label: Option<&str>, limit: usize) -> Vec<Interval> {
        self.detector.lock().recent_intervals(interval_label, limit)
    }

    /// Write every retained annotated interval to `path`. Returns the count.
    pub async fn export_intervals(
        &self,
        path: impl AsRef<Path>,
        format: ExportFormat,
    ) -> AppResult<usize> {
        let intervals = self.recent_intervals(None, usize::MAX);
        let path = path.as_ref().to_path_buf();
        let count = tokio::task::spawn_blocking(move || {
            rtm_persistence::export_intervals(&intervals, &path, format)
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))??;
        Ok(count)
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.router.sink_names()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

fn publish_diagnostics(bus: &EventBus<PipelineEvent>, diagnostics: Vec<Diagnostic>) {
    for diagnostic in diagnostics {
        debug!(%diagnostic, "Diagnostic raised");
        bus.publish(
            DIAGNOSTICS_TOPIC,
            PipelineEvent::Diagnostic(Arc::new(diagnostic)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_bus::{SubscriptionId, Topic};
    use rtm_core::EntityClass;
    use rtm_persistence::MemorySink;

    fn memory_pipeline() -> (Pipeline, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new("memory"));
        let config = PipelineConfig {
            summary_interval: None,
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, vec![SinkRoute::all(sink.clone())]).unwrap();
        (pipeline, sink)
    }

    #[test]
    fn test_subscriber_failure_becomes_diagnostic() {
        let event = PipelineEvent::from(SubscriberFailure {
            subscription: SubscriptionId(7),
            subscriber: "storage-router".to_string(),
            topic: Topic::new(DIAGNOSTICS_TOPIC),
            reason: "handler panicked".to_string(),
            panicked: true,
        });

        let PipelineEvent::Diagnostic(diagnostic) = event else {
            panic!("expected a diagnostic event");
        };
        assert_eq!(diagnostic.kind, DiagnosticKind::SubscriberFailure);
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.context["subscriber"], "storage-router");
        assert_eq!(diagnostic.context["panicked"], "true");
    }

    #[test]
    fn test_start_requires_runtime() {
        let (pipeline, _sink) = memory_pipeline();
        assert!(matches!(
            pipeline.start(),
            Err(AppError::Bus(BusError::NoRuntime))
        ));
        assert_eq!(pipeline.state(), PipelineState::Created);
    }

    #[test]
    fn test_zero_drain_timeout_rejected() {
        let config = PipelineConfig {
            shutdown_drain_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::new(config, Vec::new()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_publish_before_start_is_rejected() {
        let (pipeline, _sink) = memory_pipeline();
        let outcome = pipeline.publish_checkpoint(
            EntityKey::new(EntityClass::TableApi, "baccarat", "BA-01", "r1"),
            CheckpointKind::Start,
            Timestamp::from_secs(0.0),
            Payload::new(),
        );
        assert_eq!(outcome, PublishOutcome::Closed);
        assert_eq!(pipeline.health().rejected_publishes, 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_closes_sinks() {
        let (pipeline, sink) = memory_pipeline();
        let report = pipeline.stop().await;
        assert!(report.drained);
        assert_eq!(report.abandoned_events, 0);
        assert!(sink.is_closed());
        assert!(matches!(pipeline.start(), Err(AppError::Stopped)));
    }

    #[tokio::test]
    async fn test_health_lists_stage_subscriptions() {
        let (pipeline, _sink) = memory_pipeline();
        pipeline.start().unwrap();
        pipeline.start().unwrap();

        let health = pipeline.health();
        assert!(health.running);
        assert!(health.accepting);
        assert_eq!(health.subscriptions.len(), 3);
        assert_eq!(health.sinks.len(), 1);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["state"], "running");

        pipeline.stop().await;
        assert!(!pipeline.health().accepting);
    }
}
