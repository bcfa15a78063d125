//! Storage router.
//!
//! `route` is synchronous and never touches a sink: it appends the shared
//! record to the lane of every sink whose rule accepts it. Each lane is
//! drained by its own task on the flush interval, so a slow or failing sink
//! only ever delays its own lane.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use rtm_core::{Diagnostic, SinkRecord};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RouterConfig, SinkRoute};
use crate::error::{RouterError, RouterResult};
use crate::lane::{FlushOutcome, LaneSettings, SinkLane, SinkStats};

/// Callback receiving diagnostics raised by the router itself.
pub type DiagnosticReporter = Arc<dyn Fn(Diagnostic) + Send + Sync>;

/// Fans records out to per-sink lanes.
pub struct StorageRouter {
    config: RouterConfig,
    lanes: Vec<Arc<SinkLane>>,
    reporter: DiagnosticReporter,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
}

impl StorageRouter {
    /// Build a router over `routes`. Sink names must be unique.
    pub fn configure(routes: Vec<SinkRoute>, config: RouterConfig) -> RouterResult<Self> {
        config.validate().map_err(RouterError::InvalidConfig)?;

        let mut lanes: Vec<Arc<SinkLane>> = Vec::with_capacity(routes.len());
        for route in routes {
            let name = route.sink.name().to_string();
            if lanes.iter().any(|l| l.name() == name) {
                return Err(RouterError::DuplicateSink(name));
            }
            if route.rule.accepts.is_empty() {
                warn!(sink = %name, "Sink accepts no record classes");
            }
            lanes.push(Arc::new(SinkLane::new(
                route.sink,
                route.rule,
                config.max_queue_depth_per_sink,
            )));
        }

        info!(
            sinks = lanes.len(),
            flush_interval_ms = config.flush_interval_ms,
            "Storage router configured"
        );

        Ok(Self {
            config,
            lanes,
            reporter: Arc::new(|diagnostic: Diagnostic| {
                debug!(%diagnostic, "Router diagnostic (no reporter installed)");
            }),
            tasks: Mutex::new(Vec::new()),
            shutdown_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Install the callback for sink failure diagnostics.
    #[must_use]
    pub fn with_reporter(mut self, reporter: DiagnosticReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Enqueue `record` for every accepting sink. Returns the number of lanes
    /// it was queued on.
    pub fn route(&self, record: Arc<SinkRecord>) -> usize {
        let closed = self.closed.load(Ordering::Acquire);
        let mut queued = 0;
        for lane in self.lanes.iter().filter(|l| l.accepts(&record)) {
            if closed {
                lane.reject_closed();
            } else {
                lane.enqueue(Arc::clone(&record));
                queued += 1;
            }
        }
        queued
    }

    /// Spawn one flush task per lane. Calling it again is a no-op.
    pub fn start(&self) -> RouterResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RouterError::Closed);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| RouterError::NoRuntime)?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let period = self.config.flush_interval();
        let settings = self.settings();
        let mut tasks = self.tasks.lock();
        for lane in &self.lanes {
            let lane = Arc::clone(lane);
            let token = self.shutdown_token.clone();
            let reporter = Arc::clone(&self.reporter);
            tasks.push(handle.spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(sink = %lane.name(), "Flush task stopping");
                            break;
                        }
                        _ = ticker.tick() => {
                            if lane.queued() > 0 {
                                lane.flush(settings, reporter.as_ref()).await;
                            }
                        }
                    }
                }
            }));
        }
        info!(sinks = self.lanes.len(), "Storage router started");
        Ok(())
    }

    /// Run one flush pass on every lane concurrently.
    pub async fn flush_all(&self) -> Vec<(String, FlushOutcome)> {
        let settings = self.settings();
        let reporter = self.reporter.as_ref();
        join_all(self.lanes.iter().map(|lane| async move {
            (lane.name().to_string(), lane.flush(settings, reporter).await)
        }))
        .await
    }

    /// Stop flush tasks, make a final delivery pass and close every sink.
    ///
    /// Records still queued after the final pass are counted as dropped.
    /// Later calls return the current stats without doing anything.
    pub async fn shutdown(&self) -> Vec<SinkStats> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return self.stats();
        }
        self.shutdown_token.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Flush task ended abnormally");
            }
        }

        let settings = self.settings();
        let timeout = self.config.deliver_timeout();
        let reporter = self.reporter.as_ref();
        join_all(self.lanes.iter().map(|lane| async move {
            lane.flush(settings, reporter).await;
            lane.close(timeout).await
        }))
        .await;

        let stats = self.stats();
        let abandoned: u64 = stats.iter().map(|s| s.dropped_shutdown).sum();
        info!(sinks = stats.len(), abandoned, "Storage router shut down");
        stats
    }

    pub fn stats(&self) -> Vec<SinkStats> {
        self.lanes.iter().map(|l| l.stats()).collect()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.lanes.iter().map(|l| l.name().to_string()).collect()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn flush_interval(&self) -> Duration {
        self.config.flush_interval()
    }

    fn settings(&self) -> LaneSettings {
        LaneSettings {
            max_batch_size: self.config.max_batch_size,
            max_delivery_attempts: self.config.max_delivery_attempts,
            deliver_timeout: self.config.deliver_timeout(),
        }
    }
}

impl Drop for StorageRouter {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
