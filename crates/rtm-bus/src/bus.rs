//! Event bus with per-subscription worker tasks.
//!
//! # Delivery
//!
//! - `publish` never blocks: events are appended to every matching
//!   subscription queue and the call returns.
//! - Each subscription is drained by a dedicated tokio task that calls its
//!   handler sequentially, so events published on one topic reach a given
//!   subscriber in publication order.
//! - A full queue drops its oldest event (counted, never blocking).
//!
//! # Failure isolation
//!
//! Handler errors and panics are caught per event. The failure is counted
//! and republished on [`ERROR_TOPIC`] as `E::from(SubscriberFailure)`;
//! failures while handling an error-topic event are counted and logged but
//! not republished.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rtm_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BusError, BusResult};
use crate::queue::SubscriberQueue;
use crate::topic::{Topic, ERROR_TOPIC};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Capacity of each subscription queue.
    #[serde(default = "default_subscriber_queue_depth")]
    pub subscriber_queue_depth: usize,
}

fn default_subscriber_queue_depth() -> usize {
    10_000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_depth: default_subscriber_queue_depth(),
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.subscriber_queue_depth == 0 {
            return Err("subscriber_queue_depth must be > 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Public value types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(pub u64);

/// Returned by `subscribe`; pass back to `unsubscribe`.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub name: String,
    pub topics: Vec<Topic>,
}

/// A handler failed while processing an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    pub subscription: SubscriptionId,
    pub subscriber: String,
    pub topic: Topic,
    pub reason: String,
    pub panicked: bool,
}

/// Result of a `publish` call. Publishing never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Enqueued for `subscribers` subscriptions; `displaced` older events
    /// were dropped from full queues to make room.
    Delivered { subscribers: usize, displaced: usize },
    NoSubscribers,
    /// The bus has been shut down.
    Closed,
}

impl PublishOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Result of waiting for the bus to go quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DrainReport {
    /// Every queue emptied and every handler finished before the timeout.
    pub completed: bool,
    /// Events still queued when the timeout expired.
    pub abandoned: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub handler_failures: u64,
    pub abandoned: u64,
    pub subscriptions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStats {
    pub id: SubscriptionId,
    pub name: String,
    pub topics: Vec<Topic>,
    pub queued: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub failures: u64,
}

// ============================================================================
// Subscriber
// ============================================================================

struct Subscriber<E> {
    id: SubscriptionId,
    name: String,
    topics: Vec<Topic>,
    queue: SubscriberQueue<(Topic, E)>,
    notify: Notify,
    closed: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<E> Subscriber<E> {
    fn enqueue(&self, topic: Topic, event: E) -> bool {
        let displaced = self.queue.push((topic, event));
        self.notify.notify_one();
        match displaced {
            Some((old_topic, _)) => {
                let prev = self.dropped.fetch_add(1, Ordering::Relaxed);
                Metrics::bus_dropped(old_topic.as_str());
                if prev == 0 {
                    warn!(
                        subscriber = %self.name,
                        topic = %old_topic,
                        capacity = self.queue.capacity(),
                        "Subscriber queue full, dropping oldest events"
                    );
                } else {
                    trace!(subscriber = %self.name, "Dropped oldest queued event");
                }
                true
            }
            None => false,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            id: self.id,
            name: self.name.clone(),
            topics: self.topics.clone(),
            queued: self.queue.len(),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

struct BusInner<E> {
    config: BusConfig,
    topics: RwLock<HashMap<Topic, Vec<Arc<Subscriber<E>>>>>,
    subscribers: RwLock<Vec<Arc<Subscriber<E>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    published: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    abandoned: AtomicU64,
}

impl<E> Drop for BusInner<E> {
    fn drop(&mut self) {
        for sub in self.subscribers.get_mut().iter() {
            sub.close();
        }
    }
}

/// Topic-keyed publish/subscribe hub.
///
/// Cloning is cheap and yields a handle to the same bus.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static + From<SubscriberFailure>,
{
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                topics: RwLock::new(HashMap::new()),
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
                abandoned: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe `handler` to a single topic.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> BusResult<SubscriptionHandle>
    where
        F: FnMut(E) -> BusResult<()> + Send + 'static,
    {
        let name = format!("{topic}-subscriber");
        self.subscribe_topics(&name, &[topic], handler)
    }

    /// Subscribe one handler (one ordered queue) to several topics.
    pub fn subscribe_topics<F>(
        &self,
        name: &str,
        topics: &[&str],
        handler: F,
    ) -> BusResult<SubscriptionHandle>
    where
        F: FnMut(E) -> BusResult<()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let topics: Vec<Topic> = topics.iter().map(|t| Topic::from(*t)).collect();
        let sub = Arc::new(Subscriber {
            id,
            name: name.to_string(),
            topics: topics.clone(),
            queue: SubscriberQueue::new(self.inner.config.subscriber_queue_depth),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            worker: Mutex::new(None),
        });

        {
            let mut registry = self.inner.topics.write();
            for topic in &topics {
                registry
                    .entry(topic.clone())
                    .or_default()
                    .push(Arc::clone(&sub));
            }
        }
        self.inner.subscribers.write().push(Arc::clone(&sub));

        let worker = runtime.spawn(run_worker(
            Arc::downgrade(&self.inner),
            Arc::clone(&sub),
            handler,
        ));
        *sub.worker.lock() = Some(worker);

        debug!(subscription = id.0, subscriber = %name, topics = ?topics, "Subscribed");
        Ok(SubscriptionHandle {
            id,
            name: name.to_string(),
            topics,
        })
    }

    /// Remove a subscription. Events still queued for it are discarded.
    ///
    /// Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = {
            let mut subs = self.inner.subscribers.write();
            subs.iter()
                .position(|s| s.id == handle.id)
                .map(|pos| subs.remove(pos))
        };
        let Some(sub) = removed else {
            return false;
        };

        let mut registry = self.inner.topics.write();
        for topic in &sub.topics {
            if let Some(list) = registry.get_mut(topic.as_str()) {
                list.retain(|s| s.id != handle.id);
            }
        }
        drop(registry);

        sub.close();
        let discarded = sub.queue.clear();
        debug!(
            subscription = handle.id.0,
            subscriber = %handle.name,
            discarded,
            "Unsubscribed"
        );
        true
    }

    /// Publish an event. Never blocks and never fails.
    pub fn publish(&self, topic: &str, event: E) -> PublishOutcome {
        if self.is_closed() {
            return PublishOutcome::Closed;
        }
        self.inner.published.fetch_add(1, Ordering::AcqRel);
        Metrics::bus_published(topic);

        let target = {
            let registry = self.inner.topics.read();
            registry
                .get_key_value(topic)
                .map(|(t, subs)| (t.clone(), subs.clone()))
        };
        let (topic, subscribers) = match target {
            Some(found) => found,
            None => {
                // Topics are created implicitly.
                self.inner
                    .topics
                    .write()
                    .entry(Topic::from(topic))
                    .or_default();
                return PublishOutcome::NoSubscribers;
            }
        };
        if subscribers.is_empty() {
            return PublishOutcome::NoSubscribers;
        }

        let mut displaced = 0;
        for sub in &subscribers {
            if sub.enqueue(topic.clone(), event.clone()) {
                displaced += 1;
            }
        }
        PublishOutcome::Delivered {
            subscribers: subscribers.len(),
            displaced,
        }
    }

    /// Wait until every queue is empty and no handler is running.
    ///
    /// Returns `false` if the bus was still busy at the deadline. Unlike
    /// [`drain`](Self::drain) nothing is counted as abandoned, so producers
    /// can use it for backpressure.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Wait until every queue is empty and no handler is running.
    ///
    /// Events still queued at the deadline are counted as abandoned.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        if self.wait_idle(timeout).await {
            return DrainReport {
                completed: true,
                abandoned: 0,
            };
        }

        let pending: u64 = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|s| s.queue.len() as u64)
            .sum();
        self.inner.abandoned.fetch_add(pending, Ordering::Relaxed);
        warn!(pending, "Bus drain timed out");
        DrainReport {
            completed: false,
            abandoned: pending,
        }
    }

    fn is_idle(&self) -> bool {
        let before = self.inner.published.load(Ordering::Acquire);
        let idle = self.inner.subscribers.read().iter().all(|s| s.queue.is_idle());
        let after = self.inner.published.load(Ordering::Acquire);
        // A publish between the two reads may have landed in an
        // already-inspected queue.
        idle && before == after
    }

    /// Close the bus and stop every worker.
    ///
    /// Events still queued are discarded and counted as abandoned.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscribers: Vec<_> = self.inner.subscribers.read().clone();
        let mut discarded = 0u64;
        let mut workers = Vec::with_capacity(subscribers.len());
        for sub in &subscribers {
            sub.close();
            if let Some(worker) = sub.worker.lock().take() {
                workers.push(worker);
            }
        }
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Subscriber worker ended abnormally");
            }
        }
        for sub in &subscribers {
            discarded += sub.queue.clear() as u64;
        }
        self.inner.abandoned.fetch_add(discarded, Ordering::Relaxed);

        info!(
            subscriptions = subscribers.len(),
            discarded, "Event bus shut down"
        );
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .read()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Known topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.inner.topics.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        let subscribers = self.inner.subscribers.read();
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: subscribers
                .iter()
                .map(|s| s.dropped.load(Ordering::Relaxed))
                .sum(),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
            abandoned: self.inner.abandoned.load(Ordering::Relaxed),
            subscriptions: subscribers.len(),
        }
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriberStats> {
        self.inner
            .subscribers
            .read()
            .iter()
            .map(|s| s.stats())
            .collect()
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker<E, F>(bus: Weak<BusInner<E>>, sub: Arc<Subscriber<E>>, mut handler: F)
where
    E: Clone + Send + 'static + From<SubscriberFailure>,
    F: FnMut(E) -> BusResult<()> + Send + 'static,
{
    loop {
        if sub.is_closed() {
            break;
        }
        let Some((topic, event)) = sub.queue.pop() else {
            sub.notify.notified().await;
            continue;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some((e.to_string(), false)),
            Err(panic) => Some((panic_message(panic.as_ref()), true)),
        };

        match failure {
            None => {
                sub.delivered.fetch_add(1, Ordering::Relaxed);
                if let Some(inner) = bus.upgrade() {
                    inner.delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
            Some((reason, panicked)) => {
                report_failure(&bus, &sub, topic, reason, panicked);
            }
        }
        // Only now is the event fully handled (including any failure
        // report published above).
        sub.queue.finish();
    }
    trace!(subscriber = %sub.name, "Subscriber worker stopped");
}

fn report_failure<E>(
    bus: &Weak<BusInner<E>>,
    sub: &Subscriber<E>,
    topic: Topic,
    reason: String,
    panicked: bool,
) where
    E: Clone + Send + 'static + From<SubscriberFailure>,
{
    sub.failures.fetch_add(1, Ordering::Relaxed);
    Metrics::bus_handler_failure(topic.as_str());
    let inner = bus.upgrade();
    if let Some(inner) = &inner {
        inner.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    if topic.is_error_topic() {
        error!(
            subscriber = %sub.name,
            reason = %reason,
            panicked,
            "Error-topic subscriber failed"
        );
        return;
    }

    warn!(
        subscriber = %sub.name,
        topic = %topic,
        reason = %reason,
        panicked,
        "Subscriber handler failed"
    );

    let Some(inner) = inner else {
        return;
    };
    let failure = SubscriberFailure {
        subscription: sub.id,
        subscriber: sub.name.clone(),
        topic,
        reason,
        panicked,
    };
    EventBus { inner }.publish(ERROR_TOPIC, E::from(failure));
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: <non-string payload>".to_string()
    }
}
