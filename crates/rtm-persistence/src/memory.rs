//! In-memory sink for embedding applications and tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtm_core::{BoxFuture, Diagnostic, Interval, Sink, SinkError, SinkRecord, SinkResult};

#[derive(Default)]
pub struct MemorySink {
    name: String,
    records: Mutex<Vec<Arc<SinkRecord>>>,
    flushes: AtomicU64,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<Arc<SinkRecord>> {
        self.records.lock().clone()
    }

    pub fn intervals(&self) -> Vec<Interval> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r.as_ref() {
                SinkRecord::Interval(i) => Some(i.clone()),
                SinkRecord::Diagnostic(_) => None,
            })
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r.as_ref() {
                SinkRecord::Diagnostic(d) => Some(d.clone()),
                SinkRecord::Interval(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, records: &'a [Arc<SinkRecord>]) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(SinkError::Closed);
            }
            self.records.lock().extend(records.iter().cloned());
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move {
            self.flushes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}
