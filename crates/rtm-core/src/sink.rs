//! Storage sink capability.
//!
//! The router only ever sees `Arc<dyn Sink>`; concrete backends live in
//! `rtm-persistence` or in the embedding application.

use crate::error::SinkResult;
use crate::record::SinkRecord;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Destination that durably records intervals and diagnostics.
///
/// Implementations must tolerate redelivery of a batch after a failed
/// `deliver` (delivery is at-least-once).
pub trait Sink: Send + Sync {
    /// Stable name used in logs, metrics and routing rules.
    fn name(&self) -> &str;

    /// Accept a batch of records.
    fn deliver<'a>(&'a self, records: &'a [Arc<SinkRecord>]) -> BoxFuture<'a, SinkResult<()>>;

    /// Push buffered data to the backend.
    fn flush(&self) -> BoxFuture<'_, SinkResult<()>>;

    /// Release resources. Further deliveries may fail with `SinkError::Closed`.
    fn close(&self) -> BoxFuture<'_, SinkResult<()>>;
}

/// Shared sink handle.
pub type DynSink = Arc<dyn Sink>;
