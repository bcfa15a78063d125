//! Core domain types for the studio round-time monitor.
//!
//! This crate provides the types shared by every pipeline stage:
//! - `EntityClass`, `CheckpointKind`, `CycleTable`: checkpoint vocabulary and cycles
//! - `EntityKey`, `CheckpointEvent`, `Timestamp`: inbound facts
//! - `Interval`, `Diagnostic`: derived records
//! - `SinkRecord`, `Sink`: the storage boundary

pub mod clock;
pub mod diagnostic;
pub mod entity;
pub mod error;
pub mod event;
pub mod interval;
pub mod record;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use entity::{CheckpointKind, CycleTable, EntityClass, EntityKey, CYCLE_TABLES};
pub use error::{CoreError, Result, SinkError, SinkResult};
pub use event::{CheckpointEvent, Payload, Timestamp};
pub use interval::Interval;
pub use record::{DiagnosticRecord, IntervalRecord, PersistedRecord, RecordClass, SinkRecord};
pub use sink::{BoxFuture, DynSink, Sink};
