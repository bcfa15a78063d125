//! Sink adapters for the round-time monitor.
//!
//! Every adapter implements `rtm_core::Sink`:
//! - `JsonLinesSink`: daily append-only `.jsonl` files
//! - `CsvSink`: daily append-only `.csv` interval files
//! - `SqliteSink`: embedded SQLite database
//! - `LokiSink`: Grafana Loki push API
//! - `PushgatewaySink`: Prometheus Pushgateway
//! - `MemorySink`: in-process buffer

pub mod config;
pub mod csv_file;
pub mod error;
pub mod export;
pub mod jsonl;
pub mod loki;
pub mod memory;
pub mod pushgateway;
pub mod retention;
pub mod sqlite;

pub use config::{build_sink, SinkConfig, SinkType};
pub use csv_file::{CsvSink, CsvWriter};
pub use error::{PersistenceError, PersistenceResult};
pub use export::{export_intervals, ExportFormat};
pub use jsonl::{JsonLinesSink, JsonLinesWriter};
pub use loki::{LokiOptions, LokiSink};
pub use memory::MemorySink;
pub use pushgateway::PushgatewaySink;
pub use retention::RetentionPolicy;
pub use sqlite::SqliteSink;
