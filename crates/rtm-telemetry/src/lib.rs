//! Prometheus metrics and structured logging for the round-time monitor.
//!
//! - Prometheus self-metrics for every pipeline stage
//! - Structured logging with tracing (JSON in production)
//! - Periodic interval summary (percentiles per interval kind)

pub mod error;
pub mod logging;
pub mod metrics;
pub mod summary;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{Metrics, RenderedMetrics};
pub use summary::{IntervalSummary, IntervalSummaryReporter};
