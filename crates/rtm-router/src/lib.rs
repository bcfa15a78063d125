//! Storage router for the round-time monitor.
//!
//! Fans records out to every configured sink:
//! - One bounded lane (queue) per sink with drop-oldest overflow
//! - Timer-driven batch delivery per lane on its own task
//! - Failed batches are requeued with a bounded attempt count
//! - One sink failing never delays another

pub mod config;
pub mod error;
pub mod lane;
pub mod router;

pub use config::{RouterConfig, RoutingRule, SinkRoute};
pub use error::{RouterError, RouterResult};
pub use lane::{FlushOutcome, SinkLane, SinkStats};
pub use router::{DiagnosticReporter, StorageRouter};
