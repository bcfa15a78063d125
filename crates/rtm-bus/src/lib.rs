//! Topic-keyed publish/subscribe bus.
//!
//! Producers publish without waiting on consumers. Every subscription owns a
//! bounded FIFO queue drained by its own worker task, so a slow or failing
//! handler only affects itself. Handler failures are republished on
//! [`ERROR_TOPIC`].

pub mod bus;
pub mod error;
pub mod queue;
pub mod topic;

pub use bus::{
    BusConfig, BusStats, DrainReport, EventBus, PublishOutcome, SubscriberFailure,
    SubscriberStats, SubscriptionHandle, SubscriptionId,
};
pub use error::{BusError, BusResult};
pub use queue::SubscriberQueue;
pub use topic::{Topic, ERROR_TOPIC};
