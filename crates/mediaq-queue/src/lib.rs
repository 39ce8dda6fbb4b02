//! Job queue for media jobs.
//!
//! This crate provides:
//! - The `Broker` seam: fetch, ack, fail, claim, close
//! - A Redis Streams broker with consumer groups and a dead-letter stream
//! - An in-process broker with the same delivery semantics
//! - Job lifecycle events for logging and metrics

pub mod broker;
pub mod error;
pub mod events;
pub mod job;
pub mod memory;
pub mod queue;

pub use broker::Broker;
pub use error::{QueueError, QueueResult};
pub use events::{JobEvent, JobEvents};
pub use job::{Delivery, FailOutcome, QueueMessage};
pub use memory::MemoryBroker;
pub use queue::{QueueConfig, RedisBroker, DEFAULT_VISIBILITY_TIMEOUT_SECS};
