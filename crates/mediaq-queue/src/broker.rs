//! The broker seam.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::job::{Delivery, FailOutcome};

/// Competing-consumers job broker.
///
/// A job is in flight with at most one consumer at a time. Retry, backoff and
/// dead-lettering are the broker's business; callers report each attempt's
/// outcome exactly once through `ack` or `fail`.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Prepare the queue (consumer groups, streams).
    async fn init(&self) -> QueueResult<()>;

    /// Wait up to `block` for at most `count` new deliveries.
    async fn fetch(&self, consumer: &str, block: Duration, count: usize)
        -> QueueResult<Vec<Delivery>>;

    /// Take over deliveries abandoned by other consumers.
    async fn claim_stale(&self, consumer: &str, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivery completed and remove it from the queue.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Report a failed attempt.
    async fn fail(&self, delivery: &Delivery, reason: &str) -> QueueResult<FailOutcome>;

    /// Close connections. Later calls fail with `QueueError::Closed`.
    async fn close(&self) -> QueueResult<()>;
}
