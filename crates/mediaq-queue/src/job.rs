//! Queue messages and deliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mediaq_models::{AttemptId, JobDescriptor, JobId};

/// A message as published to the queue: a job kind plus its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub kind: String,
    pub job: JobDescriptor,
}

impl QueueMessage {
    pub fn new(kind: impl Into<String>, job: JobDescriptor) -> Self {
        Self {
            kind: kind.into(),
            job,
        }
    }
}

/// One delivery of a job to this worker.
///
/// Every delivery gets its own `AttemptId`, including redeliveries of the
/// same job.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned job id
    pub job_id: JobId,
    /// Job kind used to pick a handler
    pub kind: String,
    /// Payload
    pub job: JobDescriptor,
    /// Unique id of this attempt
    pub attempt_id: AttemptId,
    /// How many times the broker has delivered this job, including this one
    pub delivery_count: u32,
    /// When this worker received the delivery
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(job_id: JobId, message: QueueMessage, delivery_count: u32) -> Self {
        Self {
            job_id,
            kind: message.kind,
            job: message.job,
            attempt_id: AttemptId::new(),
            delivery_count,
            received_at: Utc::now(),
        }
    }
}

/// What the broker did with a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailOutcome {
    /// The job will be delivered again
    Requeued,
    /// The job exhausted its deliveries and was moved aside
    DeadLettered,
}

impl FailOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailOutcome::Requeued => "requeued",
            FailOutcome::DeadLettered => "dead_lettered",
        }
    }
}
