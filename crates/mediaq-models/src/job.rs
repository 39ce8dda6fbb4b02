//! Job identifiers and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Queue carrying media jobs.
pub const QUEUE_NAME: &str = "media processing";
/// Job kind handled by the thumbnail processor.
pub const PROCESS_VIDEO_KIND: &str = "process-video";

/// Broker-assigned identifier for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a single delivery attempt of a job.
///
/// A job redelivered by the broker gets a fresh attempt id, so local staging
/// never collides between attempts or between jobs sharing a `fileName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub String);

impl AttemptId {
    /// Generate a new random attempt ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue
    #[default]
    Queued,
    /// Delivered to exactly one worker
    InFlight,
    /// Acknowledged and removed from the queue
    Completed,
    /// Reported failed for this attempt; the broker decides what happens next
    Failed,
    /// Moved aside by the broker after too many deliveries
    DeadLettered,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::InFlight => "in_flight",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::DeadLettered => "dead_lettered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::DeadLettered)
    }

    /// Whether `next` is a legal transition from this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::InFlight)
                | (JobState::InFlight, JobState::Completed)
                | (JobState::InFlight, JobState::Failed)
                | (JobState::Failed, JobState::Queued)
                | (JobState::Failed, JobState::DeadLettered)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_ids_are_unique() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_job_state_transitions() {
        assert!(JobState::Queued.can_transition_to(JobState::InFlight));
        assert!(JobState::InFlight.can_transition_to(JobState::Completed));
        assert!(JobState::InFlight.can_transition_to(JobState::Failed));
        assert!(!JobState::Completed.can_transition_to(JobState::InFlight));
        assert!(!JobState::Queued.can_transition_to(JobState::Completed));
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::Failed.is_terminal());
    }

    #[test]
    fn test_job_state_serde() {
        let json = serde_json::to_string(&JobState::InFlight).unwrap();
        assert_eq!(json, "\"in_flight\"");
    }
}
