//! Job lifecycle events.
//!
//! Events are published after the broker has been told the outcome of an
//! attempt. Nothing on the job path waits for subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use mediaq_models::{JobId, ProcessingResult};

use crate::job::FailOutcome;

/// Outcome of one job attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Completed {
        job_id: JobId,
        result: ProcessingResult,
        at: DateTime<Utc>,
    },
    Failed {
        job_id: JobId,
        error: String,
        outcome: FailOutcome,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn completed(job_id: JobId, result: ProcessingResult) -> Self {
        Self::Completed {
            job_id,
            result,
            at: Utc::now(),
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>, outcome: FailOutcome) -> Self {
        Self::Failed {
            job_id,
            error: error.into(),
            outcome,
            at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Completed { job_id, .. } | Self::Failed { job_id, .. } => job_id,
        }
    }
}

/// Broadcast channel for job events.
#[derive(Debug, Clone)]
pub struct JobEvents {
    sender: broadcast::Sender<JobEvent>,
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

impl JobEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: JobEvent) -> usize {
        let job_id = event.job_id().clone();
        match self.sender.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("No subscribers for event on job {}", job_id);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = JobEvents::default();
        let mut rx = events.subscribe();

        let sent = events.emit(JobEvent::completed(
            JobId::from_string("1-0"),
            ProcessingResult::thumbnail("thumbnails/clip.mp4_thumb.jpg"),
        ));
        assert_eq!(sent, 1);

        match rx.recv().await.unwrap() {
            JobEvent::Completed { job_id, result, .. } => {
                assert_eq!(job_id.as_str(), "1-0");
                assert_eq!(result.thumbnail, "thumbnails/clip.mp4_thumb.jpg");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let events = JobEvents::default();
        let sent = events.emit(JobEvent::failed(
            JobId::from_string("1-0"),
            "boom",
            FailOutcome::Requeued,
        ));
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = JobEvent::failed(JobId::from_string("7-0"), "boom", FailOutcome::DeadLettered);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "failed");
        assert_eq!(json["job_id"], "7-0");
        assert_eq!(json["outcome"], "dead_lettered");
    }
}
