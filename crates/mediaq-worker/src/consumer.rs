//! Handler registry and outcome reporting.
//!
//! `JobConsumer` routes each delivery to the handler registered for its kind
//! and reports the result to the broker exactly once: `ack` on success,
//! `fail` on error. Lifecycle events are broadcast afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, Instrument};

use mediaq_models::{JobState, ProcessingResult};
use mediaq_queue::{Broker, Delivery, FailOutcome, JobEvent, JobEvents, QueueError};

use crate::error::ProcessError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, RetryConfig};

/// Work to run for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<ProcessingResult, ProcessError>;
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Handler succeeded and the broker acknowledged the job.
    Completed(ProcessingResult),
    /// Handler failed (or no handler exists) and the broker was told.
    Failed { error: String, outcome: FailOutcome },
    /// The broker could not be reached; the delivery stays pending and will
    /// be redelivered after its visibility timeout.
    Unreported { error: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    /// Where the job stands after this delivery.
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed {
                outcome: FailOutcome::DeadLettered,
                ..
            } => JobState::DeadLettered,
            JobOutcome::Failed { .. } => JobState::Failed,
            JobOutcome::Unreported { .. } => JobState::InFlight,
        }
    }
}

/// Dispatches deliveries to registered handlers.
pub struct JobConsumer {
    broker: Arc<dyn Broker>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    events: JobEvents,
    retry: RetryConfig,
}

impl JobConsumer {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            handlers: HashMap::new(),
            events: JobEvents::default(),
            retry: RetryConfig::new("broker"),
        }
    }

    /// Broadcast lifecycle events on an existing channel.
    pub fn with_events(mut self, events: JobEvents) -> Self {
        self.events = events;
        self
    }

    /// Backoff policy for broker ack/fail calls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Register `handler` for jobs of `kind`, replacing any earlier one.
    pub fn on_job_available(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> &mut Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn events(&self) -> &JobEvents {
        &self.events
    }

    /// Run one delivery to completion and report it.
    pub async fn dispatch(&self, delivery: Delivery) -> JobOutcome {
        let logger = JobLogger::new(&delivery.job_id, &delivery.attempt_id, &delivery.kind);
        let span = logger.create_span();
        self.dispatch_inner(delivery, logger).instrument(span).await
    }

    async fn dispatch_inner(&self, delivery: Delivery, logger: JobLogger) -> JobOutcome {
        logger.log_start(&format!(
            "{} (delivery {})",
            delivery.job.file_name(),
            delivery.delivery_count
        ));

        let result = match self.handlers.get(&delivery.kind) {
            Some(handler) => handler.handle(&delivery).await.map_err(|e| {
                metrics::record_job_error(e.label());
                logger.log_error(&format!("{} (retryable: {})", e, e.is_retryable()));
                e.to_string()
            }),
            None => {
                let error = format!("no handler registered for job kind `{}`", delivery.kind);
                logger.log_error(&error);
                Err(error)
            }
        };

        let outcome = match result {
            Ok(result) => self.complete(&delivery, result, &logger).await,
            Err(error) => self.fail(&delivery, error, &logger).await,
        };
        debug!(state = %outcome.state(), "Delivery settled");
        outcome
    }

    async fn complete(
        &self,
        delivery: &Delivery,
        result: ProcessingResult,
        logger: &JobLogger,
    ) -> JobOutcome {
        let acked = retry_async(
            &self.retry.named("ack"),
            QueueError::is_transient,
            || self.broker.ack(delivery),
        )
        .await;

        if let Err(e) = acked {
            logger.log_error(&format!("Failed to acknowledge job: {}", e));
            return JobOutcome::Unreported {
                error: e.to_string(),
            };
        }

        metrics::record_job_completed(&delivery.kind);
        logger.log_completion(&format!(
            "{} in {} ms",
            result.thumbnail,
            (Utc::now() - delivery.received_at).num_milliseconds()
        ));
        self.events
            .emit(JobEvent::completed(delivery.job_id.clone(), result.clone()));
        JobOutcome::Completed(result)
    }

    async fn fail(&self, delivery: &Delivery, error: String, logger: &JobLogger) -> JobOutcome {
        let reported = retry_async(
            &self.retry.named("fail"),
            QueueError::is_transient,
            || self.broker.fail(delivery, &error),
        )
        .await;

        let outcome = match reported {
            Ok(outcome) => outcome,
            Err(e) => {
                logger.log_error(&format!("Failed to report job failure: {}", e));
                return JobOutcome::Unreported { error };
            }
        };

        metrics::record_job_failed(&delivery.kind, outcome.as_str());
        match outcome {
            FailOutcome::Requeued => logger.log_warning(&format!(
                "attempt {} failed, job requeued",
                delivery.delivery_count
            )),
            FailOutcome::DeadLettered => logger.log_error(&format!(
                "attempt {} failed, job dead-lettered",
                delivery.delivery_count
            )),
        }
        self.events
            .emit(JobEvent::failed(delivery.job_id.clone(), error.clone(), outcome));
        JobOutcome::Failed { error, outcome }
    }
}
