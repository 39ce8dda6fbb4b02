//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediaq_models::{AttemptId, JobId};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "mediaq=info";

/// Install the global tracing subscriber.
///
/// Text with ANSI colours by default, JSON lines when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job id, the attempt id and the job kind so a
/// single attempt can be followed through the logs.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    attempt_id: String,
    kind: String,
}

impl JobLogger {
    /// Create a new job logger for one attempt of a job.
    pub fn new(job_id: &JobId, attempt_id: &AttemptId, kind: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            attempt_id: attempt_id.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Log the start of a job attempt.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            kind = %self.kind,
            "Job started: {}", message
        );
    }

    /// Log a step of the attempt.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            kind = %self.kind,
            "Job progress: {}", message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            kind = %self.kind,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            kind = %self.kind,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job attempt.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            kind = %self.kind,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Create a tracing span for this attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            kind = %self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::from_string("1700000000000-0");
        let attempt_id = AttemptId::new();
        let logger = JobLogger::new(&job_id, &attempt_id, "process-video");

        assert_eq!(logger.job_id(), "1700000000000-0");
        assert_eq!(logger.attempt_id(), attempt_id.as_str());
        assert_eq!(logger.kind(), "process-video");
    }
}
