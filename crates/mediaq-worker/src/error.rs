//! Worker error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use mediaq_media::TranscodeError;
use mediaq_models::ModelError;
use mediaq_queue::QueueError;
use mediaq_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failure of a single job attempt.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] ModelError),

    #[error("Failed to stage {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Upload timed out after {0:?}")]
    UploadTimeout(Duration),
}

impl ProcessError {
    pub fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Staging {
            path: path.into(),
            source,
        }
    }

    /// Whether another delivery of the same job could succeed.
    ///
    /// Only used for logging; redelivery is decided by the broker.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessError::InvalidJob(_) => false,
            ProcessError::Staging { .. } => true,
            ProcessError::Transcode(e) => {
                matches!(e, TranscodeError::Timeout(_) | TranscodeError::Io(_))
            }
            ProcessError::Storage(e) => e.is_transient(),
            ProcessError::UploadTimeout(_) => true,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessError::InvalidJob(_) => "invalid_job",
            ProcessError::Staging { .. } => "staging",
            ProcessError::Transcode(_) => "transcode",
            ProcessError::Storage(_) => "storage",
            ProcessError::UploadTimeout(_) => "upload_timeout",
        }
    }
}

/// Errors that stop the worker itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Worker task failed: {0}")]
    TaskFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }
}
