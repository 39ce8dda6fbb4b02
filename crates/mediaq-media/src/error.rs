//! Error types for transcoder invocations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for transcoder operations.
pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Errors raised when the external tool fails to produce an artifact.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Transcoder not found: {program}")]
    NotFound { program: String },

    #[error("Failed to launch transcoder {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoder exited with {}: {stderr}", exit_label(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Transcoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Transcoder produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    pub fn failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Failed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Standard-error text captured from the tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}
