//! Media job worker.
//!
//! This crate provides:
//! - The thumbnail job processor (stage, transcode, upload, clean up)
//! - Handler registration and ack/fail reporting
//! - A bounded executor with stale-delivery recovery
//! - Graceful shutdown on SIGTERM/SIGINT

pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod staging;

pub use config::WorkerConfig;
pub use consumer::{JobConsumer, JobHandler, JobOutcome};
pub use error::{ProcessError, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use lifecycle::{shutdown_signal, Worker};
pub use logging::{init_tracing, JobLogger};
pub use processor::MediaJobProcessor;
pub use retry::{retry_async, FailureTracker, RetryConfig};
pub use staging::{CleanupWarning, StagedAttempt, StagingArea};
