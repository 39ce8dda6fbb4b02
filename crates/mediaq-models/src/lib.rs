//! Shared data models for the media job worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job descriptors pulled from the queue
//! - Processing results and job lifecycle states
//! - Job and attempt identifiers
//! - `fileName` sanitization and thumbnail key derivation

pub mod descriptor;
pub mod encoding;
pub mod error;
pub mod job;
pub mod path;

pub use descriptor::{JobDescriptor, ProcessingResult};
pub use encoding::{thumbnail_key, THUMBNAIL_KEY_PREFIX, THUMBNAIL_QUALITY, THUMBNAIL_SUFFIX, THUMBNAIL_TIMESTAMP};
pub use error::{ModelError, ModelResult};
pub use job::{AttemptId, JobId, JobState, PROCESS_VIDEO_KIND, QUEUE_NAME};
pub use path::SafeFileName;
