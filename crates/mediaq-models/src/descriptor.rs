//! Job payloads and results.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ModelError, ModelResult};
use crate::path::SafeFileName;

/// One unit of media work, as published to the queue.
///
/// Wire format: `{ "filePath": ..., "fileName": ..., "bucket": ... }`.
/// Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    file_path: String,
    file_name: String,
    bucket: String,
}

impl JobDescriptor {
    pub fn new(
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            bucket: bucket.into(),
        }
    }

    /// Absolute path of the staged input file.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Logical name, possibly with a virtual subfolder.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Target bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Check all fields and return the sanitized `fileName`.
    pub fn validate(&self) -> ModelResult<SafeFileName> {
        if self.file_path.is_empty() {
            return Err(ModelError::EmptyField("filePath"));
        }
        if !Path::new(&self.file_path).is_absolute() {
            return Err(ModelError::RelativeFilePath(self.file_path.clone()));
        }
        if self.bucket.trim().is_empty() {
            return Err(ModelError::EmptyField("bucket"));
        }
        SafeFileName::parse(&self.file_name)
    }
}

/// Result of a successfully processed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Always `true`; failures travel on the error channel.
    pub success: bool,
    /// Object key of the uploaded thumbnail.
    pub thumbnail: String,
}

impl ProcessingResult {
    pub fn thumbnail(key: impl Into<String>) -> Self {
        Self {
            success: true,
            thumbnail: key.into(),
        }
    }
}
