//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    /// Map an S3 error code to the matching variant.
    ///
    /// `fallback` builds the error used when the code says nothing more
    /// specific than "the operation failed".
    pub fn from_code(
        code: Option<&str>,
        bucket: &str,
        key: &str,
        message: String,
        fallback: fn(String) -> StorageError,
    ) -> Self {
        match code {
            Some("NoSuchBucket") => Self::BucketNotFound(bucket.to_string()),
            Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
                Self::AccessDenied(message)
            }
            Some("NoSuchKey" | "NotFound") => Self::NotFound(format!("{}/{}", bucket, key)),
            _ => fallback(message),
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::UploadFailed(_) | StorageError::DownloadFailed(_) | StorageError::AwsSdk(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        let err = StorageError::from_code(
            Some("NoSuchBucket"),
            "media",
            "thumbnails/a.jpg",
            "nope".into(),
            StorageError::UploadFailed,
        );
        assert!(matches!(err, StorageError::BucketNotFound(b) if b == "media"));

        let err = StorageError::from_code(
            Some("SignatureDoesNotMatch"),
            "media",
            "k",
            "bad secret".into(),
            StorageError::UploadFailed,
        );
        assert!(matches!(err, StorageError::AccessDenied(_)));
        assert!(!err.is_transient());

        let err = StorageError::from_code(
            Some("NoSuchKey"),
            "media",
            "k",
            String::new(),
            StorageError::DownloadFailed,
        );
        assert_eq!(err.to_string(), "Object not found: media/k");

        let err = StorageError::from_code(
            None,
            "media",
            "k",
            "dispatch failure".into(),
            StorageError::UploadFailed,
        );
        assert!(matches!(err, StorageError::UploadFailed(ref m) if m == "dispatch failure"));
        assert!(err.is_transient());
    }
}
