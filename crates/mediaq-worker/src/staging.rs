//! Per-attempt staging directories.
//!
//! Each attempt works under `<work_dir>/<attempt_id>/`, so two attempts that
//! share a `fileName` never touch each other's files.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use mediaq_media::fs_utils::{remove_dir_if_exists, remove_if_exists};
use mediaq_models::{AttemptId, SafeFileName};

use crate::error::ProcessError;

/// Root under which attempts are staged.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging directory for one attempt.
    ///
    /// Creation is idempotent; an attempt directory left over from a crashed
    /// run with the same id is reused.
    pub async fn prepare(
        &self,
        attempt_id: &AttemptId,
        file_name: &SafeFileName,
    ) -> Result<StagedAttempt, ProcessError> {
        let attempt_dir = self.root.join(attempt_id.as_str());
        let thumbnail_path = attempt_dir.join(file_name.local_thumbnail_path());
        let dir = thumbnail_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| attempt_dir.clone());

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProcessError::staging(&dir, e))?;
        debug!("Staged attempt {} at {}", attempt_id, dir.display());

        Ok(StagedAttempt {
            attempt_dir,
            thumbnail_path,
        })
    }
}

/// Local files owned by one attempt.
#[derive(Debug)]
pub struct StagedAttempt {
    attempt_dir: PathBuf,
    thumbnail_path: PathBuf,
}

impl StagedAttempt {
    pub fn attempt_dir(&self) -> &Path {
        &self.attempt_dir
    }

    /// Where the transcoder writes the thumbnail.
    pub fn thumbnail_path(&self) -> &Path {
        &self.thumbnail_path
    }

    /// Remove the thumbnail and the whole attempt tree.
    ///
    /// Never fails; whatever could not be removed is reported back.
    pub async fn cleanup(self) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        if let Err(e) = remove_if_exists(&self.thumbnail_path).await {
            warnings.push(CleanupWarning::new(&self.thumbnail_path, e));
        }
        if let Err(e) = remove_dir_if_exists(&self.attempt_dir).await {
            warnings.push(CleanupWarning::new(&self.attempt_dir, e));
        }
        warnings
    }
}

/// A staged path that could not be removed.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub error: io::Error,
}

impl CleanupWarning {
    fn new(path: &Path, error: io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            error,
        }
    }
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to remove {}: {}", self.path.display(), self.error)
    }
}
