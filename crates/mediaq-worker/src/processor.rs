//! Media job processor.
//!
//! One attempt runs through `Received -> Staged -> Transcoded -> Uploaded ->
//! Cleaned -> Done`. A failing step skips ahead to `Cleaned`, so nothing an
//! attempt staged survives it. The input file is never touched.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use mediaq_media::Transcoder;
use mediaq_models::{AttemptId, JobDescriptor, ProcessingResult, SafeFileName};
use mediaq_queue::Delivery;
use mediaq_storage::ObjectStore;

use crate::consumer::JobHandler;
use crate::error::ProcessError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::staging::{StagedAttempt, StagingArea};

/// Generates a thumbnail for a staged video and uploads it.
pub struct MediaJobProcessor {
    transcoder: Arc<dyn Transcoder>,
    store: Arc<dyn ObjectStore>,
    staging: StagingArea,
    upload_timeout: Option<Duration>,
}

impl MediaJobProcessor {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        store: Arc<dyn ObjectStore>,
        staging: StagingArea,
    ) -> Self {
        Self {
            transcoder,
            store,
            staging,
            upload_timeout: None,
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Run one attempt of `job`.
    pub async fn process(
        &self,
        job: &JobDescriptor,
        attempt_id: &AttemptId,
        logger: &JobLogger,
    ) -> Result<ProcessingResult, ProcessError> {
        // Rejects `..`, absolute and empty names before any path is built.
        let file_name = job.validate()?;

        let staged = self.staging.prepare(attempt_id, &file_name).await?;
        logger.log_progress(&format!("staged at {}", staged.attempt_dir().display()));

        let result = self.transcode_and_upload(job, &file_name, &staged, logger).await;

        for warning in staged.cleanup().await {
            metrics::record_cleanup_warning();
            logger.log_warning(&format!("cleanup: {}", warning));
        }

        result
    }

    async fn transcode_and_upload(
        &self,
        job: &JobDescriptor,
        file_name: &SafeFileName,
        staged: &StagedAttempt,
        logger: &JobLogger,
    ) -> Result<ProcessingResult, ProcessError> {
        let started = Instant::now();
        let transcoded = self
            .transcoder
            .generate_derived_artifact(Path::new(job.file_path()), staged.thumbnail_path())
            .await;
        metrics::record_transcode_duration(transcoded.is_ok(), started.elapsed().as_secs_f64());
        transcoded?;
        logger.log_progress(&format!(
            "thumbnail written to {}",
            staged.thumbnail_path().display()
        ));

        let key = file_name.thumbnail_key();
        let started = Instant::now();
        self.upload(job.bucket(), &key, staged.thumbnail_path())
            .await?;
        metrics::record_upload_duration(started.elapsed().as_secs_f64());
        logger.log_progress(&format!("uploaded {}/{}", job.bucket(), key));

        Ok(ProcessingResult::thumbnail(key))
    }

    async fn upload(&self, bucket: &str, key: &str, path: &Path) -> Result<(), ProcessError> {
        let put = self.store.put_object(bucket, key, path);
        match self.upload_timeout {
            Some(limit) => tokio::time::timeout(limit, put)
                .await
                .map_err(|_| ProcessError::UploadTimeout(limit))??,
            None => put.await?,
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for MediaJobProcessor {
    async fn handle(&self, delivery: &Delivery) -> Result<ProcessingResult, ProcessError> {
        let logger = JobLogger::new(&delivery.job_id, &delivery.attempt_id, &delivery.kind);
        self.process(&delivery.job, &delivery.attempt_id, &logger)
            .await
    }
}
