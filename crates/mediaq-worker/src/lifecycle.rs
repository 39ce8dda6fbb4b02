//! Worker startup and graceful shutdown.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use mediaq_models::PROCESS_VIDEO_KIND;
use mediaq_queue::{Broker, QueueConfig, RedisBroker};
use mediaq_storage::S3ObjectStore;

use crate::config::WorkerConfig;
use crate::consumer::JobConsumer;
use crate::error::{WorkerError, WorkerResult};
use crate::executor::JobExecutor;
use crate::processor::MediaJobProcessor;
use crate::staging::StagingArea;

/// A fully wired worker.
pub struct Worker {
    executor: Arc<JobExecutor>,
    broker: Arc<dyn Broker>,
}

impl Worker {
    pub fn new(executor: JobExecutor) -> Self {
        let broker = Arc::clone(executor.consumer().broker());
        Self {
            executor: Arc::new(executor),
            broker,
        }
    }

    /// Wire Redis, S3 and FFmpeg from the environment.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        tokio::fs::create_dir_all(&config.work_dir)
            .await
            .map_err(|e| {
                WorkerError::config_error(format!(
                    "cannot create work dir {}: {}",
                    config.work_dir.display(),
                    e
                ))
            })?;

        let queue_config = QueueConfig::from_env();
        config.check_visibility_timeout(queue_config.visibility_timeout)?;
        let broker: Arc<dyn Broker> = Arc::new(RedisBroker::new(queue_config)?);
        let store = Arc::new(S3ObjectStore::from_env()?);
        let transcoder = Arc::new(config.transcoder());

        let processor = MediaJobProcessor::new(
            transcoder,
            store,
            StagingArea::new(config.work_dir.clone()),
        )
        .with_upload_timeout(config.upload_timeout);

        let mut consumer = JobConsumer::new(broker);
        consumer.on_job_available(PROCESS_VIDEO_KIND, Arc::new(processor));

        Ok(Self::new(JobExecutor::new(config, consumer)))
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    /// Run until `signal` resolves, then drain and close.
    ///
    /// In-flight jobs are always allowed to finish; the broker is closed
    /// only after the last one has reported its outcome.
    pub async fn run_until<F>(self, signal: F) -> WorkerResult<()>
    where
        F: Future<Output = ()>,
    {
        let executor = Arc::clone(&self.executor);
        let mut run = tokio::spawn(async move { executor.run().await });

        let joined = tokio::select! {
            joined = &mut run => joined,
            _ = signal => {
                info!("Draining in-flight jobs");
                self.executor.shutdown();
                run.await
            }
        };

        let result = joined
            .map_err(|e| WorkerError::task_failed(format!("executor: {}", e)))
            .and_then(|r| r);
        if let Err(e) = &result {
            error!("Executor error: {}", e);
        }

        if let Err(e) = self.broker.close().await {
            warn!("Failed to close queue client: {}", e);
        }

        info!("Worker shutdown complete");
        result
    }
}

/// Resolve on SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use mediaq_models::{JobDescriptor, ProcessingResult};
    use mediaq_queue::{Delivery, MemoryBroker};
    use tokio::sync::oneshot;

    use crate::consumer::JobHandler;
    use crate::error::ProcessError;

    /// Holds the job until released, and records whether the broker was
    /// still open when it finished.
    struct GateHandler {
        broker: Arc<MemoryBroker>,
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
        broker_open_at_finish: AtomicBool,
    }

    #[async_trait]
    impl JobHandler for GateHandler {
        async fn handle(&self, _delivery: &Delivery) -> Result<ProcessingResult, ProcessError> {
            self.started.notify_one();
            self.release.notified().await;
            self.broker_open_at_finish
                .store(!self.broker.is_closed(), Ordering::SeqCst);
            Ok(ProcessingResult::thumbnail("thumbnails/clip.mp4_thumb.jpg"))
        }
    }

    #[tokio::test]
    async fn test_startup_rejects_short_visibility_timeout() {
        let work = tempfile::TempDir::new().unwrap();
        std::env::set_var("QUEUE_VISIBILITY_TIMEOUT", "30");
        let config = WorkerConfig {
            work_dir: work.path().to_path_buf(),
            ..WorkerConfig::default()
        };

        let result = Worker::from_env(config).await;
        std::env::remove_var("QUEUE_VISIBILITY_TIMEOUT");

        match result {
            Err(WorkerError::ConfigError(msg)) => assert!(msg.contains("QUEUE_VISIBILITY_TIMEOUT")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("worker started with a 30s visibility timeout"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_before_closing_broker() {
        let broker = Arc::new(MemoryBroker::default());
        let handler = Arc::new(GateHandler {
            broker: broker.clone(),
            started: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
            broker_open_at_finish: AtomicBool::new(false),
        });
        let mut consumer = JobConsumer::new(broker.clone());
        consumer.on_job_available(PROCESS_VIDEO_KIND, handler.clone());
        let worker = Worker::new(JobExecutor::new(
            WorkerConfig {
                max_concurrent_jobs: 1,
                fetch_block: Duration::from_millis(20),
                ..WorkerConfig::default()
            },
            consumer,
        ));

        broker
            .enqueue(
                PROCESS_VIDEO_KIND,
                JobDescriptor::new("/tmp/in/clip.mp4", "clip.mp4", "media"),
            )
            .await;

        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(worker.run_until(async {
            signal_rx.await.ok();
        }));

        handler.started.notified().await;
        signal_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the worker is draining, not done
        assert!(!running.is_finished());
        assert!(!broker.is_closed());

        handler.release.notify_one();
        running.await.unwrap().unwrap();

        assert!(handler.broker_open_at_finish.load(Ordering::SeqCst));
        assert_eq!(broker.acked().await.len(), 1);
        assert!(broker.is_closed());
    }
}
