//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use mediaq_queue::Delivery;

use crate::config::WorkerConfig;
use crate::consumer::JobConsumer;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::FailureTracker;

/// Back-off after a failed fetch.
const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Fetches deliveries while pool slots are free and runs them concurrently.
pub struct JobExecutor {
    config: WorkerConfig,
    consumer: Arc<JobConsumer>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, consumer: JobConsumer) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            consumer: Arc::new(consumer),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer(&self) -> &Arc<JobConsumer> {
        &self.consumer
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Jobs currently running.
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    /// Run until `shutdown` is called, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.consumer.broker().init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(3);
        // Claim right away to pick up work left by a previous crash.
        let mut next_claim = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            // A delivery is only fetched or claimed once a slot is free.
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.consume_jobs(permit, &mut next_claim).await {
                Ok(_) => failures.record_success(),
                Err(e) => {
                    if failures.record_failure() {
                        error!("Error consuming jobs: {}", e);
                    }
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(FETCH_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Waiting for {} in-flight jobs to complete...", self.in_flight());
        self.wait_for_jobs().await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Fill the free slots: stale deliveries first when a claim is due,
    /// then new ones from the stream.
    async fn consume_jobs(
        &self,
        first: OwnedSemaphorePermit,
        next_claim: &mut Instant,
    ) -> WorkerResult<usize> {
        let mut permits = vec![first];
        while permits.len() < self.config.max_fetch_batch {
            match Arc::clone(&self.job_semaphore).try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => break,
            }
        }

        let broker = self.consumer.broker();
        let mut started = 0;

        if Instant::now() >= *next_claim {
            *next_claim = Instant::now() + self.config.claim_interval;
            let claimed = broker
                .claim_stale(&self.consumer_name, permits.len())
                .await?;
            if !claimed.is_empty() {
                info!("Claimed {} pending jobs", claimed.len());
            }
            started += self.start_jobs(claimed, &mut permits).await?;
            if permits.is_empty() {
                return Ok(started);
            }
        }

        let deliveries = broker
            .fetch(&self.consumer_name, self.config.fetch_block, permits.len())
            .await?;
        if !deliveries.is_empty() {
            debug!("Consumed {} jobs from queue", deliveries.len());
        }
        started += self.start_jobs(deliveries, &mut permits).await?;
        Ok(started)
    }

    /// Spawn one task per delivery, each holding a pool slot until it is done.
    async fn start_jobs(
        &self,
        deliveries: Vec<Delivery>,
        permits: &mut Vec<OwnedSemaphorePermit>,
    ) -> WorkerResult<usize> {
        let count = deliveries.len();
        for delivery in deliveries {
            let permit = match permits.pop() {
                Some(permit) => permit,
                None => Arc::clone(&self.job_semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkerError::task_failed("job pool closed"))?,
            };
            let consumer = Arc::clone(&self.consumer);
            tokio::spawn(async move {
                let _permit = permit;
                consumer.dispatch(delivery).await;
            });
        }
        Ok(count)
    }

    /// Wait until every pool slot is free again.
    async fn wait_for_jobs(&self) {
        let all = self.config.max_concurrent_jobs as u32;
        if let Ok(permits) = self.job_semaphore.acquire_many(all).await {
            drop(permits);
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
