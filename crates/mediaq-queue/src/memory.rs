//! In-process broker.
//!
//! Mirrors the delivery semantics of the Redis broker without a server:
//! a failed job stays leased to its consumer until `claim_stale` picks it
//! up again after the visibility timeout. Once it has been delivered
//! `max_deliveries` times it is dead-lettered instead.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, warn};

use mediaq_models::{JobDescriptor, JobId};

use crate::broker::Broker;
use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, FailOutcome, QueueMessage};

#[derive(Debug, Clone)]
struct Entry {
    id: JobId,
    message: QueueMessage,
    deliveries: u32,
}

#[derive(Debug)]
struct Lease {
    entry: Entry,
    consumer: String,
    since: Instant,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<Entry>,
    in_flight: HashMap<JobId, Lease>,
    last_errors: HashMap<JobId, String>,
    acked: Vec<JobId>,
    failures: Vec<(JobId, String)>,
    dead: Vec<(JobId, String)>,
}

/// Broker kept entirely in memory.
pub struct MemoryBroker {
    state: Mutex<State>,
    available: Notify,
    max_deliveries: u32,
    visibility_timeout: Duration,
    closed: AtomicBool,
    ack_failures: AtomicU32,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(3)
    }
}

impl MemoryBroker {
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: Notify::new(),
            max_deliveries: max_deliveries.max(1),
            visibility_timeout: Duration::from_secs(600),
            closed: AtomicBool::new(false),
            ack_failures: AtomicU32::new(0),
        }
    }

    /// Idle time after which a pending job may be claimed again.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Make the next `n` acks fail with a transient connection error.
    pub fn fail_next_acks(&self, n: u32) {
        self.ack_failures.store(n, Ordering::SeqCst);
    }

    /// Publish a job.
    pub async fn enqueue(&self, kind: &str, job: JobDescriptor) -> JobId {
        let id = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = JobId::from_string(format!("{}-0", state.next_id));
            state.ready.push_back(Entry {
                id: id.clone(),
                message: QueueMessage::new(kind, job),
                deliveries: 0,
            });
            id
        };
        self.available.notify_waiters();
        id
    }

    /// Jobs acknowledged so far, in order.
    pub async fn acked(&self) -> Vec<JobId> {
        self.state.lock().await.acked.clone()
    }

    /// Every reported failure, in order.
    pub async fn failures(&self) -> Vec<(JobId, String)> {
        self.state.lock().await.failures.clone()
    }

    /// Dead-lettered jobs with their last error.
    pub async fn dead_lettered(&self) -> Vec<(JobId, String)> {
        self.state.lock().await.dead.clone()
    }

    /// Jobs waiting for a consumer.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Jobs delivered and neither acked nor dead-lettered.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.is_closed() {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    fn lease(state: &mut State, mut entry: Entry, consumer: &str) -> Delivery {
        entry.deliveries += 1;
        let delivery = Delivery::new(entry.id.clone(), entry.message.clone(), entry.deliveries);
        state.in_flight.insert(
            entry.id.clone(),
            Lease {
                entry,
                consumer: consumer.to_string(),
                since: Instant::now(),
            },
        );
        delivery
    }

    async fn take_lease(&self, delivery: &Delivery) -> QueueResult<(MutexGuard<'_, State>, Entry)> {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(&delivery.job_id) {
            Some(lease) => Ok((state, lease.entry)),
            None => Err(QueueError::UnknownDelivery(delivery.job_id.to_string())),
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn init(&self) -> QueueResult<()> {
        self.ensure_open()
    }

    async fn fetch(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            let notified = self.available.notified();
            self.ensure_open()?;

            {
                let mut state = self.state.lock().await;
                let mut deliveries = Vec::new();
                while deliveries.len() < count {
                    let Some(entry) = state.ready.pop_front() else {
                        break;
                    };
                    deliveries.push(Self::lease(&mut state, entry, consumer));
                }
                if !deliveries.is_empty() {
                    return Ok(deliveries);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn claim_stale(&self, consumer: &str, count: usize) -> QueueResult<Vec<Delivery>> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;

        let mut stale: Vec<(Instant, JobId)> = state
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.since.elapsed() >= self.visibility_timeout)
            .map(|(id, lease)| (lease.since, id.clone()))
            .collect();
        stale.sort_by_key(|(since, _)| *since);
        stale.truncate(count);

        let mut deliveries = Vec::new();
        for (_, id) in stale {
            let Some(lease) = state.in_flight.remove(&id) else {
                continue;
            };
            if lease.entry.deliveries >= self.max_deliveries {
                warn!("Dead-lettering job {} after {} deliveries", id, lease.entry.deliveries);
                let reason = state.last_errors.remove(&id).unwrap_or_else(|| {
                    "delivery limit reached without a reported outcome".to_string()
                });
                state.dead.push((id, reason));
                continue;
            }
            debug!("Claimed stale job {} from {}", id, lease.consumer);
            deliveries.push(Self::lease(&mut state, lease.entry, consumer));
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ensure_open()?;
        let injected = self
            .ack_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(QueueError::connection_failed("injected ack failure"));
        }

        let (mut state, entry) = self.take_lease(delivery).await?;
        state.last_errors.remove(&entry.id);
        state.acked.push(entry.id);
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> QueueResult<FailOutcome> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let deliveries = match state.in_flight.get(&delivery.job_id) {
            Some(lease) => lease.entry.deliveries,
            None => return Err(QueueError::UnknownDelivery(delivery.job_id.to_string())),
        };
        state
            .failures
            .push((delivery.job_id.clone(), reason.to_string()));

        if deliveries >= self.max_deliveries {
            state.in_flight.remove(&delivery.job_id);
            state.last_errors.remove(&delivery.job_id);
            state.dead.push((delivery.job_id.clone(), reason.to_string()));
            return Ok(FailOutcome::DeadLettered);
        }

        // stays pending; idle time keeps counting from the delivery
        state
            .last_errors
            .insert(delivery.job_id.clone(), reason.to_string());
        Ok(FailOutcome::Requeued)
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_waiters();
        Ok(())
    }
}
