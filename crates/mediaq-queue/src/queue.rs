//! Job queue using Redis Streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply,
};
use redis::{AsyncCommands, AsyncConnectionConfig, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use mediaq_models::{JobDescriptor, JobId, QUEUE_NAME};

use crate::broker::Broker;
use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, FailOutcome, QueueMessage};

/// Default idle time before a pending delivery is reclaimed.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 600;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Deliveries allowed before a job is dead-lettered
    pub max_deliveries: u32,
    /// Idle time after which a pending delivery may be claimed again
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: QUEUE_NAME.to_string(),
            consumer_group: "media-workers".to_string(),
            dlq_stream_name: format!("{}:dlq", QUEUE_NAME),
            max_deliveries: 3,
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECS),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let stream_name = std::env::var("QUEUE_NAME").unwrap_or_else(|_| QUEUE_NAME.to_string());
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "media-workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| format!("{}:dlq", stream_name)),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECS),
            ),
            stream_name,
        }
    }

    /// Hash holding the last failure reason per pending message.
    fn errors_key(&self) -> String {
        format!("{}:errors", self.stream_name)
    }
}

/// Redis Streams broker.
///
/// Blocking reads use their own connection so they never stall ack/fail
/// traffic on the command connection.
pub struct RedisBroker {
    client: redis::Client,
    config: QueueConfig,
    read_conn: Mutex<Option<MultiplexedConnection>>,
    command_conn: Mutex<Option<MultiplexedConnection>>,
    closed: AtomicBool,
}

impl RedisBroker {
    /// Create a new broker client. No connection is made until first use.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            read_conn: Mutex::new(None),
            command_conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connect(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
        response_timeout: Duration,
    ) -> QueueResult<MultiplexedConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let mut guard = slot.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(Duration::from_secs(5))
            .set_response_timeout(response_timeout);
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.connect(&self.command_conn, Duration::from_secs(10)).await
    }

    /// Forget a connection after an I/O failure so the next call reconnects.
    async fn reset_on_error<T>(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
        result: QueueResult<T>,
    ) -> QueueResult<T> {
        if let Err(e) = &result {
            if e.is_transient() {
                slot.lock().await.take();
            }
        }
        result
    }

    /// Publish a job. Returns the broker-assigned job id.
    pub async fn enqueue(&self, kind: &str, job: &JobDescriptor) -> QueueResult<JobId> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("kind")
            .arg(kind)
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!("Enqueued {} job {} ({})", kind, message_id, job.file_name());
        Ok(JobId::from_string(message_id))
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get dead letter stream length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    async fn remove(&self, conn: &mut MultiplexedConnection, message_id: &str) -> QueueResult<()> {
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        conn.hdel::<_, _, ()>(self.config.errors_key(), message_id)
            .await?;
        Ok(())
    }

    /// Copy an entry to the dead letter stream and drop it from the queue.
    ///
    /// The copy and the removal run in one MULTI/EXEC. An entry that is
    /// already gone from the stream is skipped, so repeating the call never
    /// writes a second dead letter.
    async fn dead_letter(&self, entry: &StreamId, reason: &str, deliveries: u32) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let present: StreamRangeReply = conn
            .xrange(&self.config.stream_name, &entry.id, &entry.id)
            .await?;
        if present.ids.is_empty() {
            debug!("Job {} already removed, not dead-lettering again", entry.id);
            return Ok(());
        }

        redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("kind")
            .arg(field_string(&entry.map, "kind").unwrap_or_default())
            .arg("job")
            .arg(field_string(&entry.map, "job").unwrap_or_default())
            .arg("error")
            .arg(reason)
            .arg("original_id")
            .arg(&entry.id)
            .arg("deliveries")
            .arg(deliveries)
            .ignore()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&entry.id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(&entry.id)
            .ignore()
            .cmd("HDEL")
            .arg(self.config.errors_key())
            .arg(&entry.id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        warn!("Moved job {} to {}: {}", entry.id, self.config.dlq_stream_name, reason);
        Ok(())
    }

    /// Turn a stream entry into a delivery, dead-lettering it if unreadable.
    async fn decode_entry(&self, entry: StreamId, delivery_count: u32) -> QueueResult<Option<Delivery>> {
        match parse_message(&entry.map) {
            Ok(message) => Ok(Some(Delivery::new(
                JobId::from_string(entry.id.clone()),
                message,
                delivery_count,
            ))),
            Err(reason) => {
                warn!("Malformed job {}: {}", entry.id, reason);
                self.dead_letter(&entry, &format!("malformed message: {}", reason), delivery_count)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn fetch_inner(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self
            .connect(&self.read_conn, block + Duration::from_secs(5))
            .await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count);
        // BLOCK 0 would wait forever
        if !block.is_zero() {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        let reply: Option<StreamReadReply> = cmd
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in stream_key.ids {
                let id = entry.id.clone();
                match self.decode_entry(entry, 1).await {
                    Ok(Some(delivery)) => {
                        debug!("Fetched job {} ({})", delivery.job_id, delivery.kind);
                        deliveries.push(delivery);
                    }
                    Ok(None) => {}
                    // left pending; the next claim retries the dead-lettering
                    Err(e) => error!("Failed to dead-letter malformed job {}: {}", id, e),
                }
            }
        }
        Ok(deliveries)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    /// Create the consumer group if it does not exist.
    ///
    /// The group starts at the beginning of the stream so jobs published
    /// before the first worker ever started are not skipped.
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn fetch(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let result = self.fetch_inner(consumer, block, count).await;
        self.reset_on_error(&self.read_conn, result).await
    }

    async fn claim_stale(&self, consumer: &str, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let previous: HashMap<String, u32> = pending
            .ids
            .iter()
            .map(|p| (p.id.clone(), p.times_delivered as u32))
            .collect();
        let ids: Vec<String> = previous.keys().cloned().collect();

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for entry in claimed.ids {
            let delivered = previous.get(&entry.id).copied().unwrap_or(0);
            if delivered >= self.config.max_deliveries {
                let last_error: Option<String> =
                    conn.hget(self.config.errors_key(), &entry.id).await?;
                let reason = last_error
                    .unwrap_or_else(|| "delivery limit reached without a reported outcome".to_string());
                if let Err(e) = self.dead_letter(&entry, &reason, delivered).await {
                    error!("Failed to dead-letter job {}: {}", entry.id, e);
                }
                continue;
            }
            let id = entry.id.clone();
            match self.decode_entry(entry, delivered + 1).await {
                Ok(Some(delivery)) => {
                    info!(
                        "Claimed stale job {} (delivery {})",
                        delivery.job_id, delivery.delivery_count
                    );
                    deliveries.push(delivery);
                }
                Ok(None) => {}
                Err(e) => error!("Failed to dead-letter malformed job {}: {}", id, e),
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let result: QueueResult<()> = async {
            let mut conn = self.conn().await?;
            self.remove(&mut conn, delivery.job_id.as_str()).await
        }
        .await;
        let result = self.reset_on_error(&self.command_conn, result).await;
        if result.is_ok() {
            debug!("Acknowledged job {}", delivery.job_id);
        }
        result
    }

    /// Record the failure; the entry stays pending until it is claimed again
    /// after the visibility timeout, or is dead-lettered once the broker's
    /// delivery counter reaches the limit.
    async fn fail(&self, delivery: &Delivery, reason: &str) -> QueueResult<FailOutcome> {
        let result: QueueResult<FailOutcome> = async {
            if delivery.delivery_count >= self.config.max_deliveries {
                let entry = StreamId {
                    id: delivery.job_id.to_string(),
                    map: message_fields(&QueueMessage::new(
                        delivery.kind.clone(),
                        delivery.job.clone(),
                    ))?,
                };
                self.dead_letter(&entry, reason, delivery.delivery_count).await?;
                return Ok(FailOutcome::DeadLettered);
            }

            let mut conn = self.conn().await?;
            conn.hset::<_, _, _, ()>(self.config.errors_key(), delivery.job_id.as_str(), reason)
                .await?;
            Ok(FailOutcome::Requeued)
        }
        .await;
        self.reset_on_error(&self.command_conn, result).await
    }

    async fn close(&self) -> QueueResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.read_conn.lock().await.take().is_some() {
            debug!("Closed consumer connection");
        }
        if self.command_conn.lock().await.take().is_some() {
            debug!("Closed command connection");
        }
        info!("Queue client closed");
        Ok(())
    }
}

/// Read a stream field as a string.
fn field_string(map: &HashMap<String, Value>, name: &str) -> Option<String> {
    map.get(name)
        .and_then(|v| redis::from_redis_value::<String>(v).ok())
}

/// Decode the `kind` and `job` fields of a stream entry.
pub(crate) fn parse_message(map: &HashMap<String, Value>) -> Result<QueueMessage, String> {
    let kind = field_string(map, "kind").ok_or("missing `kind` field")?;
    let payload = field_string(map, "job").ok_or("missing `job` field")?;
    let job: JobDescriptor =
        serde_json::from_str(&payload).map_err(|e| format!("invalid job payload: {}", e))?;
    Ok(QueueMessage { kind, job })
}

fn message_fields(message: &QueueMessage) -> QueueResult<HashMap<String, Value>> {
    let payload = serde_json::to_string(&message.job)?;
    Ok(HashMap::from([
        ("kind".to_string(), Value::BulkString(message.kind.clone().into_bytes())),
        ("job".to_string(), Value::BulkString(payload.into_bytes())),
    ]))
}
