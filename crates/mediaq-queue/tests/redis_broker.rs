//! Redis broker integration tests.
//!
//! Run with `REDIS_URL` pointing at a disposable server.

use std::time::Duration;

use mediaq_models::{JobDescriptor, PROCESS_VIDEO_KIND};
use mediaq_queue::{Broker, FailOutcome, QueueConfig, RedisBroker};

/// A broker on streams no other test touches.
fn isolated_broker(max_deliveries: u32) -> (RedisBroker, QueueConfig) {
    let suffix = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let stream_name = format!("mediaq-test-{}", suffix);
    let config = QueueConfig {
        dlq_stream_name: format!("{}:dlq", stream_name),
        stream_name,
        max_deliveries,
        visibility_timeout: Duration::ZERO,
        ..QueueConfig::from_env()
    };
    let broker = RedisBroker::new(config.clone()).expect("Failed to create broker");
    (broker, config)
}

fn job() -> JobDescriptor {
    JobDescriptor::new("/tmp/in/clip.mp4", "clip.mp4", "media")
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_fetch_ack() {
    let (broker, _) = isolated_broker(3);
    broker.init().await.expect("Failed to initialize queue");

    let job_id = broker
        .enqueue(PROCESS_VIDEO_KIND, &job())
        .await
        .expect("Failed to enqueue");

    let deliveries = broker
        .fetch("consumer-a", Duration::from_millis(500), 1)
        .await
        .expect("Failed to fetch");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job_id, job_id);
    assert_eq!(deliveries[0].kind, PROCESS_VIDEO_KIND);
    assert_eq!(deliveries[0].job, job());
    assert_eq!(deliveries[0].delivery_count, 1);

    // in flight with consumer-a, not visible to others
    let others = broker
        .fetch("consumer-b", Duration::ZERO, 1)
        .await
        .expect("Failed to fetch");
    assert!(others.is_empty());

    broker.ack(&deliveries[0]).await.expect("Failed to ack");
    assert_eq!(broker.len().await.unwrap(), 0);
    broker.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_fail_then_dead_letter() {
    let (broker, _) = isolated_broker(2);
    broker.init().await.unwrap();
    broker.enqueue(PROCESS_VIDEO_KIND, &job()).await.unwrap();

    let first = broker
        .fetch("consumer-a", Duration::ZERO, 1)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(
        broker.fail(&first, "decoder error").await.unwrap(),
        FailOutcome::Requeued
    );

    let second = broker
        .claim_stale("consumer-b", 10)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(second.job_id, first.job_id);
    assert_eq!(second.delivery_count, 2);
    assert_ne!(second.attempt_id, first.attempt_id);

    assert_eq!(
        broker.fail(&second, "decoder error").await.unwrap(),
        FailOutcome::DeadLettered
    );
    assert_eq!(broker.len().await.unwrap(), 0);
    assert_eq!(broker.dlq_len().await.unwrap(), 1);

    // a retried report must not write a second dead letter
    assert_eq!(
        broker.fail(&second, "decoder error").await.unwrap(),
        FailOutcome::DeadLettered
    );
    assert_eq!(broker.dlq_len().await.unwrap(), 1);
    broker.close().await.unwrap();
}

async fn add_raw_entry(config: &QueueConfig, job_field: &str) {
    let client = redis::Client::open(config.redis_url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("XADD")
        .arg(&config.stream_name)
        .arg("*")
        .arg("kind")
        .arg(PROCESS_VIDEO_KIND)
        .arg("job")
        .arg(job_field)
        .query_async::<String>(&mut conn)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dead_letter_failure_keeps_rest_of_batch() {
    let (broker, config) = isolated_broker(3);
    broker.init().await.unwrap();

    // DLQ key of the wrong type makes every dead-lettering fail
    let client = redis::Client::open(config.redis_url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("SET")
        .arg(&config.dlq_stream_name)
        .arg("not a stream")
        .query_async::<()>(&mut conn)
        .await
        .unwrap();

    let job_id = broker.enqueue(PROCESS_VIDEO_KIND, &job()).await.unwrap();
    add_raw_entry(&config, "{not json").await;

    let deliveries = broker
        .fetch("consumer-a", Duration::ZERO, 2)
        .await
        .expect("batch must survive a failed dead-lettering");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job_id, job_id);

    redis::cmd("DEL")
        .arg(&config.dlq_stream_name)
        .query_async::<()>(&mut conn)
        .await
        .unwrap();
    broker.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_malformed_entry_is_dead_lettered() {
    let (broker, config) = isolated_broker(3);
    broker.init().await.unwrap();
    add_raw_entry(&config, "{not json").await;

    let deliveries = broker
        .fetch("consumer-a", Duration::ZERO, 1)
        .await
        .unwrap();
    assert!(deliveries.is_empty());
    assert_eq!(broker.dlq_len().await.unwrap(), 1);
    broker.close().await.unwrap();
}
