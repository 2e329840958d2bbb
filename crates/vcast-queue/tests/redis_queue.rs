//! Redis queue integration tests.

use std::time::Duration;

use vcast_models::{BaseTextData, JobState, Segment};
use vcast_queue::{JobQueue, QueueConfig, RedisJobQueue, RenderVideoJob, RetryPolicy, STALLED_REASON};

fn test_config(name: &str) -> QueueConfig {
    dotenvy::dotenv().ok();
    let mut config = QueueConfig::from_env();
    config.prefix = format!("vcast:test:{}:{}", name, std::process::id());
    config.retry = RetryPolicy::new(2, Duration::from_millis(200));
    config
}

fn payload() -> RenderVideoJob {
    RenderVideoJob::new(
        "uploads/test.mp3",
        "f".repeat(64),
        BaseTextData::new("Series", "Main", "Speaker"),
        vec![Segment::new(0.0, 2.0), Segment::new(2.0, 4.0)],
    )
}

/// Test a job from enqueue to completion.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_claim_complete() {
    let queue = RedisJobQueue::connect(&test_config("complete"))
        .await
        .expect("Failed to connect to Redis");

    let id = queue.enqueue(payload()).await.expect("Failed to enqueue");
    let claimed = queue
        .next_job()
        .await
        .expect("Failed to claim")
        .expect("Job should be ready");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.state, JobState::Active);
    assert_eq!(claimed.payload.segments.len(), 2);

    queue.update_progress(&id, 45).await.unwrap();
    queue.update_progress(&id, 10).await.unwrap();
    assert_eq!(queue.get_job(&id).await.unwrap().unwrap().progress, 45);

    queue.complete(&id, "/video-f.mp4".to_string()).await.unwrap();
    let record = queue.get_job(&id).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.progress, 100);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.active, 0);
}

/// Test retry with backoff and terminal failure.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_retry_then_fail() {
    let queue = RedisJobQueue::connect(&test_config("retry"))
        .await
        .expect("Failed to connect to Redis");

    let id = queue.enqueue(payload()).await.unwrap();
    queue.next_job().await.unwrap().unwrap();
    assert_eq!(queue.fail(&id, "first".into()).await.unwrap(), JobState::Waiting);

    // Still backing off
    assert!(queue.next_job().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let retry = queue.next_job().await.unwrap().expect("Job should be ready again");
    assert_eq!(retry.attempts_made, 2);

    assert_eq!(queue.fail(&id, "second".into()).await.unwrap(), JobState::Failed);
    let record = queue.get_job(&id).await.unwrap().unwrap();
    assert_eq!(record.failure_reason.as_deref(), Some("second"));
    assert_eq!(queue.counts().await.unwrap().failed, 1);
}

/// Test that a silent attempt is failed and retried, and a live one is left alone.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_stalled_attempt_is_recovered() {
    let queue = RedisJobQueue::connect(&test_config("stalled"))
        .await
        .expect("Failed to connect to Redis");

    let silent = queue.enqueue(payload()).await.unwrap();
    let live = queue.enqueue(payload()).await.unwrap();
    queue.next_job().await.unwrap().unwrap();
    queue.next_job().await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    queue.heartbeat(&live).await.unwrap();

    let recovered = queue.recover_stalled(Duration::from_millis(200)).await.unwrap();
    assert_eq!(recovered, vec![silent.clone()]);

    let record = queue.get_job(&silent).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Waiting);
    assert_eq!(record.failure_reason.as_deref(), Some(STALLED_REASON));
    assert_eq!(queue.get_job(&live).await.unwrap().unwrap().state, JobState::Active);

    // A late report from the abandoned attempt is rejected
    assert!(queue.complete(&silent, "/video-f.mp4".into()).await.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let retry = queue.next_job().await.unwrap().expect("Recovered job should be claimable");
    assert_eq!(retry.id, silent);
    assert_eq!(retry.attempts_made, 2);

    let counts = queue.counts().await.unwrap();
    assert_eq!((counts.waiting, counts.active), (0, 2));
}
