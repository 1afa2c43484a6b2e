use anyhow::Result;
use delivery_service::models::{
    message::Channel,
    outcome::DeliveryStatus,
    policy::{ChannelPolicy, CommitPolicy},
};
use tokio::time::{Duration, sleep, timeout};

use crate::fakes::{
    MemoryPublisher, MemoryQueue, MemoryStore, instant_policy, notification, spawn_worker,
    wait_until,
};

/// Test: A valid message produces exactly one stored outcome, one completion
/// event, and one commit
#[tokio::test]
async fn test_valid_message_is_processed_and_committed() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();

    handle.send_notification(&notification("n1", Channel::Email))?;

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    wait_until(|| handle.committed() == 1).await?;
    cancel.cancel();
    worker.await?;

    let outcomes = store.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].notification_id, "n1");
    assert_eq!(outcomes[0].status, DeliveryStatus::Sent);
    assert!(outcomes[0].error_message.is_none());

    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].notification_id, "n1");

    Ok(())
}

/// Test: A malformed payload produces no outcome, is committed past, and does
/// not block later valid messages
#[tokio::test]
async fn test_malformed_message_is_skipped_and_committed() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();

    handle.send_raw(b"not a notification".to_vec())?;
    handle.send_notification(&notification("n2", Channel::Email))?;

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    wait_until(|| handle.committed() == 2).await?;
    cancel.cancel();
    worker.await?;

    let outcomes = store.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].notification_id, "n2");
    assert_eq!(publisher.events().len(), 1);

    Ok(())
}

/// Test: A structurally valid payload with an empty recipient is treated as
/// malformed
#[tokio::test]
async fn test_empty_recipient_is_treated_as_malformed() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();

    let mut invalid = notification("n1", Channel::Push);
    invalid.recipient = String::new();
    handle.send_notification(&invalid)?;

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    wait_until(|| handle.committed() == 1).await?;
    cancel.cancel();
    worker.await?;

    assert!(store.outcomes().is_empty());
    assert!(publisher.events().is_empty());

    Ok(())
}

/// Test: Under the default policy a store failure does not block publication
/// or commit
#[tokio::test]
async fn test_store_failure_does_not_block_publish_or_commit() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();
    store.fail_times(1);

    handle.send_notification(&notification("n1", Channel::Email))?;

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    wait_until(|| handle.committed() == 1).await?;
    cancel.cancel();
    worker.await?;

    assert_eq!(store.attempts(), 1);
    assert!(store.outcomes().is_empty());
    assert_eq!(publisher.events().len(), 1);

    Ok(())
}

/// Test: Under the default policy a publish failure does not block commit
#[tokio::test]
async fn test_publish_failure_does_not_block_commit() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();
    publisher.fail_times(1);

    handle.send_notification(&notification("n1", Channel::Email))?;

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    wait_until(|| handle.committed() == 1).await?;
    cancel.cancel();
    worker.await?;

    assert_eq!(store.outcomes().len(), 1);
    assert_eq!(publisher.attempts(), 1);
    assert!(publisher.events().is_empty());

    Ok(())
}

/// Test: With commit-after-sinks a transient sink failure requeues the
/// message, and the redelivery produces a second outcome with the same
/// notification id
#[tokio::test]
async fn test_after_sinks_redelivery_produces_duplicate_outcomes() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();
    publisher.fail_times(1);

    handle.send_notification(&notification("n1", Channel::Email))?;

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::AfterSinks,
    );

    wait_until(|| handle.committed() == 1).await?;
    cancel.cancel();
    worker.await?;

    assert_eq!(handle.requeues(), 1);

    // Both attempts persisted independently; no deduplication anywhere.
    let outcomes = store.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].notification_id, "n1");
    assert_eq!(outcomes[1].notification_id, "n1");
    assert_ne!(outcomes[0].id, outcomes[1].id);

    assert_eq!(publisher.events().len(), 1);

    Ok(())
}

/// Test: Shutdown during processing lets the in-flight message finish its
/// full persist/publish/commit cycle
#[tokio::test]
async fn test_shutdown_waits_for_in_flight_message() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();

    handle.send_notification(&notification("n1", Channel::Email))?;

    let slow_policy = ChannelPolicy {
        min_latency_ms: 200,
        max_latency_ms: 200,
        failure_rate: 0.0,
        failure_message: String::new(),
    };

    let (cancel, worker) = spawn_worker(
        queue,
        slow_policy,
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    // Give the worker time to fetch and enter the simulated delivery, then
    // signal shutdown mid-processing.
    sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    timeout(Duration::from_secs(2), worker).await??;

    assert_eq!(handle.committed(), 1);
    assert_eq!(store.outcomes().len(), 1);
    assert_eq!(publisher.events().len(), 1);

    Ok(())
}

/// Test: Messages on one channel are processed strictly in fetch order
#[tokio::test]
async fn test_messages_processed_in_fetch_order() -> Result<()> {
    let (queue, handle) = MemoryQueue::new();
    let store = MemoryStore::new();
    let publisher = MemoryPublisher::new();

    for id in ["n1", "n2", "n3"] {
        handle.send_notification(&notification(id, Channel::Sms))?;
    }

    let (cancel, worker) = spawn_worker(
        queue,
        instant_policy(0.0, ""),
        store.clone(),
        publisher.clone(),
        CommitPolicy::Always,
    );

    wait_until(|| handle.committed() == 3).await?;
    cancel.cancel();
    worker.await?;

    let ids: Vec<String> = store
        .outcomes()
        .into_iter()
        .map(|outcome| outcome.notification_id)
        .collect();
    assert_eq!(ids, vec!["n1", "n2", "n3"]);

    Ok(())
}
