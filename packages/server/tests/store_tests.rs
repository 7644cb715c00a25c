//! Store integration tests: claims, conditional updates, queries.

mod common;

use chrono::{Duration, Utc};
use common::TestHarness;
use server_core::queue::TaskStatus;

#[tokio::test]
async fn test_claim_advances_retry_count_and_due() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;
    assert_eq!(task.retry_count, 0);
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.due > Utc::now());

    let before_claim = Utc::now();
    let claimed = harness
        .store
        .claim(task.id, 0)
        .await
        .expect("claim")
        .expect("snapshot");

    assert_eq!(claimed.retry_count, 1);
    assert_eq!(claimed.status, TaskStatus::Pending);
    assert!(claimed.due > before_claim);
    assert!(claimed.version > task.version);
}

#[tokio::test]
async fn test_claim_is_idempotent_per_attempt() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;

    let first = harness.store.claim(task.id, 0).await.expect("claim");
    let second = harness.store.claim(task.id, 0).await.expect("claim");

    assert!(first.is_some());
    assert!(second.is_none());

    // The next attempt is claimable exactly once as well.
    assert!(harness.store.claim(task.id, 1).await.expect("claim").is_some());
    assert!(harness.store.claim(task.id, 1).await.expect("claim").is_none());
}

#[tokio::test]
async fn test_claim_unknown_id_returns_none() {
    let harness = TestHarness::new().await.expect("harness");
    assert!(harness
        .store
        .claim(i64::MAX - 7, 0)
        .await
        .expect("claim")
        .is_none());
}

#[tokio::test]
async fn test_complete_is_guarded_by_retry_count() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;
    let claimed = harness
        .store
        .claim(task.id, 0)
        .await
        .expect("claim")
        .expect("snapshot");

    assert!(harness.store.complete(&claimed).await.expect("complete"));
    let reloaded = harness.reload_task(task.id).await;
    assert_eq!(reloaded.status, TaskStatus::Completed);
    assert_eq!(reloaded.retry_count, 1);

    // Terminal transitions do not re-apply.
    assert!(!harness.store.complete(&claimed).await.expect("complete"));
    assert!(!harness.store.fail(&claimed).await.expect("fail"));
}

#[tokio::test]
async fn test_reschedule_keeps_task_pending_with_future_due() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;
    let claimed = harness
        .store
        .claim(task.id, 0)
        .await
        .expect("claim")
        .expect("snapshot");

    let before = Utc::now();
    assert!(harness.store.reschedule(&claimed).await.expect("reschedule"));

    let reloaded = harness.reload_task(task.id).await;
    assert_eq!(reloaded.status, TaskStatus::Pending);
    assert_eq!(reloaded.retry_count, 1);
    assert!(reloaded.due > before);
    // Rescheduling recomputes due with timeout 0, accelerating the retry
    // relative to the post-claim window (timeout 20 + backoff).
    assert!(reloaded.due < claimed.due);
}

#[tokio::test]
async fn test_outcome_update_loses_race_to_next_claim() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;
    let claimed = harness
        .store
        .claim(task.id, 0)
        .await
        .expect("claim")
        .expect("snapshot");

    // Another worker claims the next attempt before this one reports.
    harness
        .store
        .claim(task.id, 1)
        .await
        .expect("claim")
        .expect("snapshot");

    assert!(!harness.store.complete(&claimed).await.expect("complete"));
    let reloaded = harness.reload_task(task.id).await;
    assert_eq!(reloaded.status, TaskStatus::Pending);
    assert_eq!(reloaded.retry_count, 2);
}

#[tokio::test]
async fn test_retry_exhaustion_fails_on_claim() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;

    // Walk the retry count up to the limit; the task stays pending.
    for retry_count in 0..=35 {
        harness
            .store
            .claim(task.id, retry_count)
            .await
            .expect("claim")
            .expect("snapshot");
    }
    let at_limit = harness.reload_task(task.id).await;
    assert_eq!(at_limit.retry_count, 36);
    assert_eq!(at_limit.status, TaskStatus::Pending);

    // The claim past the limit flips the status hook to failed.
    let exhausted = harness
        .store
        .claim(task.id, 36)
        .await
        .expect("claim")
        .expect("snapshot");
    assert_eq!(exhausted.retry_count, 37);
    assert_eq!(exhausted.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_get_due_tasks_returns_overdue_pending_only() {
    let harness = TestHarness::new().await.expect("harness");
    let overdue = harness.create_task("http://example.com/hook").await;
    let upcoming = harness.create_task("http://example.com/hook").await;
    let completed = harness.create_task("http://example.com/hook").await;

    harness
        .set_due(overdue.id, Utc::now() - Duration::seconds(60))
        .await;
    harness
        .set_due(completed.id, Utc::now() - Duration::seconds(60))
        .await;
    let claimed = harness
        .store
        .claim(completed.id, 0)
        .await
        .expect("claim")
        .expect("snapshot");
    harness.store.complete(&claimed).await.expect("complete");

    let due = harness.store.get_due_tasks(1000, 0).await.expect("query");
    let ids: Vec<i64> = due.iter().map(|t| t.id).collect();
    assert!(ids.contains(&overdue.id));
    assert!(!ids.contains(&upcoming.id));
    assert!(!ids.contains(&completed.id));
}

#[tokio::test]
async fn test_delete_tasks_older_than() {
    let harness = TestHarness::new().await.expect("harness");
    let old = harness.create_task("http://example.com/hook").await;
    let fresh = harness.create_task("http://example.com/hook").await;

    harness
        .set_modified(old.id, Utc::now() - Duration::days(30))
        .await;

    let deleted = harness
        .store
        .delete_tasks_older_than(Duration::days(7))
        .await
        .expect("delete");
    assert!(deleted >= 1);

    assert!(harness
        .store
        .lookup_task(old.id)
        .await
        .expect("lookup")
        .is_none());
    assert!(harness
        .store
        .lookup_task(fresh.id)
        .await
        .expect("lookup")
        .is_some());
}

#[tokio::test]
async fn test_application_key_lookup() {
    let harness = TestHarness::new().await.expect("harness");
    let (app, key) = harness.create_application("example").await;
    assert_eq!(key.value.len(), 40);

    let found = harness
        .store
        .lookup_application_by_key(&key.value)
        .await
        .expect("lookup")
        .expect("application");
    assert_eq!(found.id, app.id);

    let values = harness
        .store
        .lookup_active_key_values(app.id)
        .await
        .expect("values");
    assert_eq!(values, vec![key.value.clone()]);

    // A deactivated key no longer authenticates or appears in the ACL.
    harness.deactivate_key(key.id).await;
    assert!(harness
        .store
        .lookup_application_by_key(&key.value)
        .await
        .expect("lookup")
        .is_none());
    assert!(harness
        .store
        .lookup_active_key_values(app.id)
        .await
        .expect("values")
        .is_empty());
}

#[tokio::test]
async fn test_claim_due_matches_policy() {
    let harness = TestHarness::new().await.expect("harness");
    let task = harness.create_task("http://example.com/hook").await;

    let lower = harness.store.due_policy().due(task.timeout, 1);
    let claimed = harness
        .store
        .claim(task.id, 0)
        .await
        .expect("claim")
        .expect("snapshot");
    let upper = harness.store.due_policy().due(task.timeout, 1);

    // The claim recomputes due exactly as the policy would at claim time.
    assert!(claimed.due >= lower - Duration::seconds(1));
    assert!(claimed.due <= upper + Duration::seconds(1));
}
