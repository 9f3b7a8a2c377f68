mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use savesync_core::operation::{OperationKind, OperationStatus, TIMEOUT_ERROR};
use savesync_dispatch::{DispatchError, Transition};
use savesync_events::DispatchEvent;

use common::{claimed_worker, enqueue_save, secs, setup};

// ---- Test: enqueue routing ----

#[tokio::test]
async fn enqueue_requires_claim_by_owner() {
    let (c, _clock) = setup();
    c.presence.heartbeat("w1").await.unwrap();

    assert_matches!(
        c.queue
            .enqueue("w1", OperationKind::Save, 5, serde_json::json!({}))
            .await,
        Err(DispatchError::WorkerNotClaimedByOwner(_))
    );

    c.claims.claim("w1", 6).await.unwrap();
    assert_matches!(
        c.queue
            .enqueue("w1", OperationKind::Save, 5, serde_json::json!({}))
            .await,
        Err(DispatchError::WorkerNotClaimedByOwner(_))
    );
    assert_matches!(
        c.queue
            .enqueue("ghost", OperationKind::Save, 5, serde_json::json!({}))
            .await,
        Err(DispatchError::WorkerNotFound(_))
    );
    assert!(c.queue.poll("w1").await.unwrap().is_empty());
}

#[tokio::test]
async fn poll_is_fifo_and_non_destructive() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let first = enqueue_save(&c, "w1", 5).await;
    let second = enqueue_save(&c, "w1", 5).await;

    for _ in 0..2 {
        let ids: Vec<_> = c
            .queue
            .poll("w1")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.operation_id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    c.operations.start(first).await.unwrap();
    let remaining = c.queue.poll("w1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].operation_id, second);
}

#[tokio::test]
async fn batch_enqueue_shares_batch_id() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;

    let enqueued = c
        .queue
        .enqueue_batch(
            "w1",
            OperationKind::Save,
            5,
            vec![
                serde_json::json!({"save_path": "/p1"}),
                serde_json::json!({"save_path": "/p2"}),
            ],
        )
        .await
        .unwrap();

    let batch_id = enqueued.batch_id.unwrap();
    assert_eq!(enqueued.operations.len(), 2);
    assert!(enqueued
        .operations
        .iter()
        .all(|o| o.batch_id == Some(batch_id) && o.status == OperationStatus::Pending));
}

#[tokio::test]
async fn invalid_batch_creates_nothing() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;

    let result = c
        .queue
        .enqueue_batch(
            "w1",
            OperationKind::Save,
            5,
            vec![serde_json::json!({"save_path": "/p1"}), serde_json::json!(42)],
        )
        .await;
    assert_matches!(result, Err(DispatchError::Core(_)));
    assert!(c.queue.poll("w1").await.unwrap().is_empty());

    let empty = c
        .queue
        .enqueue_batch("w1", OperationKind::Save, 5, Vec::new())
        .await;
    assert_matches!(empty, Err(DispatchError::Core(_)));
}

// ---- Test: lifecycle ----

#[tokio::test]
async fn full_lifecycle_publishes_updates() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;
    let mut rx = c.events.subscribe();

    assert!(c.operations.start(id).await.unwrap().applied());
    let op = c.operations.report_progress(id, 3, 10, "copying").await.unwrap();
    assert_eq!(op.progress.as_ref().map(|p| p.current), Some(3));
    let done = c.operations.complete(id).await.unwrap();
    assert!(done.applied());
    assert_eq!(done.operation().status, OperationStatus::Completed);
    assert!(done.operation().completed_at.is_some());

    let mut statuses = Vec::new();
    for _ in 0..3 {
        match rx.recv().await.unwrap() {
            DispatchEvent::OperationUpdated(update) => {
                assert_eq!(update.owner_user, 5);
                statuses.push(update.status);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(
        statuses,
        vec![
            OperationStatus::InProgress,
            OperationStatus::InProgress,
            OperationStatus::Completed
        ]
    );
}

#[tokio::test]
async fn duplicate_start_is_ignored() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;

    assert_matches!(c.operations.start(id).await.unwrap(), Transition::Applied(_));
    assert_matches!(
        c.operations.start(id).await.unwrap(),
        Transition::Ignored(op) if op.status == OperationStatus::InProgress
    );
}

#[tokio::test]
async fn complete_twice_is_idempotent() {
    let (c, clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;
    c.operations.start(id).await.unwrap();

    let first = c.operations.complete(id).await.unwrap().into_operation();
    clock.advance(secs(3));
    let second = c.operations.complete(id).await.unwrap();
    assert!(!second.applied());
    assert_eq!(second.into_operation(), first);
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;

    assert_matches!(
        c.operations.complete(id).await,
        Err(DispatchError::InvalidTransition { status: OperationStatus::Pending, .. })
    );
    assert_matches!(
        c.operations.report_progress(id, 1, 2, "").await,
        Err(DispatchError::InvalidTransition { .. })
    );

    c.operations.start(id).await.unwrap();
    c.operations.complete(id).await.unwrap();
    assert_matches!(
        c.operations.fail(id, "late failure").await,
        Err(DispatchError::InvalidTransition { status: OperationStatus::Completed, .. })
    );
    assert_matches!(
        c.operations.start(uuid::Uuid::now_v7()).await,
        Err(DispatchError::OperationNotFound(_))
    );
}

#[tokio::test]
async fn pending_operation_can_fail_and_fail_is_idempotent() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;

    let failed = c.operations.fail(id, "permission denied").await.unwrap();
    assert!(failed.applied());
    assert_eq!(failed.operation().error.as_deref(), Some("permission denied"));

    let again = c.operations.fail(id, "something else").await.unwrap();
    assert!(!again.applied());
    assert_eq!(again.operation().error.as_deref(), Some("permission denied"));

    assert_matches!(
        c.operations.fail(id, "   ").await,
        Err(DispatchError::Core(_))
    );
}

#[tokio::test]
async fn status_never_returns_to_pending() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;
    c.operations.start(id).await.unwrap();

    // Every further request leaves the operation out of `pending`.
    let _ = c.operations.start(id).await;
    let _ = c.operations.report_progress(id, 9, 3, "out of order").await;
    let _ = c.operations.fail(id, "disk full").await;
    let _ = c.operations.start(id).await;
    let _ = c.operations.complete(id).await;

    let op = c.operations.get(id).await.unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert!(c.queue.poll("w1").await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_starts_apply_once() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let operations = c.operations.clone();
        handles.push(tokio::spawn(async move { operations.start(id).await }));
    }
    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().applied() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn reporter_must_be_target_worker() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;

    assert!(c.operations.authorize_reporter(id, "w1").await.is_ok());
    assert_matches!(
        c.operations.authorize_reporter(id, "w2").await,
        Err(DispatchError::Core(_))
    );
}

// ---- Test: timeout sweep ----

#[tokio::test]
async fn timeout_fires_after_exactly_one_sweep_past_max_age() {
    let (c, clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;
    c.operations.start(id).await.unwrap();
    let max_age = Duration::from_secs(600);

    clock.advance(secs(600));
    assert!(c.operations.sweep_timeouts(max_age).await.unwrap().is_empty());
    assert_eq!(
        c.operations.get(id).await.unwrap().status,
        OperationStatus::InProgress
    );

    clock.advance(secs(1));
    let timed_out = c.operations.sweep_timeouts(max_age).await.unwrap();
    assert_eq!(timed_out.len(), 1);
    let op = c.operations.get(id).await.unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error.as_deref(), Some(TIMEOUT_ERROR));
}

#[tokio::test]
async fn progress_resets_the_timeout_clock() {
    let (c, clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let id = enqueue_save(&c, "w1", 5).await;
    c.operations.start(id).await.unwrap();
    let max_age = Duration::from_secs(600);

    clock.advance(secs(500));
    c.operations.report_progress(id, 1, 10, "").await.unwrap();
    clock.advance(secs(500));
    assert!(c.operations.sweep_timeouts(max_age).await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_fails_stuck_pending_and_skips_terminal() {
    let (c, clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let pending = enqueue_save(&c, "w1", 5).await;
    let done = enqueue_save(&c, "w1", 5).await;
    c.operations.start(done).await.unwrap();
    c.operations.complete(done).await.unwrap();

    clock.advance(secs(601));
    let timed_out = c
        .operations
        .sweep_timeouts(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].operation_id, pending);
    assert_eq!(
        c.operations.get(done).await.unwrap().status,
        OperationStatus::Completed
    );
}

// ---- Test: cleanup and listing ----

#[tokio::test]
async fn cleanup_removes_only_old_terminal_operations() {
    let (c, clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let finished = enqueue_save(&c, "w1", 5).await;
    let waiting = enqueue_save(&c, "w1", 5).await;
    c.operations.fail(finished, "boom").await.unwrap();

    clock.advance(secs(86_401));
    let deleted = c
        .operations
        .cleanup_finished(Duration::from_secs(86_400))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_matches!(
        c.operations.get(finished).await,
        Err(DispatchError::OperationNotFound(_))
    );
    assert!(c.operations.get(waiting).await.is_ok());
}

#[tokio::test]
async fn list_recent_is_newest_first() {
    let (c, _clock) = setup();
    claimed_worker(&c, "w1", 5).await;
    let a = enqueue_save(&c, "w1", 5).await;
    let b = enqueue_save(&c, "w1", 5).await;

    let listed = c.queue.list_recent(5, None).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|o| o.operation_id).collect();
    assert_eq!(ids, vec![b, a]);
    assert_eq!(c.queue.list_recent(5, Some(0)).await.unwrap().len(), 1);
}
