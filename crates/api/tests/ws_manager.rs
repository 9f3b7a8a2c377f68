//! Unit tests for `WsManager` routing. No HTTP upgrade is performed.

use axum::extract::ws::Message;
use savesync_api::ws::manager::Subscription;
use savesync_api::ws::WsManager;

fn user(user_id: i64) -> Subscription {
    Subscription {
        user_id: Some(user_id),
        watch_workers: false,
    }
}

fn watcher() -> Subscription {
    Subscription {
        user_id: None,
        watch_workers: true,
    }
}

fn text(s: &str) -> Message {
    Message::Text(s.to_string().into())
}

// ---------------------------------------------------------------------------
// Test: add / remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);

    let _rx1 = manager.add("conn-1".into(), user(1)).await;
    let _rx2 = manager.add("conn-2".into(), watcher()).await;
    assert_eq!(manager.connection_count().await, 2);
    assert_eq!(manager.watcher_count().await, 1);

    manager.remove("conn-1").await;
    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: per-user delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_user_reaches_only_that_users_connections() {
    let manager = WsManager::new();
    let mut tab_a = manager.add("a".into(), user(1)).await;
    let mut tab_b = manager.add("b".into(), user(1)).await;
    let mut other = manager.add("c".into(), user(2)).await;
    let mut anonymous = manager.add("d".into(), watcher()).await;

    let sent = manager.send_to_user(1, text("progress")).await;

    assert_eq!(sent, 2);
    assert!(tab_a.try_recv().is_ok());
    assert!(tab_b.try_recv().is_ok());
    assert!(other.try_recv().is_err());
    assert!(anonymous.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: watcher broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_to_watchers_skips_non_watchers() {
    let manager = WsManager::new();
    let mut watching = manager.add("w".into(), watcher()).await;
    let mut watching_user = manager
        .add(
            "wu".into(),
            Subscription {
                user_id: Some(5),
                watch_workers: true,
            },
        )
        .await;
    let mut not_watching = manager.add("u".into(), user(5)).await;

    let sent = manager.broadcast_to_watchers(text("workers")).await;

    assert_eq!(sent, 2);
    assert!(watching.try_recv().is_ok());
    assert!(watching_user.try_recv().is_ok());
    assert!(not_watching.try_recv().is_err());
}

#[tokio::test]
async fn send_to_reports_missing_connection() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".into(), watcher()).await;

    assert!(manager.send_to("conn-1", text("hello")).await);
    assert!(!manager.send_to("conn-2", text("hello")).await);
    assert!(rx.try_recv().is_ok());
}

// ---------------------------------------------------------------------------
// Test: ping and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_sends_ping_frames() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".into(), Subscription::default()).await;

    manager.ping_all().await;

    assert!(matches!(rx.try_recv(), Ok(Message::Ping(_))));
}

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();
    let mut rx1 = manager.add("conn-1".into(), user(1)).await;
    let mut rx2 = manager.add("conn-2".into(), watcher()).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx1.try_recv(), Ok(Message::Close(None))));
    assert!(matches!(rx2.try_recv(), Ok(Message::Close(None))));
}

#[tokio::test]
async fn send_to_dropped_receiver_does_not_panic() {
    let manager = WsManager::new();
    let rx = manager.add("conn-1".into(), user(1)).await;
    drop(rx);

    assert_eq!(manager.send_to_user(1, text("late")).await, 1);
    assert_eq!(manager.broadcast_to_watchers(text("late")).await, 0);
}
