//! End-to-end tests of the WebSocket push channel over a real listener.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::{token, TestApp, ALICE, BOB};
use futures::StreamExt;
use savesync_api::notifications::RealtimeNotifier;
use savesync_core::operation::OperationKind;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the app and run the notifier with a short flush interval.
async fn serve(app: &TestApp) -> (SocketAddr, CancellationToken) {
    let cancel = CancellationToken::new();
    let notifier = RealtimeNotifier::new(
        app.state.coordinator.clone(),
        app.state.ws_manager.clone(),
    )
    .with_flush_interval(Duration::from_millis(20));
    tokio::spawn(notifier.run(app.state.coordinator.events.subscribe(), cancel.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, cancel)
}

async fn connect(addr: SocketAddr, query: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/api/v1/ws?{query}"))
        .await
        .unwrap();
    client
}

/// Next push message matching `pred`, skipping everything else.
async fn next_matching(client: &mut Client, pred: impl Fn(&Value) -> bool) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if pred(&value) {
                        return value;
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for push message")
}

async fn wait_for_connections(app: &TestApp, n: usize) {
    for _ in 0..100 {
        if app.state.ws_manager.connection_count().await >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connections never registered");
}

// ---------------------------------------------------------------------------
// Test: watchers get a snapshot on connect and after presence changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watcher_receives_initial_snapshot_then_updates() {
    let app = common::build_test_app();
    let (addr, cancel) = serve(&app).await;
    let mut client = connect(addr, "watch=workers").await;

    let initial = next_matching(&mut client, |v| v["type"] == "workers_update").await;
    assert!(initial["payload"]["workers"].as_array().unwrap().is_empty());

    app.coordinator().presence.heartbeat("host-a").await.unwrap();

    let update = next_matching(&mut client, |v| {
        v["type"] == "workers_update" && !v["payload"]["workers"].as_array().unwrap().is_empty()
    })
    .await;
    assert_eq!(update["payload"]["workers"][0]["client_id"], "host-a");
    assert_eq!(update["payload"]["workers"][0]["online"], true);

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Test: operation progress goes to the owner only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operation_progress_is_pushed_to_owner_only() {
    let app = common::build_test_app();
    let (addr, cancel) = serve(&app).await;
    let mut alice = connect(addr, &format!("token={}", token(ALICE, "user"))).await;
    let mut bob = connect(addr, &format!("token={}", token(BOB, "user"))).await;
    wait_for_connections(&app, 2).await;

    let coordinator = app.coordinator();
    coordinator.presence.heartbeat("host-a").await.unwrap();
    coordinator.claims.claim("host-a", ALICE).await.unwrap();
    let op = coordinator
        .queue
        .enqueue("host-a", OperationKind::Save, ALICE, json!({}))
        .await
        .unwrap();
    coordinator.operations.start(op.operation_id).await.unwrap();
    coordinator
        .operations
        .report_progress(op.operation_id, 5, 10, "halfway")
        .await
        .unwrap();

    let pushed = next_matching(&mut alice, |v| {
        v["type"] == "operation_progress" && v["payload"]["status"] == "in_progress"
            && !v["payload"]["progress"].is_null()
    })
    .await;
    assert_eq!(pushed["payload"]["operation_id"], op.operation_id.to_string());
    assert_eq!(pushed["payload"]["progress"]["current"], 5);
    assert_eq!(pushed["payload"]["progress"]["total"], 10);

    let leaked = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            match bob.next().await {
                Some(Ok(Message::Text(text))) if text.contains("operation_progress") => return,
                Some(Ok(_)) => {}
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(leaked.is_err(), "another user's session received progress");

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Test: invalid tokens are rejected before the upgrade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = common::build_test_app();
    let (addr, cancel) = serve(&app).await;

    let result = connect_async(format!("ws://{addr}/api/v1/ws?token=not-a-jwt")).await;

    assert!(result.is_err());
    assert_eq!(app.state.ws_manager.connection_count().await, 0);
    cancel.cancel();
}
