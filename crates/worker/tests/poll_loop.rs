//! Drives `Runner::tick` against the real API router served on a local port.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use savesync_api::auth::jwt::JwtConfig;
use savesync_api::config::ServerConfig;
use savesync_api::router::build_app_router;
use savesync_api::state::AppState;
use savesync_api::ws::WsManager;
use savesync_core::operation::{OperationKind, OperationStatus};
use savesync_core::types::{OperationId, UserId};
use savesync_dispatch::{Coordinator, DispatchConfig};
use savesync_worker::client::DispatchClient;
use savesync_worker::progress::ProgressHandle;
use savesync_worker::runner::{Runner, TickReport};
use savesync_worker::transport::{
    LocalTransport, SavePayload, Transport, TransportResult, BACKUP_DIR,
};
use serde_json::json;
use tempfile::TempDir;

const ALICE: UserId = 1;
const CLIENT: &str = "desk-01";

fn config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec![],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        jwt: JwtConfig {
            secret: "worker-test-secret".to_string(),
        },
        dispatch: DispatchConfig::default(),
    }
}

/// Serve the API over a fresh in-memory coordinator, with `CLIENT` online
/// and claimed by Alice.
async fn serve() -> (String, Arc<Coordinator>) {
    let config = config();
    let coordinator = Arc::new(Coordinator::in_memory_system(config.dispatch.clone()));
    coordinator.presence.heartbeat(CLIENT).await.unwrap();
    coordinator.claims.claim(CLIENT, ALICE).await.unwrap();

    let state = AppState {
        config: Arc::new(config.clone()),
        coordinator: Arc::clone(&coordinator),
        ws_manager: Arc::new(WsManager::new()),
    };
    let router = build_app_router(state, &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), coordinator)
}

fn runner(base_url: &str, transport: Arc<dyn Transport>) -> Runner {
    Runner::new(
        DispatchClient::new(base_url, CLIENT),
        transport,
        Duration::from_secs(60),
        Duration::from_millis(10),
    )
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

async fn status_of(coordinator: &Coordinator, id: OperationId) -> OperationStatus {
    coordinator.operations.get(id).await.unwrap().status
}

// ---------------------------------------------------------------------------
// Test: a save is executed, reported, and completed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_copies_files_and_completes() {
    let (url, coordinator) = serve().await;
    let saves = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write(&saves.path().join("slot1.sav"), "alpha");
    write(&saves.path().join("profiles/main.cfg"), "beta");

    let op = coordinator
        .queue
        .enqueue(
            CLIENT,
            OperationKind::Save,
            ALICE,
            json!({ "save_path": saves.path(), "storage_key": "game-1" }),
        )
        .await
        .unwrap();

    let mut runner = runner(&url, Arc::new(LocalTransport::new(storage.path())));
    let report = runner.tick().await.unwrap();

    assert_eq!(
        report,
        TickReport {
            heartbeat_sent: true,
            polled: 1,
            completed: 1,
            failed: 0,
            skipped: 0,
        }
    );
    assert_eq!(
        status_of(&coordinator, op.operation_id).await,
        OperationStatus::Completed
    );

    let stored = storage.path().join("game-1");
    assert_eq!(std::fs::read_to_string(stored.join("slot1.sav")).unwrap(), "alpha");
    assert_eq!(
        std::fs::read_to_string(stored.join("profiles/main.cfg")).unwrap(),
        "beta"
    );
    assert!(!storage.path().join("game-1.partial").exists());
}

// ---------------------------------------------------------------------------
// Test: load restores a stored copy over the local save
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_restores_the_stored_copy() {
    let (url, coordinator) = serve().await;
    let saves = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write(&storage.path().join("game-1/slot1.sav"), "stored");
    write(&saves.path().join("local/slot1.sav"), "stale");
    write(&saves.path().join("local/leftover.tmp"), "junk");

    let op = coordinator
        .queue
        .enqueue(
            CLIENT,
            OperationKind::Load,
            ALICE,
            json!({ "save_path": saves.path().join("local"), "storage_key": "game-1" }),
        )
        .await
        .unwrap();

    let mut runner = runner(&url, Arc::new(LocalTransport::new(storage.path())));
    runner.tick().await.unwrap();

    assert_eq!(
        status_of(&coordinator, op.operation_id).await,
        OperationStatus::Completed
    );
    let local = saves.path().join("local");
    assert_eq!(std::fs::read_to_string(local.join("slot1.sav")).unwrap(), "stored");
    assert!(!local.join("leftover.tmp").exists());
}

// ---------------------------------------------------------------------------
// Test: failures are reported with the transport's message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_kind_and_bad_payload_fail() {
    let (url, coordinator) = serve().await;
    let storage = TempDir::new().unwrap();

    let unsupported = coordinator
        .queue
        .enqueue(CLIENT, OperationKind::UserDelete, ALICE, json!({}))
        .await
        .unwrap();
    let missing_key = coordinator
        .queue
        .enqueue(CLIENT, OperationKind::Delete, ALICE, json!({}))
        .await
        .unwrap();
    let absent = coordinator
        .queue
        .enqueue(
            CLIENT,
            OperationKind::DeleteOneSave,
            ALICE,
            json!({ "storage_key": "never-saved" }),
        )
        .await
        .unwrap();

    let mut runner = runner(&url, Arc::new(LocalTransport::new(storage.path())));
    let report = runner.tick().await.unwrap();
    assert_eq!(report.failed, 3);

    let op = coordinator.operations.get(unsupported.operation_id).await.unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error.as_deref(), Some("unsupported operation kind: user_delete"));

    let op = coordinator.operations.get(missing_key.operation_id).await.unwrap();
    assert_matches!(op.error.as_deref(), Some(e) if e.contains("storage_key is required"));

    let op = coordinator.operations.get(absent.operation_id).await.unwrap();
    assert_matches!(op.error.as_deref(), Some(e) if e.starts_with("not found"));
}

// ---------------------------------------------------------------------------
// Test: backup_all then delete_all keeps the backups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backup_all_then_delete_all_keeps_backups() {
    let (url, coordinator) = serve().await;
    let storage = TempDir::new().unwrap();
    write(&storage.path().join("game-1/slot1.sav"), "one");
    write(&storage.path().join("game-2/slot1.sav"), "two");

    let backup = coordinator
        .queue
        .enqueue(CLIENT, OperationKind::BackupAll, ALICE, serde_json::Value::Null)
        .await
        .unwrap();
    let wipe = coordinator
        .queue
        .enqueue(CLIENT, OperationKind::DeleteAll, ALICE, serde_json::Value::Null)
        .await
        .unwrap();

    let mut runner = runner(&url, Arc::new(LocalTransport::new(storage.path())));
    let report = runner.tick().await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(
        status_of(&coordinator, backup.operation_id).await,
        OperationStatus::Completed
    );
    assert_eq!(
        status_of(&coordinator, wipe.operation_id).await,
        OperationStatus::Completed
    );

    let remaining: Vec<_> = std::fs::read_dir(storage.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(remaining, vec![std::ffi::OsString::from(BACKUP_DIR)]);

    let snapshots: Vec<_> = std::fs::read_dir(storage.path().join(BACKUP_DIR))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        std::fs::read_to_string(snapshots[0].join("game-2/slot1.sav")).unwrap(),
        "two"
    );
}

// ---------------------------------------------------------------------------
// Test: an operation started elsewhere between poll and start is skipped
// ---------------------------------------------------------------------------

/// Starts `other` server-side while executing, as a second worker
/// instance racing on the same queue would.
struct RacingTransport {
    coordinator: Arc<Coordinator>,
    other: OperationId,
}

#[async_trait]
impl Transport for RacingTransport {
    async fn save(&self, _: &SavePayload, progress: &ProgressHandle) -> TransportResult<()> {
        let started = self.coordinator.operations.start(self.other).await.unwrap();
        assert!(started.applied());
        progress.report(1, 1, "done");
        Ok(())
    }

    async fn load(&self, _: &SavePayload, _: &ProgressHandle) -> TransportResult<()> {
        Ok(())
    }

    async fn delete(&self, _: &SavePayload, _: &ProgressHandle) -> TransportResult<()> {
        Ok(())
    }

    async fn backup_all(&self, _: &ProgressHandle) -> TransportResult<()> {
        Ok(())
    }

    async fn delete_all(&self, _: &ProgressHandle) -> TransportResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn raced_operation_is_skipped() {
    let (url, coordinator) = serve().await;

    let first = coordinator
        .queue
        .enqueue(CLIENT, OperationKind::Save, ALICE, json!({}))
        .await
        .unwrap();
    let second = coordinator
        .queue
        .enqueue(CLIENT, OperationKind::Load, ALICE, json!({}))
        .await
        .unwrap();

    let transport = Arc::new(RacingTransport {
        coordinator: Arc::clone(&coordinator),
        other: second.operation_id,
    });
    let mut runner = runner(&url, transport);
    let report = runner.tick().await.unwrap();

    assert_eq!(report.polled, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        status_of(&coordinator, first.operation_id).await,
        OperationStatus::Completed
    );
    // Left for whoever started it.
    assert_eq!(
        status_of(&coordinator, second.operation_id).await,
        OperationStatus::InProgress
    );
}

// ---------------------------------------------------------------------------
// Test: heartbeats are rate-limited across ticks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_is_sent_once_per_interval() {
    let (url, _coordinator) = serve().await;
    let storage = TempDir::new().unwrap();
    let mut runner = runner(&url, Arc::new(LocalTransport::new(storage.path())));

    assert!(runner.tick().await.unwrap().heartbeat_sent);
    let second = runner.tick().await.unwrap();
    assert!(!second.heartbeat_sent);
    assert_eq!(second.polled, 0);
}
