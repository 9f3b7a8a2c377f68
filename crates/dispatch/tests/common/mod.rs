#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use savesync_core::clock::ManualClock;
use savesync_core::operation::OperationKind;
use savesync_core::types::{OperationId, Timestamp, UserId};
use savesync_dispatch::{Coordinator, DispatchConfig};

pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Coordinator over a memory store with a manual clock at [`t0`].
pub fn setup() -> (Coordinator, Arc<ManualClock>) {
    setup_with(DispatchConfig::default())
}

pub fn setup_with(config: DispatchConfig) -> (Coordinator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let coordinator = Coordinator::in_memory(config, clock.clone());
    (coordinator, clock)
}

pub fn secs(n: i64) -> Duration {
    Duration::seconds(n)
}

/// Register `client_id` and bind it to `user`.
pub async fn claimed_worker(coordinator: &Coordinator, client_id: &str, user: UserId) {
    coordinator.presence.heartbeat(client_id).await.unwrap();
    coordinator.claims.claim(client_id, user).await.unwrap();
}

/// Enqueue a single save operation and return its id.
pub async fn enqueue_save(coordinator: &Coordinator, client_id: &str, user: UserId) -> OperationId {
    coordinator
        .queue
        .enqueue(client_id, OperationKind::Save, user, serde_json::json!({}))
        .await
        .unwrap()
        .operation_id
}
