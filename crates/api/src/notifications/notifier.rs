use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use savesync_core::messages::{MSG_TYPE_OPERATION_PROGRESS, MSG_TYPE_WORKERS_UPDATE};
use savesync_dispatch::{Coordinator, DispatchResult};
use savesync_events::{DispatchEvent, OperationUpdate};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ws::WsManager;

/// Presence events arriving within one interval collapse into a single
/// `workers_update`.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Pushes worker-list snapshots to watching sessions and operation updates
/// to the operation's owner.
pub struct RealtimeNotifier {
    coordinator: Arc<Coordinator>,
    ws_manager: Arc<WsManager>,
    flush_interval: Duration,
}

impl RealtimeNotifier {
    pub fn new(coordinator: Arc<Coordinator>, ws_manager: Arc<WsManager>) -> Self {
        Self {
            coordinator,
            ws_manager,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Run until `cancel` fires or the event bus closes.
    ///
    /// A lagged receiver has lost events it cannot replay, so it schedules
    /// a worker-list flush; lost operation updates are recovered by the
    /// owner's polling.
    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<DispatchEvent>,
        cancel: CancellationToken,
    ) {
        let mut flush = tokio::time::interval(self.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers_dirty = false;

        tracing::info!(
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Realtime notifier started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Realtime notifier stopping");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(DispatchEvent::PresenceChanged { .. }) => workers_dirty = true,
                    Ok(DispatchEvent::OperationUpdated(update)) => {
                        self.push_operation(&update).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Realtime notifier lagged");
                        workers_dirty = true;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, realtime notifier shutting down");
                        break;
                    }
                },
                _ = flush.tick(), if workers_dirty => {
                    workers_dirty = false;
                    self.flush_workers().await;
                }
            }
        }
    }

    async fn push_operation(&self, update: &OperationUpdate) {
        let sent = self
            .ws_manager
            .send_to_user(update.owner_user, operation_progress_message(update))
            .await;
        tracing::trace!(
            operation_id = %update.operation_id,
            user_id = update.owner_user,
            sent,
            "Pushed operation progress"
        );
    }

    async fn flush_workers(&self) {
        if self.ws_manager.watcher_count().await == 0 {
            return;
        }
        match workers_update_message(&self.coordinator).await {
            Ok(msg) => {
                let sent = self.ws_manager.broadcast_to_watchers(msg).await;
                tracing::debug!(sent, "Pushed worker list");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to build worker list update");
            }
        }
    }
}

/// `{type: "workers_update", payload: {workers}}` with the current list.
pub async fn workers_update_message(coordinator: &Coordinator) -> DispatchResult<Message> {
    let workers = coordinator.presence.list().await?;
    Ok(push_message(
        MSG_TYPE_WORKERS_UPDATE,
        json!({ "workers": workers }),
    ))
}

/// `{type: "operation_progress", payload: {operation_id, batch_id, status, progress, error}}`.
pub fn operation_progress_message(update: &OperationUpdate) -> Message {
    push_message(
        MSG_TYPE_OPERATION_PROGRESS,
        json!({
            "operation_id": update.operation_id,
            "batch_id": update.batch_id,
            "status": update.status,
            "progress": update.progress,
            "error": update.error,
        }),
    )
}

fn push_message(msg_type: &str, payload: serde_json::Value) -> Message {
    let body = json!({ "type": msg_type, "payload": payload });
    Message::Text(body.to_string().into())
}
