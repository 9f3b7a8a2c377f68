//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Publishing never blocks: a slow subscriber lags and loses the oldest
//! buffered events instead of holding up the publisher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use savesync_core::operation::{OperationStatus, Progress};
use savesync_core::types::{BatchId, ClientId, OperationId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// DispatchEvent
// ---------------------------------------------------------------------------

/// Snapshot of one operation after a state change or progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationUpdate {
    pub operation_id: OperationId,
    pub owner_user: UserId,
    pub batch_id: Option<BatchId>,
    pub status: OperationStatus,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

/// A change in the dispatch subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// A worker came online, went offline, was claimed, released, or evicted.
    PresenceChanged {
        client_id: ClientId,
        timestamp: Timestamp,
    },
    /// An operation was created, transitioned, or reported progress.
    OperationUpdated(OperationUpdate),
}

impl DispatchEvent {
    pub fn presence_changed(client_id: impl Into<ClientId>, timestamp: Timestamp) -> Self {
        Self::PresenceChanged {
            client_id: client_id.into(),
            timestamp,
        }
    }

    /// Dot-separated event name used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PresenceChanged { .. } => "presence.changed",
            Self::OperationUpdated(_) => "operation.updated",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus, shared as `Arc<EventBus>`.
///
/// ```rust
/// use savesync_events::{DispatchEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DispatchEvent::presence_changed("host-1", chrono::Utc::now()));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: DispatchEvent) {
        tracing::trace!(event_type = event.event_type(), "Publishing dispatch event");
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
