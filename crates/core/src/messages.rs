//! WebSocket message type constants for the push channel.
//!
//! Used by the realtime notifier when pushing snapshots to browser
//! sessions. Clients that miss a message recover through polling.

/// Consolidated worker list, broadcast to sessions watching workers.
pub const MSG_TYPE_WORKERS_UPDATE: &str = "workers_update";

/// Progress or status change of a single operation, sent to its owner.
pub const MSG_TYPE_OPERATION_PROGRESS: &str = "operation_progress";
