//! Worker presence entity and its read-time snapshot.

use chrono::Duration;
use serde::Serialize;
use sqlx::FromRow;
use savesync_core::presence;
use savesync_core::types::{ClientId, Timestamp, UserId};

/// A row from the `workers` table.
///
/// `claimed == true` iff `linked_user.is_some()`; every write path in both
/// backends sets the two together.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Worker {
    pub client_id: ClientId,
    pub claimed: bool,
    pub linked_user: Option<UserId>,
    pub claimed_at: Option<Timestamp>,
    pub last_ping_at: Timestamp,
    pub first_seen_at: Timestamp,
}

impl Worker {
    /// A never-before-seen worker, as created by its first heartbeat.
    pub fn first_heartbeat(client_id: &str, now: Timestamp) -> Self {
        Self {
            client_id: client_id.to_string(),
            claimed: false,
            linked_user: None,
            claimed_at: None,
            last_ping_at: now,
            first_seen_at: now,
        }
    }

    pub fn is_online(&self, now: Timestamp, heartbeat_timeout: Duration) -> bool {
        presence::is_online(self.last_ping_at, now, heartbeat_timeout)
    }

    /// Project the row into the shape exposed to clients.
    pub fn snapshot(&self, now: Timestamp, heartbeat_timeout: Duration) -> WorkerSnapshot {
        WorkerSnapshot {
            client_id: self.client_id.clone(),
            claimed: self.claimed,
            linked_user: self.linked_user,
            last_ping_at: self.last_ping_at,
            online: self.is_online(now, heartbeat_timeout),
        }
    }

    pub(crate) fn bind_to(&mut self, user: UserId, now: Timestamp) {
        self.claimed = true;
        self.linked_user = Some(user);
        self.claimed_at = Some(now);
    }

    pub(crate) fn unbind(&mut self) {
        self.claimed = false;
        self.linked_user = None;
        self.claimed_at = None;
    }
}

/// Worker as seen by clients, with `online` computed relative to now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    pub client_id: ClientId,
    pub claimed: bool,
    pub linked_user: Option<UserId>,
    pub last_ping_at: Timestamp,
    pub online: bool,
}
