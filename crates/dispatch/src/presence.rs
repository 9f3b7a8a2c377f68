//! Worker heartbeats, presence reads, and the presence monitor.
//!
//! `online` is never stored. Every read computes it from `last_ping_at`
//! and the configured heartbeat timeout, so a worker that stops pinging
//! goes offline without any write.

use std::collections::HashSet;
use std::sync::Arc;

use savesync_core::clock::Clock;
use savesync_core::presence::validate_client_id;
use savesync_core::types::{ClientId, UserId};
use savesync_db::models::worker::WorkerSnapshot;
use savesync_db::PresenceStore;
use savesync_events::{DispatchEvent, EventBus};

use crate::config::{to_chrono, DispatchConfig};
use crate::error::{DispatchError, DispatchResult};

/// Heartbeat intake and presence queries.
#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn PresenceStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    heartbeat_timeout: chrono::Duration,
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            heartbeat_timeout: to_chrono(config.heartbeat_timeout),
        }
    }

    /// Record a heartbeat, creating the worker on first contact.
    /// Leaves the claim untouched.
    pub async fn heartbeat(&self, client_id: &str) -> DispatchResult<WorkerSnapshot> {
        validate_client_id(client_id)?;
        let now = self.clock.now();
        let worker = self.store.upsert_heartbeat(client_id, now).await?;

        if worker.first_seen_at == now {
            tracing::info!(client_id = %client_id, "New worker registered");
        } else {
            tracing::trace!(client_id = %client_id, "Worker heartbeat");
        }
        self.events
            .publish(DispatchEvent::presence_changed(client_id, now));

        Ok(worker.snapshot(now, self.heartbeat_timeout))
    }

    /// All workers, ordered by client id.
    pub async fn list(&self) -> DispatchResult<Vec<WorkerSnapshot>> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_workers()
            .await?
            .iter()
            .map(|w| w.snapshot(now, self.heartbeat_timeout))
            .collect())
    }

    pub async fn get(&self, client_id: &str) -> DispatchResult<WorkerSnapshot> {
        validate_client_id(client_id)?;
        let worker = self
            .store
            .find_worker(client_id)
            .await?
            .ok_or_else(|| DispatchError::WorkerNotFound(client_id.to_string()))?;
        Ok(worker.snapshot(self.clock.now(), self.heartbeat_timeout))
    }

    /// The worker currently claimed by `user`, if any.
    pub async fn claimed_by(&self, user: UserId) -> DispatchResult<Option<WorkerSnapshot>> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_claimed_by(user)
            .await?
            .map(|w| w.snapshot(now, self.heartbeat_timeout)))
    }
}

// ---------------------------------------------------------------------------
// Presence monitor
// ---------------------------------------------------------------------------

/// What one presence check changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PresenceCheck {
    /// Workers that were online at the previous check and are not now.
    pub went_offline: Vec<ClientId>,
    /// Claims released by the idle-claim expiry knob.
    pub claims_expired: Vec<ClientId>,
    /// Unclaimed workers deleted after the eviction threshold.
    pub evicted: Vec<ClientId>,
}

impl PresenceCheck {
    pub fn is_empty(&self) -> bool {
        self.went_offline.is_empty() && self.claims_expired.is_empty() && self.evicted.is_empty()
    }
}

/// Periodic presence housekeeping.
///
/// Remembers which workers were online at the last check so that a
/// silent online -> offline flip can be announced; heartbeats announce
/// every other presence change themselves.
pub struct PresenceMonitor {
    store: Arc<dyn PresenceStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    online: HashSet<ClientId>,
}

impl PresenceMonitor {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            config,
            online: HashSet::new(),
        }
    }

    /// Run one check: detect offline flips, expire idle claims (when
    /// configured), and evict long-idle unclaimed workers.
    pub async fn check(&mut self) -> DispatchResult<PresenceCheck> {
        let now = self.clock.now();
        let heartbeat_timeout = to_chrono(self.config.heartbeat_timeout);
        let mut result = PresenceCheck::default();

        let online_now: HashSet<ClientId> = self
            .store
            .list_workers()
            .await?
            .into_iter()
            .filter(|w| w.is_online(now, heartbeat_timeout))
            .map(|w| w.client_id)
            .collect();

        result.went_offline = self.online.difference(&online_now).cloned().collect();
        result.went_offline.sort();
        self.online = online_now;

        for client_id in &result.went_offline {
            tracing::info!(client_id = %client_id, "Worker went offline");
            self.events
                .publish(DispatchEvent::presence_changed(client_id.as_str(), now));
        }

        if let Some(expiry) = self.config.claim_idle_expiry {
            let released = self.store.release_idle(now - to_chrono(expiry)).await?;
            for worker in released {
                tracing::warn!(
                    client_id = %worker.client_id,
                    idle_secs = expiry.as_secs(),
                    "Released claim on idle worker",
                );
                self.events
                    .publish(DispatchEvent::presence_changed(worker.client_id.as_str(), now));
                result.claims_expired.push(worker.client_id);
            }
        }

        let cutoff = now - to_chrono(self.config.worker_evict_after);
        result.evicted = self.store.evict_idle(cutoff).await?;
        for client_id in &result.evicted {
            tracing::info!(client_id = %client_id, "Evicted idle worker");
            self.online.remove(client_id);
            self.events
                .publish(DispatchEvent::presence_changed(client_id.as_str(), now));
        }

        Ok(result)
    }
}

