//! One-worker-one-claimant bookkeeping.
//!
//! A claim is advisory: it routes enqueued work and drives the UI gate, it
//! does not lock the transport. Losing heartbeats does not release a claim
//! unless the idle-claim expiry knob is configured (see
//! [`PresenceMonitor`](crate::presence::PresenceMonitor)).

use std::sync::Arc;

use savesync_core::clock::Clock;
use savesync_core::error::CoreError;
use savesync_core::presence::validate_client_id;
use savesync_core::types::UserId;
use savesync_db::models::worker::{Worker, WorkerSnapshot};
use savesync_db::{ClaimOutcome, PresenceStore, ReleaseOutcome};
use savesync_events::{DispatchEvent, EventBus};

use crate::config::{to_chrono, DispatchConfig};
use crate::error::{DispatchError, DispatchResult};

#[derive(Clone)]
pub struct ClaimManager {
    store: Arc<dyn PresenceStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    heartbeat_timeout: chrono::Duration,
}

impl ClaimManager {
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

    /// Bind `client_id` to `user`.
    ///
    /// Succeeds only if the worker is online and unclaimed. A claimed worker
    /// answers `AlreadyClaimed` to everyone, its holder included, so of two
    /// concurrent claims on one worker exactly one succeeds.
    pub async fn claim(&self, client_id: &str, user: UserId) -> DispatchResult<WorkerSnapshot> {
        validate_client_id(client_id)?;
        let now = self.clock.now();
        let seen_after = now - self.heartbeat_timeout;

        match self.store.try_claim(client_id, user, seen_after, now).await? {
            ClaimOutcome::Claimed(worker) => {
                tracing::info!(client_id = %client_id, user_id = user, "Worker claimed");
                self.events
                    .publish(DispatchEvent::presence_changed(client_id, now));
                Ok(worker.snapshot(now, self.heartbeat_timeout))
            }
            ClaimOutcome::NotFound => Err(DispatchError::WorkerNotFound(client_id.to_string())),
            ClaimOutcome::AlreadyClaimed(_) => {
                Err(DispatchError::AlreadyClaimed(client_id.to_string()))
            }
            ClaimOutcome::Offline(_) => Err(DispatchError::WorkerOffline(client_id.to_string())),
            ClaimOutcome::UserHasWorker(held) => {
                Err(DispatchError::UserAlreadyHasWorker(held.client_id))
            }
        }
    }

    /// Clear the claim unconditionally.
    pub async fn unclaim(&self, client_id: &str) -> DispatchResult<WorkerSnapshot> {
        validate_client_id(client_id)?;
        let now = self.clock.now();
        let worker = self
            .store
            .release(client_id)
            .await?
            .ok_or_else(|| DispatchError::WorkerNotFound(client_id.to_string()))?;

        tracing::info!(client_id = %client_id, "Worker unclaimed");
        self.events
            .publish(DispatchEvent::presence_changed(client_id, now));
        Ok(worker.snapshot(now, self.heartbeat_timeout))
    }

    /// Clear the claim on behalf of `user`.
    ///
    /// An admin releases unconditionally. Anyone else releases only a claim
    /// they hold at the moment of the update, so a worker re-claimed by
    /// another user in the meantime stays claimed. Releasing an unclaimed
    /// worker is a no-op.
    pub async fn unclaim_as(
        &self,
        client_id: &str,
        user: UserId,
        is_admin: bool,
    ) -> DispatchResult<WorkerSnapshot> {
        if is_admin {
            return self.unclaim(client_id).await;
        }
        validate_client_id(client_id)?;
        let now = self.clock.now();

        match self.store.release_if_linked(client_id, user).await? {
            ReleaseOutcome::Released(worker) => {
                tracing::info!(client_id = %client_id, user_id = user, "Worker unclaimed");
                self.events
                    .publish(DispatchEvent::presence_changed(client_id, now));
                Ok(worker.snapshot(now, self.heartbeat_timeout))
            }
            ReleaseOutcome::NotClaimed(worker) => Ok(worker.snapshot(now, self.heartbeat_timeout)),
            ReleaseOutcome::ClaimedByOther(_) => Err(CoreError::Forbidden(format!(
                "Worker {client_id} is claimed by another user"
            ))
            .into()),
            ReleaseOutcome::NotFound => Err(DispatchError::WorkerNotFound(client_id.to_string())),
        }
    }

    /// Kill-switch: release every claimed worker, then return the full
    /// worker list.
    pub async fn unclaim_all(&self) -> DispatchResult<Vec<WorkerSnapshot>> {
        let claimed: Vec<Worker> = self
            .store
            .list_workers()
            .await?
            .into_iter()
            .filter(|w| w.claimed)
            .collect();

        let now = self.clock.now();
        for worker in &claimed {
            if self.store.release(&worker.client_id).await?.is_some() {
                self.events
                    .publish(DispatchEvent::presence_changed(worker.client_id.as_str(), now));
            }
        }
        tracing::warn!(released = claimed.len(), "Kill-switch released all worker claims");

        let now = self.clock.now();
        Ok(self
            .store
            .list_workers()
            .await?
            .iter()
            .map(|w| w.snapshot(now, self.heartbeat_timeout))
            .collect())
    }

    /// The worker record for `client_id`, provided it is claimed by `user`.
    pub async fn require_claimed_by(&self, client_id: &str, user: UserId) -> DispatchResult<Worker> {
        validate_client_id(client_id)?;
        let worker = self
            .store
            .find_worker(client_id)
            .await?
            .ok_or_else(|| DispatchError::WorkerNotFound(client_id.to_string()))?;
        if !worker.claimed || worker.linked_user != Some(user) {
            return Err(DispatchError::WorkerNotClaimedByOwner(client_id.to_string()));
        }
        Ok(worker)
    }
}
