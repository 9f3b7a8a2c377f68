//! Process-local backend.
//!
//! Each table sits behind its own `tokio::sync::RwLock`. A mutation is one
//! write-lock critical section over a single record (or, for the bulk
//! presence helpers, one pass over the worker map); reads only take the
//! read lock, so any number of pollers can read concurrently.

use std::collections::HashMap;

use async_trait::async_trait;
use savesync_core::operation::OperationStatus;
use savesync_core::types::{BatchId, ClientId, OperationId, Timestamp, UserId};
use tokio::sync::RwLock;

use crate::models::operation::{NewOperation, Operation, OperationChange};
use crate::models::worker::Worker;
use crate::store::{
    CasOutcome, ClaimOutcome, OperationStore, PresenceStore, ReleaseOutcome, StoreResult,
};

/// Operation rows keyed by id, with an insertion sequence for FIFO order.
#[derive(Default)]
struct OperationTable {
    rows: HashMap<OperationId, (u64, Operation)>,
    next_seq: u64,
}

impl OperationTable {
    /// Rows matching `pred`, in insertion order.
    fn ordered<F>(&self, pred: F) -> Vec<Operation>
    where
        F: Fn(&Operation) -> bool,
    {
        let mut matched: Vec<&(u64, Operation)> =
            self.rows.values().filter(|(_, op)| pred(op)).collect();
        matched.sort_by_key(|(seq, _)| *seq);
        matched.into_iter().map(|(_, op)| op.clone()).collect()
    }
}

/// In-memory implementation of both store traits.
#[derive(Default)]
pub struct MemoryStore {
    workers: RwLock<HashMap<String, Worker>>,
    operations: RwLock<OperationTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn upsert_heartbeat(&self, client_id: &str, now: Timestamp) -> StoreResult<Worker> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .entry(client_id.to_string())
            .or_insert_with(|| Worker::first_heartbeat(client_id, now));
        worker.last_ping_at = now;
        Ok(worker.clone())
    }

    async fn find_worker(&self, client_id: &str) -> StoreResult<Option<Worker>> {
        Ok(self.workers.read().await.get(client_id).cloned())
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        let mut workers: Vec<Worker> = self.workers.read().await.values().cloned().collect();
        workers.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(workers)
    }

    async fn find_claimed_by(&self, user: UserId) -> StoreResult<Option<Worker>> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .find(|w| w.claimed && w.linked_user == Some(user))
            .cloned())
    }

    async fn try_claim(
        &self,
        client_id: &str,
        user: UserId,
        seen_after: Timestamp,
        now: Timestamp,
    ) -> StoreResult<ClaimOutcome> {
        let mut workers = self.workers.write().await;

        let Some(target) = workers.get(client_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if target.claimed {
            return Ok(ClaimOutcome::AlreadyClaimed(target.clone()));
        }
        if target.last_ping_at <= seen_after {
            return Ok(ClaimOutcome::Offline(target.clone()));
        }
        if let Some(other) = workers
            .values()
            .find(|w| w.claimed && w.linked_user == Some(user))
        {
            return Ok(ClaimOutcome::UserHasWorker(other.clone()));
        }

        let Some(target) = workers.get_mut(client_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        target.bind_to(user, now);
        Ok(ClaimOutcome::Claimed(target.clone()))
    }

    async fn release(&self, client_id: &str) -> StoreResult<Option<Worker>> {
        let mut workers = self.workers.write().await;
        Ok(workers.get_mut(client_id).map(|w| {
            w.unbind();
            w.clone()
        }))
    }

    async fn release_if_linked(
        &self,
        client_id: &str,
        user: UserId,
    ) -> StoreResult<ReleaseOutcome> {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(client_id) else {
            return Ok(ReleaseOutcome::NotFound);
        };
        if !worker.claimed {
            return Ok(ReleaseOutcome::NotClaimed(worker.clone()));
        }
        if worker.linked_user != Some(user) {
            return Ok(ReleaseOutcome::ClaimedByOther(worker.clone()));
        }
        worker.unbind();
        Ok(ReleaseOutcome::Released(worker.clone()))
    }

    async fn release_idle(&self, seen_before: Timestamp) -> StoreResult<Vec<Worker>> {
        let mut workers = self.workers.write().await;
        let released = workers
            .values_mut()
            .filter(|w| w.claimed && w.last_ping_at < seen_before)
            .map(|w| {
                w.unbind();
                w.clone()
            })
            .collect();
        Ok(released)
    }

    async fn evict_idle(&self, seen_before: Timestamp) -> StoreResult<Vec<ClientId>> {
        let mut workers = self.workers.write().await;
        let mut evicted = Vec::new();
        workers.retain(|client_id, w| {
            let keep = w.claimed || w.last_ping_at >= seen_before;
            if !keep {
                evicted.push(client_id.clone());
            }
            keep
        });
        evicted.sort();
        Ok(evicted)
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_operations(&self, ops: Vec<NewOperation>) -> StoreResult<Vec<Operation>> {
        let mut table = self.operations.write().await;
        let mut inserted = Vec::with_capacity(ops.len());
        for input in ops {
            let op = Operation::from_new(input);
            let seq = table.next_seq;
            table.next_seq += 1;
            table.rows.insert(op.operation_id, (seq, op.clone()));
            inserted.push(op);
        }
        Ok(inserted)
    }

    async fn find_operation(&self, id: OperationId) -> StoreResult<Option<Operation>> {
        Ok(self
            .operations
            .read()
            .await
            .rows
            .get(&id)
            .map(|(_, op)| op.clone()))
    }

    async fn find_operations(&self, ids: &[OperationId]) -> StoreResult<Vec<Operation>> {
        let table = self.operations.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| table.rows.get(id).map(|(_, op)| op.clone()))
            .collect())
    }

    async fn list_pending_for(&self, client_id: &str) -> StoreResult<Vec<Operation>> {
        Ok(self.operations.read().await.ordered(|op| {
            op.target_client_id == client_id && op.status == OperationStatus::Pending
        }))
    }

    async fn list_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Operation>> {
        Ok(self
            .operations
            .read()
            .await
            .ordered(|op| op.batch_id == Some(batch_id)))
    }

    async fn list_by_owner(&self, owner: UserId, limit: i64) -> StoreResult<Vec<Operation>> {
        let mut ops = self
            .operations
            .read()
            .await
            .ordered(|op| op.owner_user == owner);
        ops.reverse();
        ops.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(ops)
    }

    async fn list_stale(&self, inactive_since: Timestamp) -> StoreResult<Vec<Operation>> {
        Ok(self
            .operations
            .read()
            .await
            .ordered(|op| !op.status.is_terminal() && op.updated_at < inactive_since))
    }

    async fn apply_change(
        &self,
        id: OperationId,
        change: &OperationChange,
    ) -> StoreResult<CasOutcome> {
        let mut table = self.operations.write().await;
        let Some((_, op)) = table.rows.get_mut(&id) else {
            return Ok(CasOutcome::NotFound);
        };
        if !change.applies_to(op) {
            return Ok(CasOutcome::Rejected(op.clone()));
        }
        change.apply(op);
        Ok(CasOutcome::Applied(op.clone()))
    }

    async fn delete_finished_before(&self, cutoff: Timestamp) -> StoreResult<u64> {
        let mut table = self.operations.write().await;
        let before = table.rows.len();
        table.rows.retain(|_, (_, op)| {
            !(op.status.is_terminal() && op.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - table.rows.len()) as u64)
    }
}
