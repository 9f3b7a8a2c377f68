//! PostgreSQL backend.

use async_trait::async_trait;
use savesync_core::types::{BatchId, ClientId, OperationId, Timestamp, UserId};

use crate::models::operation::{NewOperation, Operation, OperationChange, OperationRow};
use crate::models::worker::Worker;
use crate::repositories::{OperationRepo, WorkerRepo};
use crate::store::{
    CasOutcome, ClaimOutcome, OperationStore, PresenceStore, ReleaseOutcome, StoreResult,
};
use crate::DbPool;

/// Store backed by a PostgreSQL pool. Cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn convert_all(rows: Vec<OperationRow>) -> StoreResult<Vec<Operation>> {
    rows.into_iter().map(Operation::try_from).collect()
}

#[async_trait]
impl PresenceStore for PgStore {
    async fn upsert_heartbeat(&self, client_id: &str, now: Timestamp) -> StoreResult<Worker> {
        Ok(WorkerRepo::upsert_heartbeat(&self.pool, client_id, now).await?)
    }

    async fn find_worker(&self, client_id: &str) -> StoreResult<Option<Worker>> {
        Ok(WorkerRepo::find_by_client_id(&self.pool, client_id).await?)
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        Ok(WorkerRepo::list(&self.pool).await?)
    }

    async fn find_claimed_by(&self, user: UserId) -> StoreResult<Option<Worker>> {
        Ok(WorkerRepo::find_claimed_by(&self.pool, user).await?)
    }

    async fn try_claim(
        &self,
        client_id: &str,
        user: UserId,
        seen_after: Timestamp,
        now: Timestamp,
    ) -> StoreResult<ClaimOutcome> {
        // A user holding a different worker is checked up front; the unique
        // index inside `try_claim` covers the race between two such claims.
        if let Some(held) = WorkerRepo::find_claimed_by(&self.pool, user).await? {
            if held.client_id != client_id {
                return Ok(ClaimOutcome::UserHasWorker(held));
            }
        }
        Ok(WorkerRepo::try_claim(&self.pool, client_id, user, seen_after, now).await?)
    }

    async fn release(&self, client_id: &str) -> StoreResult<Option<Worker>> {
        Ok(WorkerRepo::release(&self.pool, client_id).await?)
    }

    async fn release_if_linked(
        &self,
        client_id: &str,
        user: UserId,
    ) -> StoreResult<ReleaseOutcome> {
        if let Some(worker) = WorkerRepo::release_if_linked(&self.pool, client_id, user).await? {
            return Ok(ReleaseOutcome::Released(worker));
        }
        // Nothing was updated; report the state that blocked it.
        Ok(match WorkerRepo::find_by_client_id(&self.pool, client_id).await? {
            None => ReleaseOutcome::NotFound,
            Some(worker) if !worker.claimed => ReleaseOutcome::NotClaimed(worker),
            Some(worker) => ReleaseOutcome::ClaimedByOther(worker),
        })
    }

    async fn release_idle(&self, seen_before: Timestamp) -> StoreResult<Vec<Worker>> {
        Ok(WorkerRepo::release_idle(&self.pool, seen_before).await?)
    }

    async fn evict_idle(&self, seen_before: Timestamp) -> StoreResult<Vec<ClientId>> {
        Ok(WorkerRepo::evict_idle(&self.pool, seen_before).await?)
    }
}

#[async_trait]
impl OperationStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(crate::health_check(&self.pool).await?)
    }

    async fn insert_operations(&self, ops: Vec<NewOperation>) -> StoreResult<Vec<Operation>> {
        convert_all(OperationRepo::insert_all(&self.pool, &ops).await?)
    }

    async fn find_operation(&self, id: OperationId) -> StoreResult<Option<Operation>> {
        OperationRepo::find_by_id(&self.pool, id)
            .await?
            .map(Operation::try_from)
            .transpose()
    }

    async fn find_operations(&self, ids: &[OperationId]) -> StoreResult<Vec<Operation>> {
        convert_all(OperationRepo::find_many(&self.pool, ids).await?)
    }

    async fn list_pending_for(&self, client_id: &str) -> StoreResult<Vec<Operation>> {
        convert_all(OperationRepo::list_pending_for(&self.pool, client_id).await?)
    }

    async fn list_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Operation>> {
        convert_all(OperationRepo::list_by_batch(&self.pool, batch_id).await?)
    }

    async fn list_by_owner(&self, owner: UserId, limit: i64) -> StoreResult<Vec<Operation>> {
        convert_all(OperationRepo::list_by_owner(&self.pool, owner, limit).await?)
    }

    async fn list_stale(&self, inactive_since: Timestamp) -> StoreResult<Vec<Operation>> {
        convert_all(OperationRepo::list_stale(&self.pool, inactive_since).await?)
    }

    async fn apply_change(
        &self,
        id: OperationId,
        change: &OperationChange,
    ) -> StoreResult<CasOutcome> {
        if let Some(row) = OperationRepo::apply_change(&self.pool, id, change).await? {
            return Ok(CasOutcome::Applied(Operation::try_from(row)?));
        }
        match OperationRepo::find_by_id(&self.pool, id).await? {
            Some(row) => Ok(CasOutcome::Rejected(Operation::try_from(row)?)),
            None => Ok(CasOutcome::NotFound),
        }
    }

    async fn delete_finished_before(&self, cutoff: Timestamp) -> StoreResult<u64> {
        Ok(OperationRepo::delete_finished_before(&self.pool, cutoff).await?)
    }
}
