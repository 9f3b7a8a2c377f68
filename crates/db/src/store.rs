//! Store traits shared by the in-memory and PostgreSQL backends.
//!
//! Every mutating method is atomic per record: two concurrent claims of
//! one worker, or two concurrent transitions of one operation, never both
//! succeed. No method blocks on anything but the store itself.

use async_trait::async_trait;
use savesync_core::types::{BatchId, ClientId, OperationId, Timestamp, UserId};

use crate::models::operation::{NewOperation, Operation, OperationChange};
use crate::models::worker::Worker;

/// Backend failure. Transient from the caller's point of view; the core
/// never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an attempt to bind a worker to a user.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The worker is now claimed by the requesting user.
    Claimed(Worker),
    /// No worker with that client id.
    NotFound,
    /// Already claimed, by anyone, including the requesting user.
    AlreadyClaimed(Worker),
    /// The worker has not sent a heartbeat recently enough.
    Offline(Worker),
    /// The requesting user already holds this other worker.
    UserHasWorker(Worker),
}

/// Result of releasing a claim on behalf of one user.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    /// The claim belonged to the user and is now cleared.
    Released(Worker),
    /// The worker was not claimed; nothing changed.
    NotClaimed(Worker),
    /// Claimed by someone else; nothing changed.
    ClaimedByOther(Worker),
    NotFound,
}

/// Result of a conditional operation update.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The change was applied; carries the updated record.
    Applied(Operation),
    /// The record exists but was not in an eligible state; carries it unchanged.
    Rejected(Operation),
    NotFound,
}

/// Worker identity, claim ownership, and liveness timestamps.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Insert the worker if unseen, then set `last_ping_at = now`.
    /// Never touches the claim fields.
    async fn upsert_heartbeat(&self, client_id: &str, now: Timestamp) -> StoreResult<Worker>;

    async fn find_worker(&self, client_id: &str) -> StoreResult<Option<Worker>>;

    /// All workers ordered by client id.
    async fn list_workers(&self) -> StoreResult<Vec<Worker>>;

    async fn find_claimed_by(&self, user: UserId) -> StoreResult<Option<Worker>>;

    /// Bind `client_id` to `user` if it exists, was seen after `seen_after`,
    /// and is unclaimed, and `user` holds no other worker.
    async fn try_claim(
        &self,
        client_id: &str,
        user: UserId,
        seen_after: Timestamp,
        now: Timestamp,
    ) -> StoreResult<ClaimOutcome>;

    /// Clear the claim unconditionally. `None` if the worker does not exist.
    async fn release(&self, client_id: &str) -> StoreResult<Option<Worker>>;

    /// Clear the claim only while `client_id` is claimed by `user`. The
    /// check and the update are one atomic step.
    async fn release_if_linked(&self, client_id: &str, user: UserId)
        -> StoreResult<ReleaseOutcome>;

    /// Release every claimed worker last seen before `seen_before`.
    async fn release_idle(&self, seen_before: Timestamp) -> StoreResult<Vec<Worker>>;

    /// Delete unclaimed workers last seen before `seen_before`, returning
    /// their client ids.
    async fn evict_idle(&self, seen_before: Timestamp) -> StoreResult<Vec<ClientId>>;
}

/// Operation records. The dispatch queue is a query over this store.
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    /// Insert all operations or none of them.
    async fn insert_operations(&self, ops: Vec<NewOperation>) -> StoreResult<Vec<Operation>>;

    async fn find_operation(&self, id: OperationId) -> StoreResult<Option<Operation>>;

    /// Operations among `ids` that exist, in no particular order.
    async fn find_operations(&self, ids: &[OperationId]) -> StoreResult<Vec<Operation>>;

    /// Pending operations targeting `client_id`, oldest first.
    async fn list_pending_for(&self, client_id: &str) -> StoreResult<Vec<Operation>>;

    /// Members of a batch, oldest first.
    async fn list_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Operation>>;

    /// Most recent operations requested by `owner`, newest first.
    async fn list_by_owner(&self, owner: UserId, limit: i64) -> StoreResult<Vec<Operation>>;

    /// Non-terminal operations with no activity since `inactive_since`.
    async fn list_stale(&self, inactive_since: Timestamp) -> StoreResult<Vec<Operation>>;

    /// Apply `change` if the operation is in an eligible state.
    async fn apply_change(
        &self,
        id: OperationId,
        change: &OperationChange,
    ) -> StoreResult<CasOutcome>;

    /// Delete terminal operations that finished before `cutoff`.
    async fn delete_finished_before(&self, cutoff: Timestamp) -> StoreResult<u64>;
}
