//! Per-worker FIFO of pending operations.
//!
//! There is no queue structure of its own: the pending list of a worker is
//! a query over the operation store (`target_client_id`, `status =
//! pending`, insertion order). Polling never removes anything; a worker
//! acknowledges an operation by starting it.

use std::sync::Arc;

use savesync_core::clock::Clock;
use savesync_core::error::CoreError;
use savesync_core::operation::OperationKind;
use savesync_core::presence::validate_client_id;
use savesync_core::types::{BatchId, UserId};
use savesync_db::models::operation::{NewOperation, Operation};
use savesync_db::OperationStore;
use savesync_events::EventBus;
use uuid::Uuid;

use crate::claims::ClaimManager;
use crate::error::DispatchResult;
use crate::state_machine::operation_event;

/// Maximum number of sibling operations in one batch.
pub const MAX_BATCH_SIZE: usize = 64;

/// Default and maximum page size for [`DispatchQueue::list_recent`].
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Operations created by one enqueue request.
#[derive(Debug, Clone)]
pub struct Enqueued {
    /// Set when the request fanned out into sibling operations.
    pub batch_id: Option<BatchId>,
    pub operations: Vec<Operation>,
}

#[derive(Clone)]
pub struct DispatchQueue {
    claims: ClaimManager,
    store: Arc<dyn OperationStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl DispatchQueue {
    pub fn new(
        claims: ClaimManager,
        store: Arc<dyn OperationStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            claims,
            store,
            events,
            clock,
        }
    }

    /// Queue one operation for a worker claimed by `owner`.
    pub async fn enqueue(
        &self,
        target_client_id: &str,
        kind: OperationKind,
        owner: UserId,
        payload: serde_json::Value,
    ) -> DispatchResult<Operation> {
        let mut created = self
            .insert(target_client_id, kind, owner, None, vec![payload])
            .await?;
        created
            .pop()
            .ok_or_else(|| CoreError::Internal("store returned no operation".to_string()).into())
    }

    /// Queue one sibling operation per payload under a fresh batch id.
    /// Either every operation is created or none is.
    pub async fn enqueue_batch(
        &self,
        target_client_id: &str,
        kind: OperationKind,
        owner: UserId,
        payloads: Vec<serde_json::Value>,
    ) -> DispatchResult<Enqueued> {
        if payloads.is_empty() {
            return Err(CoreError::Validation("payloads must not be empty".to_string()).into());
        }
        if payloads.len() > MAX_BATCH_SIZE {
            return Err(CoreError::Validation(format!(
                "a batch may contain at most {MAX_BATCH_SIZE} operations"
            ))
            .into());
        }

        let batch_id = Uuid::now_v7();
        let operations = self
            .insert(target_client_id, kind, owner, Some(batch_id), payloads)
            .await?;
        Ok(Enqueued {
            batch_id: Some(batch_id),
            operations,
        })
    }

    /// Pending operations for `client_id`, oldest first.
    pub async fn poll(&self, client_id: &str) -> DispatchResult<Vec<Operation>> {
        validate_client_id(client_id)?;
        Ok(self.store.list_pending_for(client_id).await?)
    }

    /// Most recent operations requested by `owner`, newest first.
    pub async fn list_recent(
        &self,
        owner: UserId,
        limit: Option<i64>,
    ) -> DispatchResult<Vec<Operation>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.store.list_by_owner(owner, limit).await?)
    }

    async fn insert(
        &self,
        target_client_id: &str,
        kind: OperationKind,
        owner: UserId,
        batch_id: Option<BatchId>,
        payloads: Vec<serde_json::Value>,
    ) -> DispatchResult<Vec<Operation>> {
        self.claims
            .require_claimed_by(target_client_id, owner)
            .await?;

        let now = self.clock.now();
        let rows = payloads
            .into_iter()
            .map(|payload| {
                Ok(NewOperation {
                    operation_id: Uuid::now_v7(),
                    kind: kind.clone(),
                    target_client_id: target_client_id.to_string(),
                    owner_user: owner,
                    batch_id,
                    payload: normalize_payload(payload)?,
                    created_at: now,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let created = self.store.insert_operations(rows).await?;
        for op in &created {
            tracing::info!(
                operation_id = %op.operation_id,
                client_id = %target_client_id,
                kind = %op.kind,
                batch_id = ?batch_id,
                "Operation enqueued",
            );
            self.events.publish(operation_event(op, now));
        }
        Ok(created)
    }
}

/// Payloads are JSON objects; `null` stands for an empty one.
fn normalize_payload(payload: serde_json::Value) -> Result<serde_json::Value, CoreError> {
    match payload {
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        serde_json::Value::Object(_) => Ok(payload),
        _ => Err(CoreError::Validation(
            "payload must be a JSON object".to_string(),
        )),
    }
}
