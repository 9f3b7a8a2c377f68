//! Operation entity, its database row, and mutation DTOs.

use serde::Serialize;
use sqlx::FromRow;
use savesync_core::operation::{
    OperationKind, OperationStatus, Progress, StatusId, TIMEOUT_ERROR,
};
use savesync_core::types::{BatchId, ClientId, OperationId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// One unit of dispatched work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub progress: Option<Progress>,
    pub target_client_id: ClientId,
    pub owner_user: UserId,
    pub batch_id: Option<BatchId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    /// Last activity: creation, start, progress report, or terminal update.
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
}

impl Operation {
    pub fn from_new(input: NewOperation) -> Self {
        Self {
            operation_id: input.operation_id,
            kind: input.kind,
            status: OperationStatus::Pending,
            progress: None,
            target_client_id: input.target_client_id,
            owner_user: input.owner_user,
            batch_id: input.batch_id,
            payload: input.payload,
            created_at: input.created_at,
            updated_at: input.created_at,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// A row from the `operations` table.
#[derive(Debug, Clone, FromRow)]
pub struct OperationRow {
    pub id: OperationId,
    pub kind: String,
    pub status_id: StatusId,
    pub progress_current: Option<i64>,
    pub progress_total: Option<i64>,
    pub progress_message: Option<String>,
    pub target_client_id: ClientId,
    pub owner_user: UserId,
    pub batch_id: Option<BatchId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// DTO for inserting a pending operation.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub target_client_id: ClientId,
    pub owner_user: UserId,
    pub batch_id: Option<BatchId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

/// A conditional mutation of one operation.
///
/// Backends apply a change only when the current status is in
/// [`allowed_from`](OperationChange::allowed_from) (and, for `Timeout`,
/// the operation has been inactive since the cutoff), atomically per
/// record.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationChange {
    Start { at: Timestamp },
    Progress { progress: Progress, at: Timestamp },
    Complete { at: Timestamp },
    Fail { error: String, at: Timestamp },
    /// Watchdog failure; skipped if there was activity at or after `inactive_since`.
    Timeout { inactive_since: Timestamp, at: Timestamp },
}

impl OperationChange {
    pub fn allowed_from(&self) -> &'static [OperationStatus] {
        match self {
            Self::Start { .. } => &[OperationStatus::Pending],
            Self::Progress { .. } | Self::Complete { .. } => &[OperationStatus::InProgress],
            Self::Fail { .. } | Self::Timeout { .. } => {
                &[OperationStatus::Pending, OperationStatus::InProgress]
            }
        }
    }

    /// Status the operation ends up in.
    pub fn target_status(&self) -> OperationStatus {
        match self {
            Self::Start { .. } | Self::Progress { .. } => OperationStatus::InProgress,
            Self::Complete { .. } => OperationStatus::Completed,
            Self::Fail { .. } | Self::Timeout { .. } => OperationStatus::Failed,
        }
    }

    /// Whether the change may be applied to `op` in its current state.
    pub fn applies_to(&self, op: &Operation) -> bool {
        if !self.allowed_from().contains(&op.status) {
            return false;
        }
        match self {
            Self::Timeout { inactive_since, .. } => op.updated_at < *inactive_since,
            _ => true,
        }
    }

    /// Mutate `op` in place. Callers check [`applies_to`](Self::applies_to) first.
    pub fn apply(&self, op: &mut Operation) {
        match self {
            Self::Start { at } => {
                op.status = OperationStatus::InProgress;
                op.started_at = Some(*at);
                op.updated_at = *at;
            }
            Self::Progress { progress, at } => {
                op.progress = Some(progress.clone());
                op.updated_at = *at;
            }
            Self::Complete { at } => {
                op.status = OperationStatus::Completed;
                op.completed_at = Some(*at);
                op.updated_at = *at;
            }
            Self::Fail { error, at } => {
                op.status = OperationStatus::Failed;
                op.error = Some(error.clone());
                op.completed_at = Some(*at);
                op.updated_at = *at;
            }
            Self::Timeout { at, .. } => {
                op.status = OperationStatus::Failed;
                op.error = Some(TIMEOUT_ERROR.to_string());
                op.completed_at = Some(*at);
                op.updated_at = *at;
            }
        }
    }
}
