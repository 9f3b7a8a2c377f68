use savesync_core::error::CoreError;
use savesync_core::operation::OperationStatus;
use savesync_core::types::{BatchId, ClientId, OperationId};
use savesync_db::StoreError;

/// Routing, claim, and transition errors raised by the dispatch services.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Worker not found: {0}")]
    WorkerNotFound(ClientId),

    #[error("Worker {0} is already claimed by another user")]
    AlreadyClaimed(ClientId),

    #[error("Worker {0} is offline")]
    WorkerOffline(ClientId),

    #[error("User already holds worker {0}; unclaim it first")]
    UserAlreadyHasWorker(ClientId),

    #[error("Worker {0} is not claimed by the requesting user")]
    WorkerNotClaimedByOwner(ClientId),

    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("Cannot {action} operation {operation_id} while it is {status}")]
    InvalidTransition {
        operation_id: OperationId,
        action: &'static str,
        status: OperationStatus,
    },

    /// Validation and authorization failures.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backend failure; transient from the caller's point of view.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
