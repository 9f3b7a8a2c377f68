//! Operation lifecycle transitions.
//!
//! `pending -> in_progress -> {completed, failed}`, plus `pending -> failed`.
//! Every transition is one conditional store update, so two concurrent
//! reports on one operation never both apply. Duplicate reports that
//! would leave the record unchanged come back as [`Transition::Ignored`]
//! rather than as errors.

use std::sync::Arc;
use std::time::Duration;

use savesync_core::clock::Clock;
use savesync_core::error::CoreError;
use savesync_core::operation::{worker_error, OperationStatus, Progress};
use savesync_core::types::{OperationId, Timestamp};
use savesync_db::models::operation::{Operation, OperationChange};
use savesync_db::{CasOutcome, OperationStore};
use savesync_events::{DispatchEvent, EventBus, OperationUpdate};

use crate::config::to_chrono;
use crate::error::{DispatchError, DispatchResult};

/// Maximum length of a worker-reported error message.
const MAX_ERROR_LEN: usize = 2048;

/// Result of a transition request that is allowed to be a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The store was updated; carries the new record.
    Applied(Operation),
    /// The request was a duplicate; carries the unchanged record.
    Ignored(Operation),
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn operation(&self) -> &Operation {
        match self {
            Self::Applied(op) | Self::Ignored(op) => op,
        }
    }

    pub fn into_operation(self) -> Operation {
        match self {
            Self::Applied(op) | Self::Ignored(op) => op,
        }
    }
}

#[derive(Clone)]
pub struct OperationStateMachine {
    store: Arc<dyn OperationStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl OperationStateMachine {
    pub fn new(store: Arc<dyn OperationStore>, events: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events,
            clock,
        }
    }

    pub async fn get(&self, id: OperationId) -> DispatchResult<Operation> {
        self.store
            .find_operation(id)
            .await?
            .ok_or(DispatchError::OperationNotFound(id))
    }

    /// Check that a reporting worker is the operation's target.
    pub async fn authorize_reporter(&self, id: OperationId, client_id: &str) -> DispatchResult<()> {
        let op = self.get(id).await?;
        if op.target_client_id != client_id {
            return Err(CoreError::Forbidden(format!(
                "Operation {id} is not assigned to worker {client_id}"
            ))
            .into());
        }
        Ok(())
    }

    /// `pending -> in_progress`. A start on anything but a pending
    /// operation is ignored.
    pub async fn start(&self, id: OperationId) -> DispatchResult<Transition> {
        let change = OperationChange::Start {
            at: self.clock.now(),
        };
        match self.store.apply_change(id, &change).await? {
            CasOutcome::Applied(op) => {
                tracing::info!(
                    operation_id = %id,
                    client_id = %op.target_client_id,
                    "Operation started",
                );
                self.publish(&op);
                Ok(Transition::Applied(op))
            }
            CasOutcome::Rejected(op) => {
                tracing::info!(
                    operation_id = %id,
                    status = %op.status,
                    "Duplicate start ignored",
                );
                Ok(Transition::Ignored(op))
            }
            CasOutcome::NotFound => Err(DispatchError::OperationNotFound(id)),
        }
    }

    /// Overwrite the progress of an in-progress operation.
    pub async fn report_progress(
        &self,
        id: OperationId,
        current: i64,
        total: i64,
        message: impl Into<String>,
    ) -> DispatchResult<Operation> {
        let progress = Progress::new(current, total, message)?;
        let change = OperationChange::Progress {
            progress,
            at: self.clock.now(),
        };
        match self.store.apply_change(id, &change).await? {
            CasOutcome::Applied(op) => {
                tracing::debug!(operation_id = %id, current, total, "Operation progress");
                self.publish(&op);
                Ok(op)
            }
            CasOutcome::Rejected(op) => Err(DispatchError::InvalidTransition {
                operation_id: id,
                action: "report progress for",
                status: op.status,
            }),
            CasOutcome::NotFound => Err(DispatchError::OperationNotFound(id)),
        }
    }

    /// `in_progress -> completed`. Idempotent once completed.
    pub async fn complete(&self, id: OperationId) -> DispatchResult<Transition> {
        let change = OperationChange::Complete {
            at: self.clock.now(),
        };
        match self.store.apply_change(id, &change).await? {
            CasOutcome::Applied(op) => {
                tracing::info!(operation_id = %id, "Operation completed");
                self.publish(&op);
                Ok(Transition::Applied(op))
            }
            CasOutcome::Rejected(op) if op.status == OperationStatus::Completed => {
                tracing::debug!(operation_id = %id, "Duplicate complete ignored");
                Ok(Transition::Ignored(op))
            }
            CasOutcome::Rejected(op) => Err(DispatchError::InvalidTransition {
                operation_id: id,
                action: "complete",
                status: op.status,
            }),
            CasOutcome::NotFound => Err(DispatchError::OperationNotFound(id)),
        }
    }

    /// `pending | in_progress -> failed`. Idempotent once failed.
    ///
    /// Stored through [`worker_error`], so a report can never pass for a
    /// watchdog timeout.
    pub async fn fail(&self, id: OperationId, error: &str) -> DispatchResult<Transition> {
        let error = error.trim();
        if error.is_empty() {
            return Err(CoreError::Validation("error must not be empty".to_string()).into());
        }
        if error.len() > MAX_ERROR_LEN {
            return Err(CoreError::Validation(format!(
                "error must not exceed {MAX_ERROR_LEN} characters"
            ))
            .into());
        }

        let error = worker_error(error);
        let change = OperationChange::Fail {
            error: error.clone(),
            at: self.clock.now(),
        };
        match self.store.apply_change(id, &change).await? {
            CasOutcome::Applied(op) => {
                tracing::warn!(operation_id = %id, error = %error, "Operation failed");
                self.publish(&op);
                Ok(Transition::Applied(op))
            }
            CasOutcome::Rejected(op) if op.status == OperationStatus::Failed => {
                tracing::debug!(operation_id = %id, "Duplicate fail ignored");
                Ok(Transition::Ignored(op))
            }
            CasOutcome::Rejected(op) => Err(DispatchError::InvalidTransition {
                operation_id: id,
                action: "fail",
                status: op.status,
            }),
            CasOutcome::NotFound => Err(DispatchError::OperationNotFound(id)),
        }
    }

    /// Watchdog: fail every non-terminal operation with no activity for
    /// longer than `max_age`, returning the operations it timed out.
    ///
    /// Each candidate is updated on its own; an operation that reported in
    /// between the listing and its update is left alone.
    pub async fn sweep_timeouts(&self, max_age: Duration) -> DispatchResult<Vec<Operation>> {
        let now = self.clock.now();
        let inactive_since = now - to_chrono(max_age);
        let stale = self.store.list_stale(inactive_since).await?;

        let change = OperationChange::Timeout {
            inactive_since,
            at: now,
        };
        let mut timed_out = Vec::new();
        for candidate in stale {
            let id = candidate.operation_id;
            match self.store.apply_change(id, &change).await {
                Ok(CasOutcome::Applied(op)) => {
                    tracing::warn!(
                        operation_id = %id,
                        client_id = %op.target_client_id,
                        previous_status = %candidate.status,
                        "Operation timed out",
                    );
                    self.publish(&op);
                    timed_out.push(op);
                }
                Ok(CasOutcome::Rejected(_)) | Ok(CasOutcome::NotFound) => {}
                Err(e) => {
                    tracing::error!(operation_id = %id, error = %e, "Failed to time out operation");
                }
            }
        }
        Ok(timed_out)
    }

    /// Delete terminal operations that finished more than `retention` ago.
    /// Non-terminal operations are never deleted.
    pub async fn cleanup_finished(&self, retention: Duration) -> DispatchResult<u64> {
        let cutoff = self.clock.now() - to_chrono(retention);
        Ok(self.store.delete_finished_before(cutoff).await?)
    }

    fn publish(&self, op: &Operation) {
        self.events.publish(operation_event(op, self.clock.now()));
    }
}

pub(crate) fn operation_event(op: &Operation, timestamp: Timestamp) -> DispatchEvent {
    DispatchEvent::OperationUpdated(OperationUpdate {
        operation_id: op.operation_id,
        owner_user: op.owner_user,
        batch_id: op.batch_id,
        status: op.status,
        progress: op.progress.clone(),
        error: op.error.clone(),
        timestamp,
    })
}
