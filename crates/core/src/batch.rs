//! Batch aggregation math.
//!
//! One user action (e.g. "save game with 3 save paths") fans out into
//! several sibling operations. These functions fold the members back into
//! one percentage and one outcome. Monotonicity across successive reads is
//! enforced by the stateful aggregator in `savesync-dispatch`; everything
//! here is a pure function of the current member states.

use serde::Serialize;

use crate::operation::{OperationStatus, Progress, MISSING_ERROR, TIMEOUT_ERROR};
use crate::types::OperationId;

/// One member of a batch as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchMember {
    pub operation_id: OperationId,
    pub status: OperationStatus,
    pub progress: Option<Progress>,
    pub error: Option<String>,
}

impl BatchMember {
    /// A member whose operation vanished from the store. Counted as
    /// terminal-failed so a batch never blocks on it.
    pub fn missing(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            status: OperationStatus::Failed,
            progress: None,
            error: Some(MISSING_ERROR.to_string()),
        }
    }
}

/// Aggregate status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// At least one member is not terminal yet.
    InProgress,
    /// Every member completed.
    Success,
    /// Some members completed, some failed.
    Partial,
    /// Every member failed.
    Failure,
    /// Every member failed and every failure was a watchdog timeout.
    Timeout,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Aggregated view of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub percentage: f64,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub members: Vec<BatchMember>,
}

/// Fold member states into a summary.
pub fn summarize(members: Vec<BatchMember>) -> BatchSummary {
    let count = |status: OperationStatus| members.iter().filter(|m| m.status == status).count();

    BatchSummary {
        status: outcome(&members),
        percentage: percentage(&members),
        total: members.len(),
        pending: count(OperationStatus::Pending),
        in_progress: count(OperationStatus::InProgress),
        completed: count(OperationStatus::Completed),
        failed: count(OperationStatus::Failed),
        members,
    }
}

/// Aggregate outcome. Only decided once every member is terminal.
pub fn outcome(members: &[BatchMember]) -> BatchStatus {
    if members.iter().any(|m| !m.status.is_terminal()) {
        return BatchStatus::InProgress;
    }

    let completed = members
        .iter()
        .filter(|m| m.status == OperationStatus::Completed)
        .count();
    let failed = members.len() - completed;

    match (completed, failed) {
        (c, 0) if c > 0 => BatchStatus::Success,
        (c, f) if c > 0 && f > 0 => BatchStatus::Partial,
        (_, f) if f > 0 && members.iter().all(is_timeout) => BatchStatus::Timeout,
        _ => BatchStatus::Failure,
    }
}

/// Aggregate percentage in `0.0..=100.0`.
///
/// - Every member terminal: 100.
/// - Every member carries progress with a positive total:
///   `sum(current) / sum(total)`, completed members counting as fully
///   transferred and each member's `current` clamped to its `total`.
/// - Otherwise: `completed / total_members`.
pub fn percentage(members: &[BatchMember]) -> f64 {
    if members.iter().all(|m| m.status.is_terminal()) {
        return 100.0;
    }

    let numeric = members.iter().try_fold((0_i64, 0_i64), |(done, total), m| {
        let progress = m.progress.as_ref().filter(|p| p.total > 0)?;
        let current = if m.status == OperationStatus::Completed {
            progress.total
        } else {
            progress.current.min(progress.total)
        };
        Some((done.saturating_add(current), total.saturating_add(progress.total)))
    });

    let pct = match numeric {
        Some((done, total)) => done as f64 / total as f64 * 100.0,
        None => {
            let completed = members
                .iter()
                .filter(|m| m.status == OperationStatus::Completed)
                .count();
            completed as f64 / members.len() as f64 * 100.0
        }
    };

    pct.clamp(0.0, 100.0)
}

fn is_timeout(member: &BatchMember) -> bool {
    member.status == OperationStatus::Failed && member.error.as_deref() == Some(TIMEOUT_ERROR)
}
