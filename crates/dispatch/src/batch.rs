//! Fan-in of sibling operations into one reported outcome.
//!
//! The math lives in [`savesync_core::batch`]; this layer loads members
//! from the store, substitutes failed placeholders for vanished ids,
//! enforces owner scoping, and keeps a per-batch high-water mark so the
//! reported percentage never moves backwards while a batch is running.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use savesync_core::batch::{summarize, BatchMember, BatchSummary};
use savesync_core::error::CoreError;
use savesync_core::types::{BatchId, OperationId, UserId};
use savesync_db::models::operation::Operation;
use savesync_db::OperationStore;

use crate::error::{DispatchError, DispatchResult};

/// Maximum number of ids accepted by [`BatchAggregator::summarize_operations`].
pub const MAX_AGGREGATE_IDS: usize = 256;

/// Upper bound on tracked high-water marks. Aggregates that are never read
/// again after finishing would otherwise accumulate; past the bound the
/// table is reset.
const MAX_TRACKED: usize = 4096;

/// Identity of an aggregated set for high-water tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AggregateKey {
    Batch(BatchId),
    /// Explicit id list, sorted.
    Ids(Vec<OperationId>),
}

pub struct BatchAggregator {
    store: Arc<dyn OperationStore>,
    high_water: Mutex<HashMap<AggregateKey, f64>>,
}

impl BatchAggregator {
    pub fn new(store: Arc<dyn OperationStore>) -> Self {
        Self {
            store,
            high_water: Mutex::new(HashMap::new()),
        }
    }

    /// Summarize every operation sharing `batch_id`.
    ///
    /// With `viewer` set, a batch containing another user's operation is
    /// rejected.
    pub async fn summarize_batch(
        &self,
        batch_id: BatchId,
        viewer: Option<UserId>,
    ) -> DispatchResult<BatchSummary> {
        let ops = self.store.list_by_batch(batch_id).await?;
        if ops.is_empty() {
            return Err(DispatchError::BatchNotFound(batch_id));
        }
        check_owner(&ops, viewer)?;

        let members = ops.into_iter().map(member_of).collect();
        Ok(self.finish(AggregateKey::Batch(batch_id), members))
    }

    /// Summarize an explicit id list. Ids missing from the store count as
    /// failed members; duplicates are counted once.
    ///
    /// The limit applies to the list as sent, duplicates included.
    pub async fn summarize_operations(
        &self,
        ids: &[OperationId],
        viewer: Option<UserId>,
    ) -> DispatchResult<BatchSummary> {
        if ids.is_empty() {
            return Err(CoreError::Validation("operation_ids must not be empty".to_string()).into());
        }
        if ids.len() > MAX_AGGREGATE_IDS {
            return Err(CoreError::Validation(format!(
                "at most {MAX_AGGREGATE_IDS} operation ids may be aggregated"
            ))
            .into());
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<OperationId> = ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let found = self.store.find_operations(&unique).await?;
        check_owner(&found, viewer)?;

        let mut by_id: HashMap<OperationId, Operation> =
            found.into_iter().map(|op| (op.operation_id, op)).collect();
        let members = unique
            .iter()
            .map(|id| match by_id.remove(id) {
                Some(op) => member_of(op),
                None => BatchMember::missing(*id),
            })
            .collect();

        let mut key = unique;
        key.sort();
        Ok(self.finish(AggregateKey::Ids(key), members))
    }

    /// Number of aggregates currently tracked for monotonicity.
    pub fn tracked(&self) -> usize {
        self.high_water
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn finish(&self, key: AggregateKey, members: Vec<BatchMember>) -> BatchSummary {
        let mut summary = summarize(members);
        let mut high_water = self.high_water.lock().unwrap_or_else(|e| e.into_inner());

        if summary.status.is_terminal() {
            high_water.remove(&key);
            return summary;
        }

        if high_water.len() >= MAX_TRACKED && !high_water.contains_key(&key) {
            tracing::warn!(tracked = high_water.len(), "Resetting batch high-water marks");
            high_water.clear();
        }
        let floor = high_water.get(&key).copied().unwrap_or(0.0);
        summary.percentage = summary.percentage.max(floor).clamp(0.0, 100.0);
        high_water.insert(key, summary.percentage);
        summary
    }
}

fn member_of(op: Operation) -> BatchMember {
    BatchMember {
        operation_id: op.operation_id,
        status: op.status,
        progress: op.progress,
        error: op.error,
    }
}

fn check_owner(ops: &[Operation], viewer: Option<UserId>) -> Result<(), CoreError> {
    let Some(viewer) = viewer else {
        return Ok(());
    };
    if ops.iter().any(|op| op.owner_user != viewer) {
        return Err(CoreError::Forbidden(
            "Aggregate includes operations owned by another user".to_string(),
        ));
    }
    Ok(())
}
