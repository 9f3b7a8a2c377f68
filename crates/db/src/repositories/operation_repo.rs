//! Repository for the `operations` table.

use sqlx::PgPool;
use savesync_core::operation::{OperationKind, OperationStatus, Progress, StatusId, TIMEOUT_ERROR};
use savesync_core::types::{BatchId, OperationId, Timestamp, UserId};

use crate::models::operation::{NewOperation, Operation, OperationChange, OperationRow};
use crate::store::StoreError;

/// Column list for `operations` queries. `seq` is ordering-only and never selected.
const COLUMNS: &str = "id, kind, status_id, progress_current, progress_total, progress_message, \
    target_client_id, owner_user, batch_id, payload, created_at, updated_at, \
    started_at, completed_at, error";

/// Status ids an operation can still move out of.
const ACTIVE_STATUS_IDS: [StatusId; 2] = [
    OperationStatus::Pending as StatusId,
    OperationStatus::InProgress as StatusId,
];

/// Provides CRUD and conditional-update operations for dispatched work.
pub struct OperationRepo;

impl OperationRepo {
    /// Insert a set of pending operations in one transaction.
    pub async fn insert_all(
        pool: &PgPool,
        ops: &[NewOperation],
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO operations \
                (id, kind, status_id, target_client_id, owner_user, batch_id, payload, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(ops.len());
        for op in ops {
            let row = sqlx::query_as::<_, OperationRow>(&query)
                .bind(op.operation_id)
                .bind(op.kind.as_str())
                .bind(OperationStatus::Pending.id())
                .bind(&op.target_client_id)
                .bind(op.owner_user)
                .bind(op.batch_id)
                .bind(&op.payload)
                .bind(op.created_at)
                .fetch_one(&mut *tx)
                .await?;
            rows.push(row);
        }
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: OperationId,
    ) -> Result<Option<OperationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM operations WHERE id = $1");
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_many(
        pool: &PgPool,
        ids: &[OperationId],
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM operations WHERE id = ANY($1) ORDER BY seq");
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Pending operations for one worker in FIFO order.
    pub async fn list_pending_for(
        pool: &PgPool,
        client_id: &str,
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM operations \
             WHERE target_client_id = $1 AND status_id = $2 \
             ORDER BY seq ASC"
        );
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(client_id)
            .bind(OperationStatus::Pending.id())
            .fetch_all(pool)
            .await
    }

    pub async fn list_by_batch(
        pool: &PgPool,
        batch_id: BatchId,
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM operations WHERE batch_id = $1 ORDER BY seq ASC");
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_by_owner(
        pool: &PgPool,
        owner: UserId,
        limit: i64,
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM operations WHERE owner_user = $1 ORDER BY seq DESC LIMIT $2"
        );
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(owner)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Non-terminal operations whose last activity predates `inactive_since`.
    pub async fn list_stale(
        pool: &PgPool,
        inactive_since: Timestamp,
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM operations \
             WHERE status_id = ANY($1) AND updated_at < $2 \
             ORDER BY seq ASC"
        );
        sqlx::query_as::<_, OperationRow>(&query)
            .bind(&ACTIVE_STATUS_IDS[..])
            .bind(inactive_since)
            .fetch_all(pool)
            .await
    }

    /// Apply `change` in a single conditional `UPDATE`.
    ///
    /// Returns `None` when no row matched, either because the operation does
    /// not exist or because its status was not eligible.
    pub async fn apply_change(
        pool: &PgPool,
        id: OperationId,
        change: &OperationChange,
    ) -> Result<Option<OperationRow>, sqlx::Error> {
        let allowed: Vec<StatusId> = change.allowed_from().iter().map(|s| s.id()).collect();
        let target = change.target_status().id();

        match change {
            OperationChange::Start { at } | OperationChange::Complete { at } => {
                let stamp_column = if matches!(change, OperationChange::Start { .. }) {
                    "started_at"
                } else {
                    "completed_at"
                };
                let query = format!(
                    "UPDATE operations SET status_id = $3, {stamp_column} = $4, updated_at = $4 \
                     WHERE id = $1 AND status_id = ANY($2) \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, OperationRow>(&query)
                    .bind(id)
                    .bind(&allowed)
                    .bind(target)
                    .bind(at)
                    .fetch_optional(pool)
                    .await
            }
            OperationChange::Progress { progress, at } => {
                let query = format!(
                    "UPDATE operations SET progress_current = $3, progress_total = $4, \
                        progress_message = $5, updated_at = $6 \
                     WHERE id = $1 AND status_id = ANY($2) \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, OperationRow>(&query)
                    .bind(id)
                    .bind(&allowed)
                    .bind(progress.current)
                    .bind(progress.total)
                    .bind(&progress.message)
                    .bind(at)
                    .fetch_optional(pool)
                    .await
            }
            OperationChange::Fail { error, at } => {
                let query = format!(
                    "UPDATE operations SET status_id = $3, error = $4, completed_at = $5, \
                        updated_at = $5 \
                     WHERE id = $1 AND status_id = ANY($2) \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, OperationRow>(&query)
                    .bind(id)
                    .bind(&allowed)
                    .bind(target)
                    .bind(error)
                    .bind(at)
                    .fetch_optional(pool)
                    .await
            }
            OperationChange::Timeout { inactive_since, at } => {
                let query = format!(
                    "UPDATE operations SET status_id = $3, error = $4, completed_at = $5, \
                        updated_at = $5 \
                     WHERE id = $1 AND status_id = ANY($2) AND updated_at < $6 \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, OperationRow>(&query)
                    .bind(id)
                    .bind(&allowed)
                    .bind(target)
                    .bind(TIMEOUT_ERROR)
                    .bind(at)
                    .bind(inactive_since)
                    .fetch_optional(pool)
                    .await
            }
        }
    }

    /// Delete terminal operations completed before `cutoff`.
    pub async fn delete_finished_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM operations WHERE NOT (status_id = ANY($1)) AND completed_at < $2",
        )
        .bind(&ACTIVE_STATUS_IDS[..])
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

impl TryFrom<OperationRow> for Operation {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let status = OperationStatus::from_id(row.status_id).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "operation {} has unknown status id {}",
                row.id, row.status_id
            ))
        })?;
        let kind: OperationKind = row.kind.parse().map_err(|e| {
            StoreError::Corrupt(format!("operation {} has invalid kind: {e}", row.id))
        })?;
        let progress = match (row.progress_current, row.progress_total) {
            (Some(current), Some(total)) => Some(Progress {
                current,
                total,
                message: row.progress_message.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            operation_id: row.id,
            kind,
            status,
            progress,
            target_client_id: row.target_client_id,
            owner_user: row.owner_user,
            batch_id: row.batch_id,
            payload: row.payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
        })
    }
}
