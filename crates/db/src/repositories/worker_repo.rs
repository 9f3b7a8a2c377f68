//! Repository for the `workers` table.

use sqlx::PgPool;
use savesync_core::types::{ClientId, Timestamp, UserId};

use crate::models::worker::Worker;
use crate::store::ClaimOutcome;

/// Column list for `workers` queries.
const COLUMNS: &str = "client_id, claimed, linked_user, claimed_at, last_ping_at, first_seen_at";

/// PostgreSQL unique-violation error code.
const UNIQUE_VIOLATION: &str = "23505";

/// Partial unique index enforcing one claimed worker per user.
const LINKED_USER_CONSTRAINT: &str = "uq_workers_linked_user";

/// Provides presence and claim operations for workers.
pub struct WorkerRepo;

impl WorkerRepo {
    // ── Presence ─────────────────────────────────────────────────────────

    /// Insert an unseen worker or touch `last_ping_at` of a known one.
    /// Claim columns are left alone on conflict.
    pub async fn upsert_heartbeat(
        pool: &PgPool,
        client_id: &str,
        now: Timestamp,
    ) -> Result<Worker, sqlx::Error> {
        let query = format!(
            "INSERT INTO workers (client_id, last_ping_at, first_seen_at) \
             VALUES ($1, $2, $2) \
             ON CONFLICT (client_id) DO UPDATE SET last_ping_at = EXCLUDED.last_ping_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(client_id)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_client_id(
        pool: &PgPool,
        client_id: &str,
    ) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers WHERE client_id = $1");
        sqlx::query_as::<_, Worker>(&query)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// List all workers ordered by client id.
    pub async fn list(pool: &PgPool) -> Result<Vec<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers ORDER BY client_id ASC");
        sqlx::query_as::<_, Worker>(&query).fetch_all(pool).await
    }

    pub async fn find_claimed_by(
        pool: &PgPool,
        user: UserId,
    ) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers WHERE claimed AND linked_user = $1");
        sqlx::query_as::<_, Worker>(&query)
            .bind(user)
            .fetch_optional(pool)
            .await
    }

    // ── Claims ───────────────────────────────────────────────────────────

    /// Bind a worker to a user.
    ///
    /// The target row is locked with `FOR UPDATE` so concurrent claims of
    /// the same worker serialize; concurrent claims of different workers by
    /// the same user are caught by `uq_workers_linked_user`.
    pub async fn try_claim(
        pool: &PgPool,
        client_id: &str,
        user: UserId,
        seen_after: Timestamp,
        now: Timestamp,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let select = format!("SELECT {COLUMNS} FROM workers WHERE client_id = $1 FOR UPDATE");
        let Some(current) = sqlx::query_as::<_, Worker>(&select)
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(ClaimOutcome::NotFound);
        };

        if current.claimed {
            return Ok(ClaimOutcome::AlreadyClaimed(current));
        }
        if current.last_ping_at <= seen_after {
            return Ok(ClaimOutcome::Offline(current));
        }

        let update = format!(
            "UPDATE workers SET claimed = true, linked_user = $2, claimed_at = $3 \
             WHERE client_id = $1 \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Worker>(&update)
            .bind(client_id)
            .bind(user)
            .bind(now)
            .fetch_one(&mut *tx)
            .await;

        match claimed {
            Ok(worker) => {
                tx.commit().await?;
                Ok(ClaimOutcome::Claimed(worker))
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                    && db_err.constraint() == Some(LINKED_USER_CONSTRAINT) =>
            {
                tx.rollback().await?;
                match Self::find_claimed_by(pool, user).await? {
                    Some(other) => Ok(ClaimOutcome::UserHasWorker(other)),
                    // The other claim vanished in between; report the
                    // target as contended rather than retrying.
                    None => Ok(ClaimOutcome::AlreadyClaimed(current)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Clear the claim on one worker.
    pub async fn release(pool: &PgPool, client_id: &str) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!(
            "UPDATE workers SET claimed = false, linked_user = NULL, claimed_at = NULL \
             WHERE client_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// Clear the claim on one worker only while it is linked to `user`.
    /// `None` when no row matched.
    pub async fn release_if_linked(
        pool: &PgPool,
        client_id: &str,
        user: UserId,
    ) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!(
            "UPDATE workers SET claimed = false, linked_user = NULL, claimed_at = NULL \
             WHERE client_id = $1 AND claimed AND linked_user = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(client_id)
            .bind(user)
            .fetch_optional(pool)
            .await
    }

    /// Clear claims on workers whose last heartbeat predates `seen_before`.
    pub async fn release_idle(
        pool: &PgPool,
        seen_before: Timestamp,
    ) -> Result<Vec<Worker>, sqlx::Error> {
        let query = format!(
            "UPDATE workers SET claimed = false, linked_user = NULL, claimed_at = NULL \
             WHERE claimed AND last_ping_at < $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(seen_before)
            .fetch_all(pool)
            .await
    }

    /// Delete unclaimed workers whose last heartbeat predates `seen_before`.
    pub async fn evict_idle(
        pool: &PgPool,
        seen_before: Timestamp,
    ) -> Result<Vec<ClientId>, sqlx::Error> {
        sqlx::query_scalar::<_, ClientId>(
            "DELETE FROM workers WHERE NOT claimed AND last_ping_at < $1 \
             RETURNING client_id",
        )
        .bind(seen_before)
        .fetch_all(pool)
        .await
    }
}
