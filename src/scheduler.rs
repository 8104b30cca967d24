//! Persistent deferred-task queue (§4.4).
//!
//! A `scheduled_tasks` table backed by the same Postgres pool as the Store,
//! claimed with `SELECT ... FOR UPDATE SKIP LOCKED` — the idiomatic
//! Postgres stand-in for Celery's broker-based at-least-once delivery
//! (grounded on `examples/original_source/pantos/validatornode/celery.py`).
//! The queue itself knows nothing about handlers; [`crate::worker`] claims
//! rows and dispatches them to the per-kind handler functions in
//! [`crate::validator`] and [`crate::coordinator`].

use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::config::TaskConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_kind", rename_all = "snake_case")]
pub enum TaskKind {
    ValidateTransfer,
    SubmitTransferToPrimaryNode,
    SubmitTransferOnchain,
    ConfirmTransfer,
}

/// A claimed row from `scheduled_tasks`. Carries `(transfer_id,
/// transfer_snapshot, [internal_tx_id])` per §4.4; the snapshot itself is
/// re-read fresh from the Store by the handler rather than carried in the
/// row, since handlers are idempotent and always want the latest state.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub transfer_id: i64,
    pub internal_tx_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Scheduler {
    pool: PgPool,
}

impl Scheduler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueues a task to run immediately (or after `delay`), returning its
    /// id. Callers persist this id onto the transfer's `task_id` column
    /// themselves via `Store::update_transfer_task_id`, so only the latest
    /// scheduled task per transfer is ever tracked.
    pub async fn schedule(
        &self,
        kind: TaskKind,
        transfer_id: i64,
        internal_tx_id: Option<Uuid>,
        delay: Duration,
    ) -> Result<Uuid, SchedulerError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO scheduled_tasks (id, kind, transfer_id, internal_tx_id, run_at)
             VALUES ($1, $2, $3, $4, now() + $5 * INTERVAL '1 second')",
        )
        .bind(id)
        .bind(kind)
        .bind(transfer_id)
        .bind(internal_tx_id)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn schedule_now(
        &self,
        kind: TaskKind,
        transfer_id: i64,
        internal_tx_id: Option<Uuid>,
    ) -> Result<Uuid, SchedulerError> {
        self.schedule(kind, transfer_id, internal_tx_id, Duration::ZERO)
            .await
    }

    /// Claims up to `limit` due tasks, locking them against concurrent
    /// claimants from other worker processes.
    pub async fn claim_due(&self, limit: i64) -> Result<Vec<Task>, SchedulerError> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<(Uuid, TaskKind, i64, Option<Uuid>)> = sqlx::query_as(
            "SELECT id, kind, transfer_id, internal_tx_id FROM scheduled_tasks
             WHERE run_at <= now()
             ORDER BY run_at
             FOR UPDATE SKIP LOCKED
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        let ids: Vec<Uuid> = rows.iter().map(|(id, ..)| *id).collect();
        if !ids.is_empty() {
            // Push claimed rows out of the window so a second poller
            // (another worker, or this one before the handler finishes)
            // doesn't pick them up again; `complete`/`requeue` delete or
            // re-stamp `run_at` once the handler actually returns.
            sqlx::query("UPDATE scheduled_tasks SET run_at = now() + INTERVAL '5 minutes' WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(rows
            .into_iter()
            .map(|(id, kind, transfer_id, internal_tx_id)| Task {
                id,
                kind,
                transfer_id,
                internal_tx_id,
            })
            .collect())
    }

    /// Handler returned `true`: the task is done, delete the row.
    pub async fn complete(&self, task_id: Uuid) -> Result<(), SchedulerError> {
        sqlx::query("DELETE FROM scheduled_tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Handler returned `false` or raised: requeue after the given
    /// retry interval (the after-error variant for raised errors, §4.4/§7).
    pub async fn requeue(&self, task_id: Uuid, delay: Duration) -> Result<(), SchedulerError> {
        sqlx::query(
            "UPDATE scheduled_tasks SET run_at = now() + $2 * INTERVAL '1 second' WHERE id = $1",
        )
        .bind(task_id)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl TaskConfig {
    pub fn retry_interval(self) -> Duration {
        Duration::from_secs(self.retry_interval_in_seconds)
    }

    pub fn retry_interval_after_error(self) -> Duration {
        Duration::from_secs(self.retry_interval_after_error_in_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_intervals_convert_from_config() {
        let cfg = TaskConfig {
            retry_interval_in_seconds: 30,
            retry_interval_after_error_in_seconds: 120,
        };
        assert_eq!(cfg.retry_interval(), Duration::from_secs(30));
        assert_eq!(cfg.retry_interval_after_error(), Duration::from_secs(120));
    }
}
