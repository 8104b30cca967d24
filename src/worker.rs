//! Scheduler worker pool: claims due tasks and dispatches them to the
//! per-kind handlers in [`crate::validator`] and [`crate::coordinator`]
//! (§4.4, §7).
//!
//! `scheduled_tasks` knows nothing about what a `TaskKind` does; this is
//! the dispatch the module doc comment on [`crate::scheduler`] promises.
//! Each of `number_threads` loops claims a small batch, runs every claimed
//! task concurrently, and maps the handler's `Result<bool, _>` onto
//! complete/requeue/requeue-after-error per §4.4.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::app_context::AppContext;
use crate::coordinator;
use crate::scheduler::{Task, TaskKind};
use crate::validator;

/// Batch size claimed per poll, per worker loop.
const CLAIM_BATCH: i64 = 8;
/// How long a loop sleeps after an empty claim before polling again.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

async fn dispatch(ctx: &AppContext, task: &Task) -> Result<bool, TaskDispatchError> {
    match task.kind {
        TaskKind::ValidateTransfer => Ok(validator::validate_transfer(ctx, task.transfer_id).await?),
        TaskKind::SubmitTransferToPrimaryNode => {
            Ok(coordinator::submit_transfer_to_primary_node(ctx, task.transfer_id).await?)
        }
        TaskKind::SubmitTransferOnchain => {
            Ok(coordinator::submit_transfer_onchain(ctx, task.transfer_id).await?)
        }
        TaskKind::ConfirmTransfer => {
            Ok(coordinator::confirm_transfer(ctx, task.transfer_id, task.internal_tx_id).await?)
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum TaskDispatchError {
    #[error(transparent)]
    Validation(#[from] crate::validator::ValidationError),
    #[error(transparent)]
    Coordinator(#[from] coordinator::CoordinatorError),
}

/// Retry interval configured for a given task kind (§7: distinct
/// success-requeue vs error-requeue intervals per kind).
fn retry_interval(ctx: &AppContext, kind: TaskKind) -> Duration {
    match kind {
        TaskKind::ValidateTransfer => ctx.config.tasks.validate_transfer.retry_interval(),
        TaskKind::SubmitTransferToPrimaryNode => {
            ctx.config.tasks.submit_transfer_to_primary_node.retry_interval()
        }
        TaskKind::SubmitTransferOnchain => ctx.config.tasks.submit_transfer_onchain.retry_interval(),
        TaskKind::ConfirmTransfer => ctx.config.tasks.confirm_transfer.retry_interval(),
    }
}

fn retry_interval_after_error(ctx: &AppContext, kind: TaskKind) -> Duration {
    match kind {
        TaskKind::ValidateTransfer => ctx.config.tasks.validate_transfer.retry_interval_after_error(),
        TaskKind::SubmitTransferToPrimaryNode => ctx
            .config
            .tasks
            .submit_transfer_to_primary_node
            .retry_interval_after_error(),
        TaskKind::SubmitTransferOnchain => {
            ctx.config.tasks.submit_transfer_onchain.retry_interval_after_error()
        }
        TaskKind::ConfirmTransfer => ctx.config.tasks.confirm_transfer.retry_interval_after_error(),
    }
}

/// Runs one claimed task to completion against the scheduler: `Ok(true)`
/// completes it, `Ok(false)` requeues after the kind's retry interval,
/// `Err` logs and requeues after the (usually longer) after-error interval.
async fn run_task(ctx: &AppContext, task: Task) {
    match dispatch(ctx, &task).await {
        Ok(true) => {
            if let Err(e) = ctx.scheduler.complete(task.id).await {
                tracing::error!(task_id = %task.id, error = %e, "failed to complete task");
            }
        }
        Ok(false) => {
            let delay = retry_interval(ctx, task.kind);
            if let Err(e) = ctx.scheduler.requeue(task.id, delay).await {
                tracing::error!(task_id = %task.id, error = %e, "failed to requeue task");
            }
        }
        Err(e) => {
            tracing::warn!(
                task_id = %task.id,
                transfer_id = task.transfer_id,
                kind = ?task.kind,
                error = %e,
                "task handler raised, requeueing after error interval"
            );
            let delay = retry_interval_after_error(ctx, task.kind);
            if let Err(e) = ctx.scheduler.requeue(task.id, delay).await {
                tracing::error!(task_id = %task.id, error = %e, "failed to requeue task after error");
            }
        }
    }
}

/// One polling loop: claims a batch, runs every claimed task concurrently,
/// then sleeps briefly if the batch was empty. Runs until `cancellation`
/// fires.
async fn poll_loop(ctx: Arc<AppContext>, cancellation: CancellationToken) {
    loop {
        if cancellation.is_cancelled() {
            return;
        }
        let claimed = tokio::select! {
            _ = cancellation.cancelled() => return,
            result = ctx.scheduler.claim_due(CLAIM_BATCH) => result,
        };
        match claimed {
            Ok(tasks) if tasks.is_empty() => {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }
            }
            Ok(tasks) => {
                let handles: Vec<_> = tasks
                    .into_iter()
                    .map(|task| {
                        let ctx = ctx.clone();
                        tokio::spawn(async move { run_task(&ctx, task).await })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to claim due tasks");
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }
            }
        }
    }
}

/// Spawns `ctx.config.monitor.number_threads` concurrent polling loops and
/// waits for all of them, mirroring the Detector's one-loop-per-unit
/// spawn/join idiom (`crate::detector::run`).
pub async fn run(ctx: Arc<AppContext>, cancellation: CancellationToken) {
    let worker_count = ctx.config.monitor.number_threads.max(1);
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let ctx = ctx.clone();
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(poll_loop(ctx, cancellation)));
    }
    for handle in handles {
        let _ = handle.await;
    }
}
