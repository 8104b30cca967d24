//! Detector: scans each active chain's Hub for `TransferFromSucceeded`
//! events and turns unseen ones into [`Transfer`](crate::domain::Transfer)
//! rows (§4.5).
//!
//! One polling loop per chain, bounded by a shared semaphore of size
//! `max(1, number_threads - 1)` so the Detector never starves the
//! Scheduler worker pool for the single shared connection pool. The
//! teacher has no equivalent background loop (`x402-rs` is pure
//! request/response), so the interval/cancellation plumbing here follows
//! the same `tokio::select!` + `CancellationToken` idiom its
//! [`crate::sig_down::SigDown`] already uses for graceful shutdown.

use std::cmp::max;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::app_context::AppContext;
use crate::chain::ChainAdapterError;
use crate::contracts::{self, ContractResolutionError};
use crate::domain::{ChainId, CrossChainTransfer};
use crate::scheduler::{SchedulerError, TaskKind};
use crate::store::{CreateTransferRequest, StoreError, draw_validator_nonce};

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainAdapterError),
    #[error(transparent)]
    Contract(#[from] ContractResolutionError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("chain {0} has no configured adapter")]
    UnknownChain(ChainId),
    #[error("blockchain {chain}: block number went backwards (from={from}, to={to})")]
    BlockNumberWentBackwards { chain: ChainId, from: i64, to: i64 },
}

/// Runs one polling cycle for `chain_id` (§4.5 steps 1-6).
pub async fn run_once(ctx: &AppContext, chain_id: ChainId) -> Result<(), DetectorError> {
    let adapter = ctx
        .chain(chain_id)
        .ok_or(DetectorError::UnknownChain(chain_id))?
        .clone();
    let (_, chain_config) = ctx
        .config
        .chain_by_id(chain_id)
        .ok_or(DetectorError::UnknownChain(chain_id))?;

    let last = ctx.store.read_blockchain_last_block(chain_id).await?;
    let from = max(
        last - chain_config.confirmations as i64,
        chain_config.from_block,
    );

    let (events, to) = adapter.read_outgoing_transfers_from_block(from).await?;

    if from - 1 == to {
        // Nothing past the last scanned block yet.
        return Ok(());
    }
    if from > to {
        return Err(DetectorError::BlockNumberWentBackwards {
            chain: chain_id,
            from,
            to,
        });
    }

    for event in &events {
        if ctx
            .store
            .read_transfer_id(event.source_chain, &event.source_transaction_id)
            .await?
            .is_some()
        {
            continue;
        }
        process_event(ctx, event).await?;
    }

    ctx.store.update_blockchain_last_block(chain_id, to).await?;
    Ok(())
}

/// Draws and validates a `validator_nonce`, persists the transfer
/// (redrawing on a nonce collision), and schedules its first
/// `validate_transfer` task (§4.5 step 5).
async fn process_event(ctx: &AppContext, event: &CrossChainTransfer) -> Result<(), DetectorError> {
    let destination_adapter = ctx
        .chain(event.destination_chain)
        .ok_or(DetectorError::UnknownChain(event.destination_chain))?
        .clone();

    let source_hub_contract =
        contracts::resolve_hub_contract(&ctx.store, &ctx.config, event.source_chain).await?;
    let destination_forwarder_contract =
        contracts::resolve_forwarder_contract(&ctx.store, &ctx.config, event.destination_chain)
            .await?;
    let source_token =
        contracts::resolve_token_contract(&ctx.store, event.source_chain, &event.source_token_address)
            .await?;
    let destination_token = contracts::resolve_token_contract(
        &ctx.store,
        event.destination_chain,
        &event.destination_token_address,
    )
    .await?;

    loop {
        let validator_nonce = draw_validator_nonce();
        if !destination_adapter
            .is_valid_validator_nonce(validator_nonce)
            .await?
        {
            continue;
        }

        let request = CreateTransferRequest {
            source_chain: event.source_chain,
            destination_chain: event.destination_chain,
            sender_address: event.sender_address.clone(),
            recipient_address: event.recipient_address.clone(),
            source_token,
            destination_token,
            amount: event.amount,
            validator_nonce,
            source_hub_contract,
            destination_forwarder_contract,
            source_transfer_id: event.source_transfer_id,
            source_transaction_id: event.source_transaction_id.clone(),
            source_block_number: event.source_block_number,
            source_block_hash: event.source_block_hash.clone(),
        };

        match ctx.store.create_transfer(&request).await {
            Ok(transfer_id) => {
                let task_id = ctx
                    .scheduler
                    .schedule_now(TaskKind::ValidateTransfer, transfer_id, None)
                    .await?;
                ctx.store.update_transfer_task_id(transfer_id, task_id).await?;
                return Ok(());
            }
            Err(StoreError::ValidatorNonceNotUnique) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Spawns one polling loop per active chain, each ticking every
/// `monitor.interval` seconds, sharing a semaphore of size
/// `max(1, number_threads - 1)` across all chains. Runs until
/// `cancellation` fires.
pub async fn run(ctx: Arc<AppContext>, cancellation: CancellationToken) {
    let interval = Duration::from_secs(ctx.config.monitor.interval);
    let permits = max(1, ctx.config.monitor.number_threads.saturating_sub(1));
    let semaphore = Arc::new(Semaphore::new(permits));

    let chain_ids: Vec<ChainId> = ctx.chains().map(|(id, _)| *id).collect();
    let mut handles = Vec::with_capacity(chain_ids.len());

    for chain_id in chain_ids {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        let _permit = semaphore.acquire().await.expect("semaphore never closed");
                        if let Err(e) = run_once(&ctx, chain_id).await {
                            tracing::error!(chain = chain_id.0, error = %e, "detector cycle failed");
                        }
                    }
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}
