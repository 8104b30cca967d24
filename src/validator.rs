//! Per-transfer validation state machine (§4.6.1).
//!
//! `validate_transfer` replaces the original's nested private exceptions
//! with the `ValidationOutcome` sum type called for in §9's re-architecture
//! notes: `{Transient, PermanentReversal, PermanentInvalid, Ok}`. The
//! scheduler-facing `validate_transfer` function maps that outcome onto the
//! `true`/`false`/`Err` contract every task handler shares (§4.4).

use alloy_primitives::Address;

use crate::app_context::AppContext;
use crate::chain::{ChainAdapter, ChainAdapterError, SourceTransactionStatus};
use crate::contracts::{self, ContractResolutionError};
use crate::domain::{ChainId, NodeMode, Transfer, TransferStatus};
use crate::scheduler::TaskKind;
use crate::store::{self, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainAdapterError),
    #[error(transparent)]
    Contract(#[from] ContractResolutionError),
    #[error("chain {0} has no configured adapter")]
    UnknownChain(ChainId),
    #[error(
        "stored transfer {0} does not byte-match any TransferFromSucceeded event in its source transaction"
    )]
    EventNotFound(i64),
    #[error("address {0} is not a valid EVM address")]
    InvalidAddress(String),
}

/// The outcome of one pass of the validation checks in §4.6.1, independent
/// of how it gets persisted or scheduled.
enum ValidationOutcome {
    /// Source tx not yet confirmed; caller should retry later.
    Transient,
    /// Source tx reverted, or source token inactive: terminal, no further
    /// scheduling.
    PermanentTerminal(TransferStatus),
    /// Destination feasibility failed: becomes a reversal transfer, routed
    /// back to the sender on the source chain.
    PermanentReversal,
    /// All checks passed on the original forward path.
    Ok,
}

/// Scheduler-facing handler for [`TaskKind::ValidateTransfer`]. Returns
/// `Ok(true)` when the transfer reached a terminal or next-stage state,
/// `Ok(false)` when the caller should retry after the configured interval,
/// and `Err` for conditions the scheduler should log and retry after the
/// after-error interval (§4.4, §7).
pub async fn validate_transfer(
    ctx: &AppContext,
    transfer_id: i64,
) -> Result<bool, ValidationError> {
    let transfer = ctx.store.read_transfer(transfer_id).await?;

    let outcome = run_checks(ctx, &transfer).await?;

    match outcome {
        ValidationOutcome::Transient => Ok(false),
        ValidationOutcome::PermanentTerminal(status) => {
            ctx.store.update_transfer_status(transfer_id, status).await?;
            Ok(true)
        }
        ValidationOutcome::PermanentReversal => {
            let source_hub_contract =
                contracts::resolve_hub_contract(&ctx.store, &ctx.config, transfer.source_chain)
                    .await?;
            let source_forwarder_contract = contracts::resolve_forwarder_contract(
                &ctx.store,
                &ctx.config,
                transfer.source_chain,
            )
            .await?;
            ctx.store
                .update_reversal_transfer(transfer_id, source_hub_contract, source_forwarder_contract)
                .await?;
            schedule_next_stage(ctx, transfer_id).await?;
            Ok(true)
        }
        ValidationOutcome::Ok => {
            schedule_next_stage(ctx, transfer_id).await?;
            Ok(true)
        }
    }
}

/// Schedules `submit_transfer_onchain` if this node is primary, else
/// `submit_transfer_to_primary_node` (§4.6.1 step 6).
async fn schedule_next_stage(ctx: &AppContext, transfer_id: i64) -> Result<(), ValidationError> {
    let kind = match ctx.mode() {
        NodeMode::Primary => TaskKind::SubmitTransferOnchain,
        NodeMode::Secondary => TaskKind::SubmitTransferToPrimaryNode,
    };
    let task_id = ctx.scheduler.schedule_now(kind, transfer_id, None).await?;
    ctx.store.update_transfer_task_id(transfer_id, task_id).await?;
    Ok(())
}

async fn run_checks(
    ctx: &AppContext,
    transfer: &Transfer,
) -> Result<ValidationOutcome, ValidationError> {
    let source_adapter = ctx
        .chain(transfer.source_chain)
        .ok_or(ValidationError::UnknownChain(transfer.source_chain))?
        .clone();

    // Step 1: source tx status.
    match source_adapter
        .get_transaction_status(&transfer.source_transaction_id)
        .await?
    {
        SourceTransactionStatus::Unincluded | SourceTransactionStatus::Unconfirmed => {
            return Ok(ValidationOutcome::Transient);
        }
        SourceTransactionStatus::Reverted => {
            return Ok(ValidationOutcome::PermanentTerminal(
                TransferStatus::SourceTransactionReverted,
            ));
        }
        SourceTransactionStatus::Confirmed => {}
    }

    // Step 2: re-read events in the source transaction and reconcile.
    let hub_address = resolve_hub_address(ctx, transfer.source_hub_contract).await?;
    let events = source_adapter
        .read_outgoing_transfers_in_transaction(&transfer.source_transaction_id, hub_address)
        .await?;
    let mut matched = None;
    for event in &events {
        if store::transfer_matches_event(&ctx.store, transfer, event).await? {
            matched = Some(event);
            break;
        }
    }
    let matched = matched.ok_or(ValidationError::EventNotFound(transfer.id))?;
    if matched.source_transfer_id != transfer.source_transfer_id
        || matched.source_block_number != transfer.source_block_number
    {
        ctx.store
            .update_transfer_source_transaction(
                transfer.id,
                matched.source_transfer_id,
                matched.source_block_number,
                &matched.source_block_hash,
            )
            .await?;
    }

    // Step 3: source token active.
    let source_token_address = parse_address(&matched.source_token_address.0)?;
    if !source_adapter.is_token_active(source_token_address).await? {
        return Ok(ValidationOutcome::PermanentTerminal(
            TransferStatus::SourceTransactionInvalid,
        ));
    }

    // Step 4: destination feasibility.
    if !destination_feasible(ctx, transfer).await? {
        return Ok(ValidationOutcome::PermanentReversal);
    }

    Ok(ValidationOutcome::Ok)
}

async fn resolve_hub_address(
    ctx: &AppContext,
    hub_contract_id: i64,
) -> Result<Address, ValidationError> {
    let address = ctx
        .store
        .read_contract_address(crate::domain::ContractKind::Hub, hub_contract_id)
        .await?;
    parse_address(address.as_str())
}

fn parse_address(s: &str) -> Result<Address, ValidationError> {
    s.parse()
        .map_err(|_| ValidationError::InvalidAddress(s.to_string()))
}

/// Destination feasibility checks (§4.6.1 step 4): recipient valid,
/// destination token active, symmetric cross-chain token mapping, and
/// matching decimals. Any failure routes the transfer to the reversal
/// path instead of propagating an error.
async fn destination_feasible(
    ctx: &AppContext,
    transfer: &Transfer,
) -> Result<bool, ValidationError> {
    let destination_adapter = ctx
        .chain(transfer.destination_chain)
        .ok_or(ValidationError::UnknownChain(transfer.destination_chain))?
        .clone();
    let source_adapter = ctx
        .chain(transfer.source_chain)
        .ok_or(ValidationError::UnknownChain(transfer.source_chain))?
        .clone();

    if !destination_adapter.is_valid_recipient_address(transfer.recipient_address.as_str()) {
        return Ok(false);
    }

    let source_token_address = ctx
        .store
        .read_contract_address(crate::domain::ContractKind::Token, transfer.source_token)
        .await?;
    let source_token_evm = parse_address(source_token_address.as_str())?;

    let Some(destination_token_evm) = source_adapter
        .read_external_token_address(source_token_evm, transfer.destination_chain)
        .await?
    else {
        return Ok(false);
    };

    if !destination_adapter.is_token_active(destination_token_evm).await? {
        return Ok(false);
    }

    // Symmetric mapping: the destination token must point back to the
    // same source token.
    let Some(mapped_back) = destination_adapter
        .read_external_token_address(destination_token_evm, transfer.source_chain)
        .await?
    else {
        return Ok(false);
    };
    if !destination_adapter.is_equal_address(
        &mapped_back.to_string(),
        &source_token_evm.to_string(),
    ) {
        return Ok(false);
    }

    let source_decimals = source_adapter.read_token_decimals(source_token_evm).await?;
    let destination_decimals = destination_adapter
        .read_token_decimals(destination_token_evm)
        .await?;
    if source_decimals != destination_decimals {
        return Ok(false);
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_evm_address() {
        let addr = parse_address("0x0000000000000000000000000000000000000001").unwrap();
        assert_eq!(addr, Address::with_last_byte(1));
    }

    #[test]
    fn rejects_malformed_address() {
        assert!(parse_address("not-an-address").is_err());
    }
}
