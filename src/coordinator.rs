//! The Coordinator: turns a validated transfer into a signed, on-chain
//! `transferTo` submission (§4.6.2–§4.6.4).
//!
//! Secondary nodes only ever sign and forward to the primary
//! ([`submit_transfer_to_primary_node`]); the primary collects signatures,
//! assembles the quorum, and drives the actual chain submission
//! ([`submit_transfer_onchain`], [`confirm_transfer`]). Both submission
//! handlers open with a role-flip guard, since [`AppContext::mode`] can
//! change between when a task was scheduled and when it runs.

use alloy_primitives::Address;
use uuid::Uuid;

use crate::app_context::AppContext;
use crate::chain::{ChainAdapter, ChainAdapterError, SubmissionStatus, TransferToSubmission};
use crate::contracts::{self, ContractResolutionError};
use crate::domain::{BlockchainAddress, ChainId, ContractKind, NodeMode, Transfer, TransferStatus};
use crate::eip712::{self, TransferToMessageInput};
use crate::primary_client::PrimaryClientError;
use crate::scheduler::{SchedulerError, TaskKind};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainAdapterError),
    #[error(transparent)]
    Contract(#[from] ContractResolutionError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    PrimaryClient(#[from] PrimaryClientError),
    #[error("chain {0} has no configured adapter")]
    UnknownChain(ChainId),
    #[error("address {0} is not a valid EVM address")]
    InvalidAddress(String),
    #[error(
        "this validator's signing address is not registered on the destination Forwarder"
    )]
    UnregisteredSigner,
    #[error("confirm_transfer scheduled for transfer {0} without a submission handle")]
    MissingSubmissionHandle(i64),
}

fn parse_address(s: &str) -> Result<Address, CoordinatorError> {
    s.parse()
        .map_err(|_| CoordinatorError::InvalidAddress(s.to_string()))
}

async fn reschedule(
    ctx: &AppContext,
    transfer_id: i64,
    kind: TaskKind,
) -> Result<(), CoordinatorError> {
    let task_id = ctx.scheduler.schedule_now(kind, transfer_id, None).await?;
    ctx.store.update_transfer_task_id(transfer_id, task_id).await?;
    Ok(())
}

/// Builds the EIP-712 message input for `transfer`, resolving destination
/// Hub/Forwarder/pan-token from config and the destination token contract
/// address from the Store. Uses [`Transfer::eventual_destination_chain`]
/// throughout so a reversal signs against the source chain's contracts.
pub(crate) async fn build_message_input(
    ctx: &AppContext,
    transfer: &Transfer,
) -> Result<TransferToMessageInput, CoordinatorError> {
    let destination_chain = transfer.eventual_destination_chain();
    let (_, chain_config) = ctx
        .config
        .chain_by_id(destination_chain)
        .ok_or(CoordinatorError::UnknownChain(destination_chain))?;

    let destination_hub = parse_address(&chain_config.hub)?;
    let destination_forwarder = parse_address(&chain_config.forwarder)?;
    let destination_token_contract = parse_address(&chain_config.pan_token)?;

    let source_token_address = ctx
        .store
        .read_contract_address(ContractKind::Token, transfer.source_token)
        .await?;
    let destination_token_address = ctx
        .store
        .read_contract_address(ContractKind::Token, transfer.eventual_destination_token())
        .await?;
    let destination_token = parse_address(destination_token_address.as_str())?;
    let recipient = parse_address(transfer.eventual_recipient_address().as_str())?;

    Ok(eip712::message_input_for_transfer(
        transfer,
        transfer.sender_address.as_str().to_string(),
        recipient,
        source_token_address.as_str().to_string(),
        destination_token,
        destination_hub,
        destination_forwarder,
        destination_token_contract,
    ))
}

/// Scheduler-facing handler for [`TaskKind::SubmitTransferToPrimaryNode`]
/// (§4.6.2). Only ever does useful work on a secondary node.
pub async fn submit_transfer_to_primary_node(
    ctx: &AppContext,
    transfer_id: i64,
) -> Result<bool, CoordinatorError> {
    if ctx.mode() == NodeMode::Primary {
        reschedule(ctx, transfer_id, TaskKind::SubmitTransferOnchain).await?;
        return Ok(true);
    }

    let mut transfer = ctx.store.read_transfer(transfer_id).await?;

    // The primary has authority over validator_nonce assignment; adopt it.
    let validator_nonce = ctx
        .primary_client
        .get_validator_nonce(transfer.source_chain, &transfer.source_transaction_id)
        .await?;
    ctx.store
        .update_transfer_validator_nonce(transfer_id, validator_nonce)
        .await?;
    transfer.validator_nonce = validator_nonce;

    let destination_chain = transfer.eventual_destination_chain();
    let destination_adapter = ctx
        .chain(destination_chain)
        .ok_or(CoordinatorError::UnknownChain(destination_chain))?
        .clone();

    let input = build_message_input(ctx, &transfer).await?;
    let signature = destination_adapter.sign_transfer_to_message(input).await?;

    match ctx
        .primary_client
        .post_transfer_signature(
            transfer.source_chain,
            &transfer.source_transaction_id,
            &signature,
        )
        .await
    {
        Ok(()) | Err(PrimaryClientError::DuplicateSignature) => {}
        Err(PrimaryClientError::InvalidSigner) => return Err(CoordinatorError::UnregisteredSigner),
        Err(e) => return Err(e.into()),
    }

    let forwarder_contract =
        contracts::resolve_forwarder_contract(&ctx.store, &ctx.config, destination_chain).await?;
    let own_address = BlockchainAddress::from(destination_adapter.own_address());
    let validator_node_id = ctx
        .store
        .read_validator_node_id(forwarder_contract, &own_address)
        .await?
        .ok_or(CoordinatorError::UnregisteredSigner)?;
    ctx.store
        .create_validator_node_signature(transfer_id, validator_node_id, &signature)
        .await?;

    let status = if transfer.is_reversal {
        TransferStatus::SourceReversalTransactionSubmitted
    } else {
        TransferStatus::DestinationTransactionSubmitted
    };
    ctx.store.update_transfer_status(transfer_id, status).await?;
    Ok(true)
}

/// Scheduler-facing handler for [`TaskKind::SubmitTransferOnchain`]
/// (§4.6.3). Only ever does useful work on the primary node.
pub async fn submit_transfer_onchain(
    ctx: &AppContext,
    transfer_id: i64,
) -> Result<bool, CoordinatorError> {
    if ctx.mode() == NodeMode::Secondary {
        reschedule(ctx, transfer_id, TaskKind::SubmitTransferToPrimaryNode).await?;
        return Ok(true);
    }

    let transfer = ctx.store.read_transfer(transfer_id).await?;
    let destination_chain = transfer.eventual_destination_chain();
    let destination_adapter = ctx
        .chain(destination_chain)
        .ok_or(CoordinatorError::UnknownChain(destination_chain))?
        .clone();

    let input = build_message_input(ctx, &transfer).await?;
    let own_address = destination_adapter.own_address();

    let forwarder_contract =
        contracts::resolve_forwarder_contract(&ctx.store, &ctx.config, destination_chain).await?;
    let validator_node_ids = ctx.store.read_validator_node_ids(forwarder_contract).await?;
    let stored_signatures = ctx.store.read_validator_node_signatures(transfer_id).await?;

    let mut signers: Vec<Address> = Vec::new();
    let mut signatures: Vec<String> = Vec::new();

    for stored in &stored_signatures {
        let Some((_, address)) = validator_node_ids
            .iter()
            .find(|(id, _)| *id == stored.validator_node_id)
        else {
            continue;
        };
        let Ok(signer_address) = parse_address(address) else {
            continue;
        };
        if signer_address == own_address {
            // The primary's own signature is produced fresh below.
            continue;
        }
        match destination_adapter
            .recover_transfer_to_signer_address(&stored.signature, input.clone())
        {
            Ok(recovered) if recovered == signer_address => {
                signers.push(signer_address);
                signatures.push(stored.signature.clone());
            }
            _ => {
                tracing::warn!(
                    transfer_id,
                    validator_node_id = stored.validator_node_id,
                    "stored signature does not recover to its claimed signer, skipping"
                );
            }
        }
    }

    let minimum = destination_adapter
        .read_minimum_validator_node_signatures()
        .await?;
    // +1 accounts for the primary's own implicit signature, not yet produced.
    if signers.len() as u32 + 1 < minimum {
        return Ok(false);
    }

    let own_signature = destination_adapter
        .sign_transfer_to_message(input.clone())
        .await?;
    signers.push(own_address);
    signatures.push(own_signature.clone());

    // Sort ascending by numeric (hex) value, keeping signatures aligned
    // with their signer (§4.6.3 step 6: order required by the Forwarder).
    let mut paired: Vec<(Address, String)> = signers.into_iter().zip(signatures).collect();
    paired.sort_by(|a, b| a.0.cmp(&b.0));
    let (signers, signatures): (Vec<Address>, Vec<String>) = paired.into_iter().unzip();

    let failed_status = if transfer.is_reversal {
        TransferStatus::SourceReversalTransactionFailed
    } else {
        TransferStatus::DestinationTransactionFailed
    };

    // Assign the destination-chain account nonce through the §4.2.3
    // arbitration rule, sharing it with Store so it survives restarts and
    // parallel submissions rather than letting the provider pick one.
    let latest_account_nonce = destination_adapter.get_own_transaction_count().await?;
    let account_nonce = ctx
        .store
        .update_transfer_nonce(transfer_id, destination_chain, latest_account_nonce as i64)
        .await? as u64;

    let submission = TransferToSubmission {
        request: input,
        signers,
        signatures,
        account_nonce,
    };
    let internal_tx_id = match destination_adapter
        .start_transfer_to_submission(submission)
        .await
    {
        Ok(id) => id,
        Err(e @ (ChainAdapterError::NonMatchingForwarder | ChainAdapterError::SourceTransferIdAlreadyUsed)) => {
            tracing::warn!(transfer_id, error = %e, "transferTo submission permanently rejected");
            ctx.store.update_transfer_status(transfer_id, failed_status).await?;
            return Ok(true);
        }
        Err(e @ ChainAdapterError::NonceStale(_)) => {
            // §4.2.3: "the error bubbles up to the scheduler" after
            // resetting the stale nonce, so the next attempt re-arbitrates.
            tracing::warn!(transfer_id, error = %e, "stale destination nonce, resetting");
            ctx.store.reset_transfer_nonce(transfer_id).await?;
            return Err(e.into());
        }
        Err(e) => {
            ctx.store.update_transfer_status(transfer_id, failed_status).await?;
            return Err(e.into());
        }
    };

    let own_blockchain_address = BlockchainAddress::from(own_address);
    let validator_node_id = ctx
        .store
        .read_validator_node_id(forwarder_contract, &own_blockchain_address)
        .await?
        .ok_or(CoordinatorError::UnregisteredSigner)?;
    ctx.store
        .create_validator_node_signature(transfer_id, validator_node_id, &own_signature)
        .await?;

    let destination_hub_contract =
        contracts::resolve_hub_contract(&ctx.store, &ctx.config, destination_chain).await?;
    let submitted_status = if transfer.is_reversal {
        TransferStatus::SourceReversalTransactionSubmitted
    } else {
        TransferStatus::DestinationTransactionSubmitted
    };
    ctx.store
        .update_transfer_submitted_destination_transaction(
            transfer_id,
            destination_hub_contract,
            forwarder_contract,
            submitted_status,
        )
        .await?;

    let task_id = ctx
        .scheduler
        .schedule_now(TaskKind::ConfirmTransfer, transfer_id, Some(internal_tx_id))
        .await?;
    ctx.store.update_transfer_task_id(transfer_id, task_id).await?;
    Ok(true)
}

/// Scheduler-facing handler for [`TaskKind::ConfirmTransfer`] (§4.6.4).
/// `internal_tx_id` is the handle `submit_transfer_onchain` attached to the
/// claimed [`crate::scheduler::Task`].
pub async fn confirm_transfer(
    ctx: &AppContext,
    transfer_id: i64,
    internal_tx_id: Option<Uuid>,
) -> Result<bool, CoordinatorError> {
    let internal_tx_id =
        internal_tx_id.ok_or(CoordinatorError::MissingSubmissionHandle(transfer_id))?;
    let transfer = ctx.store.read_transfer(transfer_id).await?;
    let destination_chain = transfer.eventual_destination_chain();
    let destination_adapter = ctx
        .chain(destination_chain)
        .ok_or(CoordinatorError::UnknownChain(destination_chain))?
        .clone();

    match destination_adapter
        .get_transfer_to_submission_status(internal_tx_id)
        .await
    {
        Ok(SubmissionStatus::Pending) => Ok(false),
        Ok(SubmissionStatus::Reverted { .. }) => {
            reset_and_revalidate(ctx, transfer_id).await?;
            Ok(true)
        }
        Err(ChainAdapterError::UnresolvableTransferToSubmission(reason)) => {
            tracing::warn!(transfer_id, reason, "lost track of transferTo submission");
            reset_and_revalidate(ctx, transfer_id).await?;
            Ok(true)
        }
        Ok(SubmissionStatus::Confirmed {
            destination_transaction_id,
            destination_block_number,
            destination_transfer_id,
        }) => {
            let status = if transfer.is_reversal {
                TransferStatus::SourceReversalTransactionConfirmed
            } else {
                TransferStatus::DestinationTransactionConfirmed
            };
            ctx.store
                .update_transfer_confirmed_destination_transaction(
                    transfer_id,
                    destination_transfer_id,
                    &destination_transaction_id,
                    destination_block_number,
                    status,
                )
                .await?;
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resets the nonce and routes a dropped submission back to validation
/// (§4.6.4: REVERTED / UnresolvableTransferToSubmissionError both restart
/// the pipeline from `SOURCE_TRANSACTION_DETECTED`).
async fn reset_and_revalidate(ctx: &AppContext, transfer_id: i64) -> Result<(), CoordinatorError> {
    ctx.store.reset_transfer_nonce(transfer_id).await?;
    ctx.store
        .update_transfer_status(transfer_id, TransferStatus::SourceTransactionDetected)
        .await?;
    let task_id = ctx
        .scheduler
        .schedule_now(TaskKind::ValidateTransfer, transfer_id, None)
        .await?;
    ctx.store.update_transfer_task_id(transfer_id, task_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_evm_address() {
        let addr = parse_address("0x0000000000000000000000000000000000000002").unwrap();
        assert_eq!(addr, Address::with_last_byte(2));
    }

    #[test]
    fn rejects_malformed_address() {
        assert!(parse_address("nope").is_err());
    }
}
