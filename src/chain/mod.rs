//! The `ChainAdapter` interface (§4.2) and its EVM implementation.
//!
//! One adapter per configured chain. The trait is the seam the rest of the
//! system (Detector, Validator, Coordinator) programs against; non-EVM
//! chains would implement the same trait with some operations returning
//! [`ChainAdapterError::Unsupported`] (spec: "non-EVM chains may stub
//! unimplemented operations").

pub mod eip155;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{ChainId, CrossChainTransfer};

/// Outcome of `get_transaction_status`, the source-side status read that
/// drives §4.6.1 step 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTransactionStatus {
    Unincluded,
    Unconfirmed,
    Reverted,
    Confirmed,
}

/// Outcome of `get_transfer_to_submission_status` (§4.2.1).
#[derive(Debug, Clone)]
pub enum SubmissionStatus {
    Pending,
    Confirmed {
        destination_transaction_id: String,
        destination_block_number: i64,
        destination_transfer_id: U256,
    },
    Reverted {
        destination_transaction_id: String,
        destination_block_number: i64,
    },
}

/// Inputs for `start_transfer_to_submission` (§4.2.1): the sorted signer set
/// and aligned signatures the Coordinator has already assembled.
#[derive(Debug, Clone)]
pub struct TransferToSubmission {
    pub request: crate::eip712::TransferToMessageInput,
    /// Signer addresses, ascending by numeric (hex) value, aligned 1:1 with
    /// `signatures` (spec §4.6.3 step 6: "order required by the Forwarder
    /// contract").
    pub signers: Vec<Address>,
    pub signatures: Vec<String>,
    /// Destination-chain account nonce assigned by the §4.2.3 arbitration
    /// rule. The adapter sends with exactly this nonce rather than letting
    /// the provider fill one, since Store is the arbiter across restarts
    /// and parallel submissions.
    pub account_nonce: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainAdapterError {
    #[error("RPC nodes returned non-matching results for the same call")]
    ResultsNotMatching,
    #[error("forwarder address on submitted transaction does not match the configured forwarder")]
    NonMatchingForwarder,
    #[error("source transfer id already used on the destination forwarder")]
    SourceTransferIdAlreadyUsed,
    #[error("lost track of an in-flight transferTo submission: {0}")]
    UnresolvableTransferToSubmission(String),
    #[error("transient chain error, caller should retry: {0}")]
    Transient(String),
    /// §4.2.3: "If submission itself fails with 'nonce too low' or
    /// 'underpriced', `reset_transfer_nonce` is invoked and the error
    /// bubbles up to the scheduler." Distinguished from [`Self::Transient`]
    /// so the Coordinator knows to reset the stored nonce before retrying.
    #[error("destination account nonce stale, resubmission required: {0}")]
    NonceStale(String),
    #[error("operation not supported by this chain family")]
    Unsupported,
    #[error("contract call failed: {0}")]
    Contract(String),
    #[error("eip-712 signing error: {0}")]
    Eip712(#[from] crate::eip712::Eip712Error),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ChainAdapterError {
    /// True when the scheduler should requeue the task rather than treat
    /// this as a permanent failure (§7: "Transient chain error").
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainAdapterError::ResultsNotMatching
                | ChainAdapterError::Transient(_)
                | ChainAdapterError::NonceStale(_)
        )
    }
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// This validator's own signing address on this chain.
    fn own_address(&self) -> Address;

    async fn is_token_active(&self, token: Address) -> Result<bool, ChainAdapterError>;

    fn is_valid_recipient_address(&self, s: &str) -> bool;

    fn is_valid_transaction_id(&self, s: &str) -> bool;

    async fn is_valid_validator_nonce(&self, nonce: U256) -> Result<bool, ChainAdapterError>;

    fn is_equal_address(&self, a: &str, b: &str) -> bool;

    async fn read_external_token_address(
        &self,
        token: Address,
        other_chain: ChainId,
    ) -> Result<Option<Address>, ChainAdapterError>;

    async fn read_minimum_validator_node_signatures(&self) -> Result<u32, ChainAdapterError>;

    async fn read_validator_node_addresses(&self) -> Result<Vec<Address>, ChainAdapterError>;

    async fn read_token_decimals(&self, token: Address) -> Result<u8, ChainAdapterError>;

    /// Scans in windows of `outgoing_transfers_number_blocks` up to the
    /// latest block, returning every decoded `TransferFromSucceeded` event
    /// and the block number actually reached.
    async fn read_outgoing_transfers_from_block(
        &self,
        from_block: i64,
    ) -> Result<(Vec<CrossChainTransfer>, i64), ChainAdapterError>;

    async fn read_outgoing_transfers_in_transaction(
        &self,
        source_transaction_id: &str,
        hub_address: Address,
    ) -> Result<Vec<CrossChainTransfer>, ChainAdapterError>;

    fn recover_transfer_to_signer_address(
        &self,
        signature: &str,
        input: crate::eip712::TransferToMessageInput,
    ) -> Result<Address, ChainAdapterError>;

    async fn sign_transfer_to_message(
        &self,
        input: crate::eip712::TransferToMessageInput,
    ) -> Result<String, ChainAdapterError>;

    /// Schedules an outgoing transaction, returning an opaque internal id
    /// the caller polls via `get_transfer_to_submission_status`.
    async fn start_transfer_to_submission(
        &self,
        submission: TransferToSubmission,
    ) -> Result<Uuid, ChainAdapterError>;

    async fn get_transfer_to_submission_status(
        &self,
        internal_tx_id: Uuid,
    ) -> Result<SubmissionStatus, ChainAdapterError>;

    /// Source-side transaction status, used by `validate_transfer` step 1.
    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<SourceTransactionStatus, ChainAdapterError>;

    /// `eth_getTransactionCount` for the validator's own address — the
    /// `latest` value in the §4.2.3 nonce-arbitration rule.
    async fn get_own_transaction_count(&self) -> Result<u64, ChainAdapterError>;

    /// Checks the configured protocol version against the deployed
    /// Hub/Forwarder ABI (§4.7). Returns an error (fatal at startup) on
    /// mismatch.
    async fn check_protocol_version(
        &self,
        expected: &semver::Version,
    ) -> Result<(), ChainAdapterError>;
}
