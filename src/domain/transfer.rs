//! The central [`Transfer`] record and its status state machine.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BlockchainAddress, ChainId};

/// Status of a [`Transfer`], per §4.6 of the design. Each edge below is the
/// *only* legal transition out of the named state; Store-level updates are
/// status-conditional so an illegal edge is a silent no-op rather than a
/// corrupted row (§5: "a handler that finds its `task_id` no longer current
/// may still complete safely").
///
/// ```text
/// SOURCE_TRANSACTION_DETECTED
///   -> SOURCE_TRANSACTION_REVERTED           (source tx reverted)
///   -> SOURCE_TRANSACTION_INVALID            (source token inactive)
///   -> SOURCE_REVERSAL_TRANSACTION_SUBMITTED (is_reversal, primary submitted)
///   -> DESTINATION_TRANSACTION_SUBMITTED     (forward path, primary submitted)
///
/// SOURCE_REVERSAL_TRANSACTION_SUBMITTED
///   -> SOURCE_REVERSAL_TRANSACTION_CONFIRMED
///   -> SOURCE_REVERSAL_TRANSACTION_FAILED
///   -> SOURCE_TRANSACTION_DETECTED           (UnresolvableTransferToSubmissionError or REVERTED)
///
/// DESTINATION_TRANSACTION_SUBMITTED
///   -> DESTINATION_TRANSACTION_CONFIRMED
///   -> DESTINATION_TRANSACTION_FAILED
///   -> SOURCE_TRANSACTION_DETECTED           (UnresolvableTransferToSubmissionError or REVERTED)
///
/// *_FAILED rows with a non-NULL nonce participate in §4.2.3 nonce
/// arbitration; when a failed row is recycled for a new submission its
/// status moves to the matching *_NEW_NONCE_ASSIGNED variant before the
/// next submit_transfer_onchain attempt.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    SourceTransactionDetected,
    /// Added per spec §9 Open Question 3: appears only in nonce-update SQL
    /// in the original, enumerated here as an explicit status.
    SourceTransactionDetectedNewNonceAssigned,
    SourceTransactionReverted,
    SourceTransactionInvalid,
    SourceReversalTransactionSubmitted,
    SourceReversalTransactionConfirmed,
    SourceReversalTransactionFailed,
    SourceReversalTransactionNewNonceAssigned,
    DestinationTransactionSubmitted,
    DestinationTransactionConfirmed,
    DestinationTransactionFailed,
    DestinationTransactionNewNonceAssigned,
}

impl TransferStatus {
    /// True for the two `*_FAILED` families that participate in nonce
    /// recycling (§4.2.3: "the set F of transfers on this destination chain
    /// whose status is `*_FAILED` and which still hold a non-NULL nonce").
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            TransferStatus::SourceReversalTransactionFailed
                | TransferStatus::DestinationTransactionFailed
        )
    }

    /// The `*_NEW_NONCE_ASSIGNED` counterpart for this status, if recycling
    /// applies to it.
    pub fn with_new_nonce_assigned(self) -> Option<TransferStatus> {
        match self {
            TransferStatus::SourceTransactionDetected => {
                Some(TransferStatus::SourceTransactionDetectedNewNonceAssigned)
            }
            TransferStatus::SourceReversalTransactionFailed => {
                Some(TransferStatus::SourceReversalTransactionNewNonceAssigned)
            }
            TransferStatus::DestinationTransactionFailed => {
                Some(TransferStatus::DestinationTransactionNewNonceAssigned)
            }
            _ => None,
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(
            self,
            TransferStatus::SourceReversalTransactionConfirmed
                | TransferStatus::DestinationTransactionConfirmed
        )
    }

    pub fn is_submitted(self) -> bool {
        matches!(
            self,
            TransferStatus::SourceReversalTransactionSubmitted
                | TransferStatus::DestinationTransactionSubmitted
        )
    }
}

/// The central persisted record. Mirrors the field list in the data model
/// (§3) one to one.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: i64,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub sender_address: BlockchainAddress,
    pub recipient_address: BlockchainAddress,
    pub source_token: i64,
    pub destination_token: i64,
    pub amount: U256,
    pub validator_nonce: U256,
    pub source_hub_contract: i64,
    pub destination_hub_contract: Option<i64>,
    pub destination_forwarder_contract: Option<i64>,
    pub source_transfer_id: U256,
    pub source_transaction_id: String,
    pub source_block_number: i64,
    pub source_block_hash: String,
    pub destination_transfer_id: Option<U256>,
    pub destination_transaction_id: Option<String>,
    pub destination_block_number: Option<i64>,
    pub task_id: Option<Uuid>,
    /// Destination-chain account nonce. NULL unless a tx is in flight.
    pub nonce: Option<i64>,
    pub status: TransferStatus,
    pub is_reversal: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Transfer {
    /// Eventual destination blockchain after validation (source chain for
    /// reversals, see `CrossChainTransfer::eventual_destination_blockchain`).
    pub fn eventual_destination_chain(&self) -> ChainId {
        if self.is_reversal {
            self.source_chain
        } else {
            self.destination_chain
        }
    }

    /// Eventual recipient: the original sender for reversals (funds route
    /// back to where they came from), else the stored recipient.
    pub fn eventual_recipient_address(&self) -> &BlockchainAddress {
        if self.is_reversal {
            &self.sender_address
        } else {
            &self.recipient_address
        }
    }

    /// Eventual destination token contract id: the source token for
    /// reversals, else the stored destination token.
    pub fn eventual_destination_token(&self) -> i64 {
        if self.is_reversal {
            self.source_token
        } else {
            self.destination_token
        }
    }
}

/// An ephemeral, decoded `TransferFromSucceeded` event, as produced by the
/// ChainAdapter and consumed by the Detector and Validator before it becomes
/// (or is reconciled against) a persisted [`Transfer`] row. Grounded on
/// `CrossChainTransfer` in the original's `entities.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChainTransfer {
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub source_hub_address: BlockchainAddress,
    pub source_transfer_id: U256,
    pub source_transaction_id: String,
    pub source_block_number: i64,
    pub source_block_hash: String,
    pub sender_address: BlockchainAddress,
    pub recipient_address: BlockchainAddress,
    pub source_token_address: BlockchainAddress,
    pub destination_token_address: BlockchainAddress,
    pub amount: U256,
    pub fee: U256,
    pub service_node_address: BlockchainAddress,
    pub is_reversal_transfer: bool,
}

impl CrossChainTransfer {
    pub fn eventual_destination_blockchain(&self) -> ChainId {
        if self.is_reversal_transfer {
            self.source_chain
        } else {
            self.destination_chain
        }
    }

    pub fn eventual_recipient_address(&self) -> &BlockchainAddress {
        if self.is_reversal_transfer {
            &self.sender_address
        } else {
            &self.recipient_address
        }
    }

    pub fn eventual_destination_token_address(&self) -> &BlockchainAddress {
        if self.is_reversal_transfer {
            &self.source_token_address
        } else {
            &self.destination_token_address
        }
    }
}

/// A stored secondary-or-primary signature row. Primary key
/// `(transfer_id, validator_node_id)`; `signature` is globally unique to
/// prevent cross-transfer replay.
#[derive(Debug, Clone)]
pub struct ValidatorNodeSignature {
    pub transfer_id: i64,
    pub validator_node_id: i64,
    pub signature: String,
    pub created: DateTime<Utc>,
}
