//! The EIP-712 `TransferTo` typed message (§4.2.2).
//!
//! Field ordering is wire-critical: the Forwarder contract hashes the
//! struct with this exact layout, so any implementation that reorders
//! fields produces a different signing hash and validator signatures
//! would not verify cross-implementation. `sol!` generates the
//! `eip712_signing_hash` the same way `alloy-sol-types` does for any other
//! ERC-712-typed struct (see the teacher's `TransferWithAuthorization` in
//! `scheme/v1_eip155_exact/mod.rs`).

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};

use crate::domain::{ChainId, Transfer};

sol! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TransferToRequest {
        uint256 sourceBlockchainId;
        uint256 sourceTransferId;
        string sourceTransactionId;
        string sender;
        address recipient;
        string sourceToken;
        address destinationToken;
        uint256 amount;
        uint256 nonce;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TransferTo {
        TransferToRequest request;
        uint256 destinationBlockchainId;
        address pantosHub;
        address pantosForwarder;
        address pantosToken;
    }
}

/// Inputs needed to build a [`TransferTo`] message, independent of how the
/// caller arrived at them (a fresh [`Transfer`] row or a reversal-adjusted
/// projection of one).
#[derive(Debug, Clone)]
pub struct TransferToMessageInput {
    pub source_blockchain_id: ChainId,
    pub source_transfer_id: U256,
    pub source_transaction_id: String,
    pub sender: String,
    pub recipient: Address,
    pub source_token: String,
    pub destination_token: Address,
    pub amount: U256,
    pub validator_nonce: U256,
    pub destination_blockchain_id: ChainId,
    pub destination_hub: Address,
    pub destination_forwarder: Address,
    pub destination_token_contract: Address,
}

impl TransferToMessageInput {
    fn into_message(self) -> TransferTo {
        TransferTo {
            request: TransferToRequest {
                sourceBlockchainId: U256::from(self.source_blockchain_id.0 as u64),
                sourceTransferId: self.source_transfer_id,
                sourceTransactionId: self.source_transaction_id,
                sender: self.sender,
                recipient: self.recipient,
                sourceToken: self.source_token,
                destinationToken: self.destination_token,
                amount: self.amount,
                nonce: self.validator_nonce,
            },
            destinationBlockchainId: U256::from(self.destination_blockchain_id.0 as u64),
            pantosHub: self.destination_hub,
            pantosForwarder: self.destination_forwarder,
            pantosToken: self.destination_token_contract,
        }
    }
}

/// Builds the EIP-712 domain for a given destination chain and Forwarder,
/// per spec: `{name:"Pantos", version:str(protocol_major), chainId,
/// verifyingContract:forwarder_addr}`.
pub fn transfer_to_domain(
    protocol_major: u64,
    destination_chain_id: u64,
    forwarder: Address,
) -> Eip712Domain {
    eip712_domain! {
        name: "Pantos",
        version: protocol_major.to_string(),
        chain_id: destination_chain_id,
        verifying_contract: forwarder,
    }
}

/// Computes the EIP-712 signing hash for a `TransferTo` message under the
/// given domain.
pub fn transfer_to_signing_hash(input: TransferToMessageInput, domain: &Eip712Domain) -> B256 {
    input.into_message().eip712_signing_hash(domain)
}

#[derive(Debug, thiserror::Error)]
pub enum Eip712Error {
    #[error("failed to sign transferTo message: {0}")]
    Sign(#[from] alloy_signer::Error),
    #[error("malformed signature hex: {0}")]
    InvalidSignatureHex(#[from] hex::FromHexError),
    #[error("failed to parse signature: {0}")]
    InvalidSignature(#[from] alloy_primitives::SignatureError),
}

/// Signs a `TransferTo` message with the validator's own key, returning a
/// hex-encoded signature (`sign_transfer_to_message` in §4.2.1).
pub async fn sign_transfer_to_message(
    signer: &PrivateKeySigner,
    input: TransferToMessageInput,
    domain: &Eip712Domain,
) -> Result<String, Eip712Error> {
    let hash = transfer_to_signing_hash(input, domain);
    let signature = Signer::sign_hash(signer, &hash).await?;
    Ok(format!("0x{}", hex::encode(signature.as_bytes())))
}

/// Recovers the signer address of a hex-encoded signature over a
/// `TransferTo` message (`recover_transfer_to_signer_address` in §4.2.1).
pub fn recover_transfer_to_signer_address(
    signature_hex: &str,
    input: TransferToMessageInput,
    domain: &Eip712Domain,
) -> Result<Address, Eip712Error> {
    let hash = transfer_to_signing_hash(input, domain);
    let bytes = hex::decode(signature_hex.trim_start_matches("0x"))?;
    let signature = Signature::from_raw(&bytes)?;
    Ok(signature.recover_address_from_prehash(&hash)?)
}

/// Builds the message input from an in-flight [`Transfer`] and the
/// destination-side contract addresses resolved for it, using
/// [`Transfer::eventual_destination_chain`] so reversals sign against the
/// source chain's Hub/Forwarder/token instead of the original destination.
pub fn message_input_for_transfer(
    transfer: &Transfer,
    sender: String,
    recipient: Address,
    source_token: String,
    destination_token: Address,
    destination_hub: Address,
    destination_forwarder: Address,
    destination_token_contract: Address,
) -> TransferToMessageInput {
    TransferToMessageInput {
        source_blockchain_id: transfer.source_chain,
        source_transfer_id: transfer.source_transfer_id,
        source_transaction_id: transfer.source_transaction_id.clone(),
        sender,
        recipient,
        source_token,
        destination_token,
        amount: transfer.amount,
        validator_nonce: transfer.validator_nonce,
        destination_blockchain_id: transfer.eventual_destination_chain(),
        destination_hub,
        destination_forwarder,
        destination_token_contract,
    }
}
