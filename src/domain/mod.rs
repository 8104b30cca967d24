//! Core entities shared across the store, validator, and coordinator.
//!
//! These types are the Rust counterparts of the persisted rows described
//! in the data model: [`Chain`], [`Contract`], [`ValidatorNode`], [`Transfer`],
//! and [`ValidatorNodeSignature`]. They carry no persistence concerns of
//! their own — that is the [`crate::store`] module's job.

pub mod chain;
pub mod transfer;

pub use chain::{Chain, ChainId, ContractKind};
pub use transfer::{CrossChainTransfer, Transfer, TransferStatus};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// An address on some blockchain, compared case-insensitively for EVM-family
/// chains. Adapters decide equality (spec: "Addresses are opaque strings
/// compared case-insensitively for EVM-family chains; adapters decide
/// equality").
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct BlockchainAddress(pub String);

impl BlockchainAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses this address as an EVM checksummed/non-checksummed address.
    pub fn as_evm_address(&self) -> Result<Address, alloy_primitives::AddressError> {
        self.0.parse()
    }
}

impl PartialEq for BlockchainAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::hash::Hash for BlockchainAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl From<Address> for BlockchainAddress {
    fn from(value: Address) -> Self {
        BlockchainAddress(value.to_string())
    }
}

impl std::fmt::Display for BlockchainAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validator process role. Roles may flip at any time; the Coordinator
/// re-checks this on every handler invocation rather than caching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    Primary,
    Secondary,
}
