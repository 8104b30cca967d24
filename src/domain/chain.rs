//! Chain and contract identity.
//!
//! Unlike the teacher's CAIP-2 `ChainId` (a namespace + reference pair for
//! multi-family chain support), this system is EVM-only and chains are
//! identified by a small stable integer, per the data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable small integer identifying a configured blockchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub i32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured blockchain row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    /// Last block number the Detector has fully scanned. Starts at -1
    /// (spec: "initially -1") meaning nothing has been scanned yet.
    pub last_block_scanned: i64,
}

/// The three disjoint contract kinds a chain may host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Hub,
    Forwarder,
    Token,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContractKind::Hub => "hub",
            ContractKind::Forwarder => "forwarder",
            ContractKind::Token => "token",
        };
        write!(f, "{s}")
    }
}

/// A contract row, unique by `(chain_id, address)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub id: i64,
    pub chain_id: ChainId,
    pub address: crate::domain::BlockchainAddress,
    pub kind: ContractKind,
}

/// A registered validator node on a given Forwarder, unique by
/// `(forwarder_contract_id, address)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorNode {
    pub id: i64,
    pub forwarder_contract_id: i64,
    pub address: crate::domain::BlockchainAddress,
}
