//! Resolves the fixed Hub/Forwarder/pan-token contract addresses a chain's
//! config carries into `Store` row ids, and upserts arbitrary (event
//! supplied) token addresses the same way. Shared by the Detector,
//! Validator and Coordinator, all of which only ever hand around `i64`
//! contract ids on a [`crate::domain::Transfer`] row.

use crate::config::Config;
use crate::domain::{BlockchainAddress, ChainId, ContractKind};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ContractResolutionError {
    #[error("chain {0} is not configured")]
    UnknownChain(ChainId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn resolve_hub_contract(
    store: &Store,
    config: &Config,
    chain_id: ChainId,
) -> Result<i64, ContractResolutionError> {
    let (_, chain_config) = config
        .chain_by_id(chain_id)
        .ok_or(ContractResolutionError::UnknownChain(chain_id))?;
    Ok(store
        .upsert_contract(
            chain_id,
            &BlockchainAddress(chain_config.hub.clone()),
            ContractKind::Hub,
        )
        .await?)
}

pub async fn resolve_forwarder_contract(
    store: &Store,
    config: &Config,
    chain_id: ChainId,
) -> Result<i64, ContractResolutionError> {
    let (_, chain_config) = config
        .chain_by_id(chain_id)
        .ok_or(ContractResolutionError::UnknownChain(chain_id))?;
    Ok(store
        .upsert_contract(
            chain_id,
            &BlockchainAddress(chain_config.forwarder.clone()),
            ContractKind::Forwarder,
        )
        .await?)
}

pub async fn resolve_token_contract(
    store: &Store,
    chain_id: ChainId,
    address: &BlockchainAddress,
) -> Result<i64, ContractResolutionError> {
    Ok(store
        .upsert_contract(chain_id, address, ContractKind::Token)
        .await?)
}
