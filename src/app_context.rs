//! Process-wide context assembled once at startup (§9: "global singleton
//! config and singleton DB engine" → "process-wide `AppContext` created at
//! startup, initialized then read-only, and injected").
//!
//! Bundles the loaded [`Config`], the [`Store`] (pooled DB connections),
//! one [`ChainAdapter`] per active chain, the [`Scheduler`], and (for
//! secondary nodes) the [`PrimaryClient`]. Held behind an `Arc` and passed
//! to the Detector, the Scheduler worker pool, and the RestAPI router
//! state, mirroring the teacher's `Arc<FacilitatorLocal>` axum state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::chain::ChainAdapter;
use crate::chain::eip155::Eip155ChainAdapter;
use crate::config::Config;
use crate::contracts::{self, ContractResolutionError};
use crate::domain::{BlockchainAddress, ChainId, NodeMode};
use crate::primary_client::PrimaryClient;
use crate::scheduler::Scheduler;
use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum AppContextError {
    #[error("failed to connect to the database: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error(transparent)]
    Contract(#[from] ContractResolutionError),
    #[error("failed to initialize chain adapter for chain {0}: {1}")]
    ChainAdapter(String, crate::chain::ChainAdapterError),
    #[error("protocol version check failed on chain {0}: {1}")]
    ProtocolVersion(String, crate::chain::ChainAdapterError),
}

pub struct AppContext {
    pub config: Config,
    pub store: Store,
    pub scheduler: Scheduler,
    pub primary_client: PrimaryClient,
    chains: HashMap<ChainId, Arc<dyn ChainAdapter>>,
    mode_tx: watch::Sender<NodeMode>,
}

impl AppContext {
    /// Connects to the database, builds one EVM adapter per active chain,
    /// and checks the configured protocol version against every chain's
    /// deployed Hub/Forwarder ABI (§4.7: "Any incompatibility aborts
    /// startup with a fatal log").
    pub async fn init(config: Config) -> Result<Self, AppContextError> {
        let store = Store::connect(
            &config.database.url,
            config.database.pool_size,
            config.database.apply_migrations,
        )
        .await?;
        let scheduler = Scheduler::new(store.pool().clone());
        let primary_client = PrimaryClient::new(config.application.primary_url.clone());

        let mut chains: HashMap<ChainId, Arc<dyn ChainAdapter>> = HashMap::new();
        for (name, chain_config) in config.active_chains() {
            let chain_id = ChainId(chain_config.id);
            let adapter = Eip155ChainAdapter::from_config(
                chain_id,
                name,
                chain_config,
                config.protocol.major,
            )
            .await
            .map_err(|e| AppContextError::ChainAdapter(name.clone(), e))?;
            adapter
                .check_protocol_version(&config.protocol)
                .await
                .map_err(|e| AppContextError::ProtocolVersion(name.clone(), e))?;
            store.upsert_chain(chain_id, name).await?;

            // Mirror the on-chain validator set into the Store so the
            // Coordinator can resolve a `validator_node_id` row for every
            // signature it reads or creates (§4.6.2/§4.6.3).
            let forwarder_contract = contracts::resolve_forwarder_contract(&store, &config, chain_id).await?;
            let validator_addresses = adapter
                .read_validator_node_addresses()
                .await
                .map_err(|e| AppContextError::ChainAdapter(name.clone(), e))?;
            for address in validator_addresses {
                store
                    .upsert_validator_node(forwarder_contract, &BlockchainAddress::from(address))
                    .await?;
            }

            chains.insert(chain_id, Arc::new(adapter));
        }

        let (mode_tx, _) = watch::channel(config.application.mode);

        Ok(Self {
            config,
            store,
            scheduler,
            primary_client,
            chains,
            mode_tx,
        })
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&Arc<dyn ChainAdapter>> {
        self.chains.get(&chain_id)
    }

    pub fn chains(&self) -> impl Iterator<Item = (&ChainId, &Arc<dyn ChainAdapter>)> {
        self.chains.iter()
    }

    /// Current runtime role. Re-read on every Coordinator handler
    /// invocation rather than cached, since roles may flip at any time
    /// (§1, §4.6.2/§4.6.3 role-flip guards).
    pub fn mode(&self) -> NodeMode {
        *self.mode_tx.borrow()
    }

    /// Flips the runtime role, e.g. in response to a config reload
    /// (scenario 5: "config reload flips it to primary").
    pub fn set_mode(&self, mode: NodeMode) {
        self.mode_tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mode_is_idempotent_for_same_value() {
        let (tx, mut rx) = watch::channel(NodeMode::Secondary);
        tx.send_if_modified(|current| {
            if *current == NodeMode::Secondary {
                false
            } else {
                *current = NodeMode::Secondary;
                true
            }
        });
        assert!(!rx.has_changed().unwrap());
        let _ = &mut rx;
    }
}
