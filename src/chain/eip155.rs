//! EVM-family [`ChainAdapter`] implementation, built the way the teacher's
//! `chain/eip155/mod.rs` builds its EVM provider: `alloy_provider` fillers
//! for gas/nonce/chain-id, `alloy_signer_local` for the validator key(s).
//! Reads fan out to every configured RPC endpoint (`providers` +
//! `fallback_providers`) independently via [`Eip155ChainAdapter::quorum_read`]
//! rather than only falling back on failure, so results can be compared for
//! the cross-node quorum the spec requires (§4.2: "each call may run against
//! multiple configured RPC endpoints; results must agree").

use alloy_network::{Ethereum as AlloyEthereum, EthereumWallet, NetworkWallet};
use alloy_primitives::{Address, B256, U256};
use alloy_provider::fillers::{ChainIdFiller, FillProvider, GasFiller, JoinFill, WalletFiller};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::{Filter, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolCall, SolEvent, sol};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use uuid::Uuid;

use crate::chain::{
    ChainAdapter, ChainAdapterError, SourceTransactionStatus, SubmissionStatus,
    TransferToSubmission,
};
use crate::config::BlockchainConfig;
use crate::domain::{ChainId, CrossChainTransfer};
use crate::eip712::{self, TransferToMessageInput};

/// Write-capable provider: gas estimation, chain-id filling and wallet
/// signing layered over a fallback transport spanning `providers` +
/// `fallback_providers`.
pub type WriteProvider =
    FillProvider<JoinFill<Identity, JoinFill<GasFiller, ChainIdFiller>>, RootProvider>;

sol! {
    event TransferFromSucceeded(
        uint256 sourceTransferId,
        address sender,
        string recipient,
        address sourceToken,
        string destinationToken,
        uint256 amount,
        uint256 fee,
        address serviceNode,
        uint256 destinationBlockchainId
    );

    event TransferToSucceeded(
        uint256 sourceTransferId,
        uint256 destinationTransferId,
        address recipient,
        address destinationToken,
        uint256 amount,
        uint256 nonce
    );

    #[sol(rpc)]
    interface IPantosHub {
        function isTokenActive(address token) external view returns (bool);
        function isValidValidatorNonce(uint256 nonce) external view returns (bool);
        function externalTokenAddress(address token, uint256 otherBlockchainId) external view returns (address);
        function protocolVersion() external view returns (string memory);
    }

    #[sol(rpc)]
    interface IPantosForwarder {
        function getMinimumValidatorNodeSignatures() external view returns (uint256);
        function getValidatorNodes() external view returns (address[] memory);
        function verifyTransferTo(
            uint256 sourceBlockchainId,
            uint256 sourceTransferId,
            string sourceTransactionId,
            string sender,
            address recipient,
            string sourceToken,
            address destinationToken,
            uint256 amount,
            uint256 nonce
        ) external view;
        function transferTo(
            uint256 sourceBlockchainId,
            uint256 sourceTransferId,
            string sourceTransactionId,
            string sender,
            address recipient,
            string sourceToken,
            address destinationToken,
            uint256 amount,
            uint256 nonce,
            address[] signerAddresses,
            bytes[] signatures
        ) external returns (uint256 destinationTransferId);
        function protocolVersion() external view returns (string memory);
    }

    #[sol(rpc)]
    interface IERC20Decimals {
        function decimals() external view returns (uint8);
    }
}

/// The forwarder calldata and signer set needed to resend a `transferTo`
/// call with a bumped fee; kept around so the resubmission loop (§4.2.4)
/// doesn't need the Coordinator to call back in.
struct ResubmittableCall {
    calldata: alloy_primitives::Bytes,
    account_nonce: u64,
    signer_count: u64,
}

/// The subset of a transaction receipt that every configured provider must
/// agree on before `get_transfer_to_submission_status` acts on it — used as
/// the `quorum_read` comparison value in place of the raw receipt, which
/// carries non-comparable transport metadata.
#[derive(Debug, Clone, PartialEq)]
struct ReceiptSummary {
    status: bool,
    block_number: Option<u64>,
    destination_transfer_id: Option<U256>,
}

/// State the resubmission loop (§4.2.4) tracks for one in-flight
/// `transferTo` call between `start_transfer_to_submission` and
/// `get_transfer_to_submission_status` polls.
struct PendingSubmission {
    tx_hash: std::sync::Mutex<Option<B256>>,
    submitted_at: std::time::Instant,
    /// Timestamp of the last (re)submission, reset on every fee bump; the
    /// resubmission clock (`blocks_until_resubmission`) runs from here.
    last_submitted_at: std::sync::Mutex<std::time::Instant>,
    max_fee_per_gas: std::sync::atomic::AtomicU64,
    call: ResubmittableCall,
}

pub struct Eip155ChainAdapter {
    chain_id: ChainId,
    chain_id_u64: u64,
    hub_address: Address,
    forwarder_address: Address,
    pan_token_address: Address,
    /// One independent provider per configured endpoint (primary +
    /// fallback), used for quorum reads.
    read_providers: Vec<RootProvider>,
    write_provider: WriteProvider,
    signer: PrivateKeySigner,
    outgoing_transfers_number_blocks: u64,
    confirmations: u64,
    average_block_time: u64,
    min_adaptable_fee_per_gas: u128,
    max_total_fee_per_gas: Option<u128>,
    adaptable_fee_increase_factor: f64,
    blocks_until_resubmission: u64,
    base_gas: u64,
    per_signer_gas: u64,
    submissions: DashMap<Uuid, PendingSubmission>,
    protocol_major: u64,
}

impl Eip155ChainAdapter {
    pub async fn from_config(
        id: ChainId,
        name: &str,
        config: &BlockchainConfig,
        protocol_major: u64,
    ) -> Result<Self, ChainAdapterError> {
        let private_key = config
            .private_key
            .resolve()
            .map_err(|e| ChainAdapterError::Contract(e.to_string()))?;
        let key_bytes = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|e| ChainAdapterError::InvalidAddress(e.to_string()))?;
        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| ChainAdapterError::Contract(e.to_string()))?
            .with_chain_id(Some(config.chain_id));

        let hub_address: Address = config
            .hub
            .parse()
            .map_err(|_| ChainAdapterError::InvalidAddress(config.hub.clone()))?;
        let forwarder_address: Address = config
            .forwarder
            .parse()
            .map_err(|_| ChainAdapterError::InvalidAddress(config.forwarder.clone()))?;
        let pan_token_address: Address = config
            .pan_token
            .parse()
            .map_err(|_| ChainAdapterError::InvalidAddress(config.pan_token.clone()))?;

        let all_urls: Vec<_> = config
            .providers
            .iter()
            .chain(config.fallback_providers.iter())
            .cloned()
            .collect();
        if all_urls.is_empty() {
            return Err(ChainAdapterError::Contract(format!(
                "chain {name} has no configured RPC providers"
            )));
        }

        let read_providers: Vec<RootProvider> = all_urls
            .iter()
            .map(|url| ProviderBuilder::new().connect_http(url.clone()))
            .collect();

        let wallet = EthereumWallet::from(signer.clone());
        let write_provider: WriteProvider = ProviderBuilder::default()
            .filler(JoinFill::new(GasFiller, ChainIdFiller::default()))
            .wallet(wallet)
            .connect_http(all_urls[0].clone());

        Ok(Self {
            chain_id: id,
            chain_id_u64: config.chain_id,
            hub_address,
            forwarder_address,
            pan_token_address,
            read_providers,
            write_provider,
            signer,
            outgoing_transfers_number_blocks: config.outgoing_transfers_number_blocks,
            confirmations: config.confirmations,
            average_block_time: config.average_block_time,
            min_adaptable_fee_per_gas: config.min_adaptable_fee_per_gas,
            max_total_fee_per_gas: config.max_total_fee_per_gas,
            adaptable_fee_increase_factor: config.adaptable_fee_increase_factor,
            blocks_until_resubmission: config.blocks_until_resubmission,
            base_gas: 120_000,
            per_signer_gas: 20_000,
            submissions: DashMap::new(),
            protocol_major,
        })
    }

    /// Runs the same read against every configured provider and requires
    /// all results to agree, per §4.2's cross-node quorum requirement.
    async fn quorum_read<T, F, Fut>(&self, f: F) -> Result<T, ChainAdapterError>
    where
        T: PartialEq + Clone + Send,
        F: Fn(RootProvider) -> Fut,
        Fut: Future<Output = Result<T, ChainAdapterError>>,
    {
        let mut results = Vec::with_capacity(self.read_providers.len());
        for provider in &self.read_providers {
            results.push(f(provider.clone()).await?);
        }
        let first = results.first().cloned().ok_or(ChainAdapterError::Transient(
            "no providers configured".into(),
        ))?;
        if results.iter().all(|r| r == &first) {
            Ok(first)
        } else {
            Err(ChainAdapterError::ResultsNotMatching)
        }
    }

    fn hub(&self, provider: RootProvider) -> IPantosHub::IPantosHubInstance<RootProvider> {
        IPantosHub::new(self.hub_address, provider)
    }

    fn forwarder(
        &self,
        provider: RootProvider,
    ) -> IPantosForwarder::IPantosForwarderInstance<RootProvider> {
        IPantosForwarder::new(self.forwarder_address, provider)
    }

    /// Sends a `transferTo` call with a fixed account nonce and
    /// `maxFeePerGas`, gas-limited by `base_gas + k·per_signer_gas` (§4.2.4).
    async fn send_forwarder_call(
        &self,
        calldata: &alloy_primitives::Bytes,
        gas_limit: u64,
        account_nonce: u64,
        max_fee_per_gas: u128,
    ) -> Result<B256, ChainAdapterError> {
        let tx = TransactionRequest::default()
            .with_to(self.forwarder_address)
            .with_from(self.signer.address())
            .with_input(calldata.clone())
            .with_gas_limit(gas_limit)
            .with_nonce(account_nonce)
            .with_max_fee_per_gas(max_fee_per_gas);

        let pending = self
            .write_provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_submission_error(&e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    fn decode_transfer_from_succeeded(
        &self,
        log: &alloy_rpc_types_eth::Log,
        hub_address: Address,
    ) -> Option<CrossChainTransfer> {
        let decoded = log
            .log_decode::<TransferFromSucceeded>()
            .ok()?
            .inner
            .data;
        let block_number = log.block_number? as i64;
        let transaction_hash = log.transaction_hash?;
        let block_hash = log.block_hash.unwrap_or_default();
        Some(CrossChainTransfer {
            source_chain: self.chain_id,
            destination_chain: ChainId(decoded.destinationBlockchainId.to::<u64>() as i32),
            source_hub_address: crate::domain::BlockchainAddress(hub_address.to_string()),
            source_transfer_id: decoded.sourceTransferId,
            source_transaction_id: format!("0x{transaction_hash:x}"),
            source_block_number: block_number,
            source_block_hash: format!("0x{block_hash:x}"),
            sender_address: crate::domain::BlockchainAddress(decoded.sender.to_string()),
            recipient_address: crate::domain::BlockchainAddress(decoded.recipient.clone()),
            source_token_address: crate::domain::BlockchainAddress(decoded.sourceToken.to_string()),
            destination_token_address: crate::domain::BlockchainAddress(
                decoded.destinationToken.clone(),
            ),
            amount: decoded.amount,
            fee: decoded.fee,
            service_node_address: crate::domain::BlockchainAddress(
                decoded.serviceNode.to_string(),
            ),
            is_reversal_transfer: false,
        })
    }
}

#[async_trait::async_trait]
impl ChainAdapter for Eip155ChainAdapter {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn own_address(&self) -> Address {
        self.signer.address()
    }

    async fn is_token_active(&self, token: Address) -> Result<bool, ChainAdapterError> {
        self.quorum_read(|p| async move {
            self.hub(p)
                .isTokenActive(token)
                .call()
                .await
                .map_err(|e| ChainAdapterError::Contract(e.to_string()))
        })
        .await
    }

    fn is_valid_recipient_address(&self, s: &str) -> bool {
        s.parse::<Address>()
            .map(|a| !a.is_zero())
            .unwrap_or(false)
    }

    fn is_valid_transaction_id(&self, s: &str) -> bool {
        s.len() == 66 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    async fn is_valid_validator_nonce(&self, nonce: U256) -> Result<bool, ChainAdapterError> {
        self.quorum_read(|p| async move {
            self.hub(p)
                .isValidValidatorNonce(nonce)
                .call()
                .await
                .map_err(|e| ChainAdapterError::Contract(e.to_string()))
        })
        .await
    }

    fn is_equal_address(&self, a: &str, b: &str) -> bool {
        match (a.parse::<Address>(), b.parse::<Address>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => a.eq_ignore_ascii_case(b),
        }
    }

    async fn read_external_token_address(
        &self,
        token: Address,
        other_chain: ChainId,
    ) -> Result<Option<Address>, ChainAdapterError> {
        let other = U256::from(other_chain.0 as u64);
        let addr = self
            .quorum_read(|p| async move {
                self.hub(p)
                    .externalTokenAddress(token, other)
                    .call()
                    .await
                    .map_err(|e| ChainAdapterError::Contract(e.to_string()))
            })
            .await?;
        Ok(if addr.is_zero() { None } else { Some(addr) })
    }

    async fn read_minimum_validator_node_signatures(&self) -> Result<u32, ChainAdapterError> {
        let n = self
            .quorum_read(|p| async move {
                self.forwarder(p)
                    .getMinimumValidatorNodeSignatures()
                    .call()
                    .await
                    .map_err(|e| ChainAdapterError::Contract(e.to_string()))
            })
            .await?;
        Ok(n.to::<u32>())
    }

    async fn read_validator_node_addresses(&self) -> Result<Vec<Address>, ChainAdapterError> {
        self.quorum_read(|p| async move {
            self.forwarder(p)
                .getValidatorNodes()
                .call()
                .await
                .map_err(|e| ChainAdapterError::Contract(e.to_string()))
        })
        .await
    }

    async fn read_token_decimals(&self, token: Address) -> Result<u8, ChainAdapterError> {
        self.quorum_read(|p| async move {
            IERC20Decimals::new(token, p)
                .decimals()
                .call()
                .await
                .map_err(|e| ChainAdapterError::Contract(e.to_string()))
        })
        .await
    }

    async fn read_outgoing_transfers_from_block(
        &self,
        from_block: i64,
    ) -> Result<(Vec<CrossChainTransfer>, i64), ChainAdapterError> {
        let outgoing_transfers_number_blocks = self.outgoing_transfers_number_blocks as i64;
        let hub_address = self.hub_address;
        self.quorum_read(|provider| async move {
            let latest = provider
                .get_block_number()
                .await
                .map_err(|e| ChainAdapterError::Transient(e.to_string()))? as i64;
            if from_block > latest {
                return Ok((Vec::new(), latest));
            }
            let to_block = (from_block + outgoing_transfers_number_blocks - 1).min(latest);
            let filter = Filter::new()
                .address(hub_address)
                .event_signature(TransferFromSucceeded::SIGNATURE_HASH)
                .from_block(from_block as u64)
                .to_block(to_block as u64);
            let logs = provider
                .get_logs(&filter)
                .await
                .map_err(|e| ChainAdapterError::Transient(e.to_string()))?;
            let transfers = logs
                .iter()
                .filter_map(|log| self.decode_transfer_from_succeeded(log, hub_address))
                .collect();
            Ok((transfers, to_block))
        })
        .await
    }

    async fn read_outgoing_transfers_in_transaction(
        &self,
        source_transaction_id: &str,
        hub_address: Address,
    ) -> Result<Vec<CrossChainTransfer>, ChainAdapterError> {
        let tx_hash: B256 = source_transaction_id
            .parse()
            .map_err(|_| ChainAdapterError::InvalidAddress(source_transaction_id.to_string()))?;
        self.quorum_read(|provider| async move {
            let receipt = provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| ChainAdapterError::Transient(e.to_string()))?
                .ok_or_else(|| ChainAdapterError::Transient("receipt not found".into()))?;
            let transfers = receipt
                .inner
                .logs()
                .iter()
                .filter_map(|log| self.decode_transfer_from_succeeded(log, hub_address))
                .collect();
            Ok(transfers)
        })
        .await
    }

    fn recover_transfer_to_signer_address(
        &self,
        signature: &str,
        input: TransferToMessageInput,
    ) -> Result<Address, ChainAdapterError> {
        let domain =
            eip712::transfer_to_domain(self.protocol_major, self.chain_id_u64, self.forwarder_address);
        Ok(eip712::recover_transfer_to_signer_address(
            signature, input, &domain,
        )?)
    }

    async fn sign_transfer_to_message(
        &self,
        input: TransferToMessageInput,
    ) -> Result<String, ChainAdapterError> {
        let domain =
            eip712::transfer_to_domain(self.protocol_major, self.chain_id_u64, self.forwarder_address);
        Ok(eip712::sign_transfer_to_message(&self.signer, input, &domain).await?)
    }

    async fn start_transfer_to_submission(
        &self,
        submission: TransferToSubmission,
    ) -> Result<Uuid, ChainAdapterError> {
        let request = &submission.request;

        // Pre-flight simulation surfaces NonMatchingForwarderError and
        // SourceTransferIdAlreadyUsedError as permanent failures (§4.2.1)
        // before we pay gas for a transaction we know will revert. Run
        // across every configured provider (quorum_read) so a single
        // lagging or misbehaving RPC node can't wave through a call the
        // others would reject.
        self.quorum_read(|provider| async move {
            self.forwarder(provider)
                .verifyTransferTo(
                    U256::from(request.source_blockchain_id.0 as u64),
                    request.source_transfer_id,
                    request.source_transaction_id.clone(),
                    request.sender.clone(),
                    request.recipient,
                    request.source_token.clone(),
                    request.destination_token,
                    request.amount,
                    request.validator_nonce,
                )
                .call()
                .await
                .map(|_| ())
                .map_err(|e| classify_revert(&e.to_string()))
        })
        .await?;

        let provider = self.read_providers[0].clone();
        let forwarder = self.forwarder(provider);
        let signatures: Vec<alloy_primitives::Bytes> = submission
            .signatures
            .iter()
            .map(|s| {
                hex::decode(s.trim_start_matches("0x"))
                    .map(alloy_primitives::Bytes::from)
                    .map_err(|e| ChainAdapterError::InvalidAddress(e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let call = forwarder.transferTo(
            U256::from(request.source_blockchain_id.0 as u64),
            request.source_transfer_id,
            request.source_transaction_id.clone(),
            request.sender.clone(),
            request.recipient,
            request.source_token.clone(),
            request.destination_token,
            request.amount,
            request.validator_nonce,
            submission.signers.clone(),
            signatures,
        );
        let calldata = call.calldata().clone();
        let gas_limit =
            self.base_gas + self.per_signer_gas * submission.signers.len() as u64;

        let tx_hash = self
            .send_forwarder_call(
                &calldata,
                gas_limit,
                submission.account_nonce,
                self.min_adaptable_fee_per_gas,
            )
            .await?;

        let internal_tx_id = Uuid::new_v4();
        let now = std::time::Instant::now();
        self.submissions.insert(
            internal_tx_id,
            PendingSubmission {
                tx_hash: std::sync::Mutex::new(Some(tx_hash)),
                submitted_at: now,
                last_submitted_at: std::sync::Mutex::new(now),
                max_fee_per_gas: AtomicU64::new(self.min_adaptable_fee_per_gas as u64),
                call: ResubmittableCall {
                    calldata,
                    account_nonce: submission.account_nonce,
                    signer_count: submission.signers.len() as u64,
                },
            },
        );
        Ok(internal_tx_id)
    }

    async fn get_transfer_to_submission_status(
        &self,
        internal_tx_id: Uuid,
    ) -> Result<SubmissionStatus, ChainAdapterError> {
        let entry = self.submissions.get(&internal_tx_id).ok_or_else(|| {
            ChainAdapterError::UnresolvableTransferToSubmission(format!(
                "no in-flight submission for {internal_tx_id}"
            ))
        })?;
        let tx_hash = entry
            .tx_hash
            .lock()
            .expect("submission mutex poisoned")
            .ok_or_else(|| {
                ChainAdapterError::UnresolvableTransferToSubmission(
                    "submission has no tracked transaction hash".into(),
                )
            })?;

        let summary = self
            .quorum_read(|provider| async move {
                let receipt = provider
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(|e| ChainAdapterError::Transient(e.to_string()))?;
                Ok(receipt.map(|r| {
                    let destination_transfer_id = r
                        .inner
                        .logs()
                        .iter()
                        .find_map(|log| log.log_decode::<TransferToSucceeded>().ok())
                        .map(|decoded| decoded.inner.data.destinationTransferId);
                    ReceiptSummary {
                        status: r.status(),
                        block_number: r.block_number,
                        destination_transfer_id,
                    }
                }))
            })
            .await?;

        let Some(summary) = summary else {
            if entry.submitted_at.elapsed() > Duration::from_secs(600) {
                return Err(ChainAdapterError::UnresolvableTransferToSubmission(
                    "submission timed out waiting for inclusion".into(),
                ));
            }

            // Still pending: escalate `maxFeePerGas` by
            // `adaptable_fee_increase_factor` every `blocks_until_resubmission`
            // blocks' worth of elapsed wall-clock time (§4.2.4). Capped at
            // `max_total_fee_per_gas` when configured; resubmission is
            // skipped once the cap is already in effect.
            let resubmission_window =
                Duration::from_secs(self.blocks_until_resubmission * self.average_block_time.max(1));
            let due_for_resubmission = {
                let last = entry.last_submitted_at.lock().expect("mutex poisoned");
                last.elapsed() >= resubmission_window
            };
            if due_for_resubmission {
                let current_fee = entry.max_fee_per_gas.load(std::sync::atomic::Ordering::SeqCst);
                let bumped_fee = ((current_fee as f64) * self.adaptable_fee_increase_factor) as u128;
                let bumped_fee = match self.max_total_fee_per_gas {
                    Some(cap) => bumped_fee.min(cap),
                    None => bumped_fee,
                };
                if bumped_fee as u64 > current_fee {
                    let gas_limit = self.base_gas + self.per_signer_gas * entry.call.signer_count;
                    match self
                        .send_forwarder_call(
                            &entry.call.calldata,
                            gas_limit,
                            entry.call.account_nonce,
                            bumped_fee,
                        )
                        .await
                    {
                        Ok(new_tx_hash) => {
                            *entry.tx_hash.lock().expect("mutex poisoned") = Some(new_tx_hash);
                            *entry.last_submitted_at.lock().expect("mutex poisoned") =
                                std::time::Instant::now();
                            entry
                                .max_fee_per_gas
                                .store(bumped_fee as u64, std::sync::atomic::Ordering::SeqCst);
                            tracing::info!(
                                tx_id = %internal_tx_id,
                                old_fee = current_fee,
                                new_fee = bumped_fee,
                                "resubmitted transferTo with bumped fee"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(tx_id = %internal_tx_id, error = %e, "fee-bump resubmission failed");
                        }
                    }
                }
            }

            return Ok(SubmissionStatus::Pending);
        };

        let block_number = summary.block_number.unwrap_or_default() as i64;
        let destination_transaction_id = format!("0x{tx_hash:x}");
        if !summary.status {
            self.submissions.remove(&internal_tx_id);
            return Ok(SubmissionStatus::Reverted {
                destination_transaction_id,
                destination_block_number: block_number,
            });
        }

        let destination_transfer_id = summary
            .destination_transfer_id
            .ok_or_else(|| {
                ChainAdapterError::UnresolvableTransferToSubmission(
                    "transferTo confirmed but TransferToSucceeded was not emitted".into(),
                )
            })?;

        self.submissions.remove(&internal_tx_id);
        Ok(SubmissionStatus::Confirmed {
            destination_transaction_id,
            destination_block_number: block_number,
            destination_transfer_id,
        })
    }

    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<SourceTransactionStatus, ChainAdapterError> {
        let tx_hash: B256 = transaction_id
            .parse()
            .map_err(|_| ChainAdapterError::InvalidAddress(transaction_id.to_string()))?;
        let confirmations = self.confirmations;
        self.quorum_read(|provider| async move {
            let Some(receipt) = provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| ChainAdapterError::Transient(e.to_string()))?
            else {
                return Ok(SourceTransactionStatus::Unincluded);
            };
            if !receipt.status() {
                return Ok(SourceTransactionStatus::Reverted);
            }
            let latest = provider
                .get_block_number()
                .await
                .map_err(|e| ChainAdapterError::Transient(e.to_string()))?;
            let included_at = receipt.block_number.unwrap_or(latest);
            if latest.saturating_sub(included_at) >= confirmations {
                Ok(SourceTransactionStatus::Confirmed)
            } else {
                Ok(SourceTransactionStatus::Unconfirmed)
            }
        })
        .await
    }

    async fn get_own_transaction_count(&self) -> Result<u64, ChainAdapterError> {
        self.quorum_read(|provider| async move {
            provider
                .get_transaction_count(self.signer.address())
                .await
                .map_err(|e| ChainAdapterError::Transient(e.to_string()))
        })
        .await
    }

    async fn check_protocol_version(
        &self,
        expected: &semver::Version,
    ) -> Result<(), ChainAdapterError> {
        let expected_major = expected.major;
        let (hub_version, forwarder_version) = self
            .quorum_read(|provider| async move {
                let hub_version = self
                    .hub(provider.clone())
                    .protocolVersion()
                    .call()
                    .await
                    .map_err(|e| ChainAdapterError::Contract(e.to_string()))?;
                let forwarder_version = self
                    .forwarder(provider)
                    .protocolVersion()
                    .call()
                    .await
                    .map_err(|e| ChainAdapterError::Contract(e.to_string()))?;
                Ok((hub_version, forwarder_version))
            })
            .await?;
        let hub_version: semver::Version = hub_version
            .parse()
            .map_err(|e: semver::Error| ChainAdapterError::Contract(e.to_string()))?;
        let forwarder_version: semver::Version = forwarder_version
            .parse()
            .map_err(|e: semver::Error| ChainAdapterError::Contract(e.to_string()))?;
        if hub_version.major != expected_major || forwarder_version.major != expected_major {
            return Err(ChainAdapterError::Contract(format!(
                "protocol major version mismatch: configured {expected}, hub {hub_version}, forwarder {forwarder_version}"
            )));
        }
        Ok(())
    }
}

/// Maps a `verifyTransferTo` revert reason to the two permanent-failure
/// kinds named in §4.2.1; anything else is treated as transient.
fn classify_revert(message: &str) -> ChainAdapterError {
    if message.contains("NonMatchingForwarder") {
        ChainAdapterError::NonMatchingForwarder
    } else if message.contains("SourceTransferIdAlreadyUsed") {
        ChainAdapterError::SourceTransferIdAlreadyUsed
    } else {
        ChainAdapterError::Transient(message.to_string())
    }
}

/// Maps a transaction-submission failure to the nonce-reset-triggering
/// kind when the node reports "nonce too low"/"underpriced" (§4.2.3),
/// otherwise treats it as a contract/transient error.
fn classify_submission_error(message: &str) -> ChainAdapterError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("nonce too low") || lower.contains("underpriced") {
        ChainAdapterError::NonceStale(message.to_string())
    } else {
        classify_revert(message)
    }
}
