//! Persistent state for transfers, contracts, validator nodes and
//! signatures (§4.1). All mutations that can race — validator-nonce
//! creation, signature creation, nonce arbitration — run inside an
//! explicit `SERIALIZABLE` transaction; everything else rides the pool's
//! default read-committed transactions, mirroring the original's
//! selective use of nested transactions (see SPEC_FULL.md §4.1).

mod numeric;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    BlockchainAddress, ChainId, ContractKind, CrossChainTransfer, Transfer, TransferStatus,
    ValidatorNodeSignature,
};
use numeric::{decimal_to_u256, u256_to_decimal};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("the drawn validator nonce is already used on the destination forwarder")]
    ValidatorNonceNotUnique,
    #[error("blockchain {0} last_block_scanned update rejected: would move backwards")]
    LastBlockWentBackwards(ChainId),
    #[error("transfer {0} not found")]
    TransferNotFound(i64),
    #[error("{0:?} contract {1} not found")]
    ContractNotFound(ContractKind, i64),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Everything needed to persist a freshly-detected transfer
/// (Detector → `create_transfer`).
pub struct CreateTransferRequest {
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub sender_address: BlockchainAddress,
    pub recipient_address: BlockchainAddress,
    pub source_token: i64,
    pub destination_token: i64,
    pub amount: U256,
    pub validator_nonce: U256,
    pub source_hub_contract: i64,
    pub destination_forwarder_contract: i64,
    pub source_transfer_id: U256,
    pub source_transaction_id: String,
    pub source_block_number: i64,
    pub source_block_hash: String,
}

/// Aggregated projection used by REST signature validation
/// (`read_transfer_to_data`): just enough to check a posted signature's
/// signer against the registered validator set without loading the full
/// [`Transfer`] row.
pub struct TransferSignatureProjection {
    pub transfer_id: i64,
    pub destination_chain: ChainId,
    pub destination_forwarder_address: BlockchainAddress,
    pub validator_nonce: U256,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(
        database_url: &str,
        pool_size: u32,
        apply_migrations: bool,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await?;
        if apply_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wraps an already-connected pool, e.g. the one `#[sqlx::test]`
    /// provides to integration tests.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_chain(&self, id: ChainId, name: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blockchains (id, name) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(id.0)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_contract(
        &self,
        chain_id: ChainId,
        address: &BlockchainAddress,
        kind: ContractKind,
    ) -> Result<i64, StoreError> {
        let table = match kind {
            ContractKind::Hub => "hub_contracts",
            ContractKind::Forwarder => "forwarder_contracts",
            ContractKind::Token => "token_contracts",
        };
        let query = format!(
            "INSERT INTO {table} (chain_id, address) VALUES ($1, $2)
             ON CONFLICT (chain_id, address) DO UPDATE SET address = EXCLUDED.address
             RETURNING id"
        );
        let (id,): (i64,) = sqlx::query_as(&query)
            .bind(chain_id.0)
            .bind(address.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Reads a contract's address by its row id and kind. The Validator and
    /// Coordinator hold only the `i64` contract ids on a [`Transfer`] row
    /// and resolve the on-chain address through here when they need to talk
    /// to a ChainAdapter.
    pub async fn read_contract_address(
        &self,
        kind: ContractKind,
        id: i64,
    ) -> Result<BlockchainAddress, StoreError> {
        let table = match kind {
            ContractKind::Hub => "hub_contracts",
            ContractKind::Forwarder => "forwarder_contracts",
            ContractKind::Token => "token_contracts",
        };
        let query = format!("SELECT address FROM {table} WHERE id = $1");
        let row: Option<(String,)> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(address,)| BlockchainAddress(address))
            .ok_or(StoreError::ContractNotFound(kind, id))
    }

    pub async fn upsert_validator_node(
        &self,
        forwarder_contract_id: i64,
        address: &BlockchainAddress,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO validator_nodes (forwarder_contract_id, address) VALUES ($1, $2)
             ON CONFLICT (forwarder_contract_id, address) DO UPDATE SET address = EXCLUDED.address
             RETURNING id",
        )
        .bind(forwarder_contract_id)
        .bind(address.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Resolves a signer's row id on a given Forwarder, used by both the
    /// REST signature-ingestion path (§4.6.5) and the Coordinator when it
    /// persists its own signature.
    pub async fn read_validator_node_id(
        &self,
        forwarder_contract_id: i64,
        address: &BlockchainAddress,
    ) -> Result<Option<i64>, StoreError> {
        let rows = self.read_validator_node_ids(forwarder_contract_id).await?;
        Ok(rows
            .into_iter()
            .find(|(_, addr)| BlockchainAddress(addr.clone()) == *address)
            .map(|(id, _)| id))
    }

    pub async fn read_validator_node_ids(
        &self,
        forwarder_contract_id: i64,
    ) -> Result<Vec<(i64, String)>, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, address FROM validator_nodes WHERE forwarder_contract_id = $1",
        )
        .bind(forwarder_contract_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn read_blockchain_last_block(&self, chain: ChainId) -> Result<i64, StoreError> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT last_block_scanned FROM blockchains WHERE id = $1")
                .bind(chain.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(n)
    }

    /// Monotonic: fails if `n < current` (§4.1, §5 ordering guarantee).
    pub async fn update_blockchain_last_block(
        &self,
        chain: ChainId,
        n: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE blockchains SET last_block_scanned = $2
             WHERE id = $1 AND last_block_scanned <= $2",
        )
        .bind(chain.0)
        .bind(n)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::LastBlockWentBackwards(chain));
        }
        Ok(())
    }

    pub async fn read_transfer_id(
        &self,
        source_chain: ChainId,
        source_transaction_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM transfers WHERE source_chain = $1 AND source_transaction_id = $2",
        )
        .bind(source_chain.0)
        .bind(source_transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn read_transfer(&self, transfer_id: i64) -> Result<Transfer, StoreError> {
        let row = sqlx::query_as::<_, TransferRow>("SELECT * FROM transfers WHERE id = $1")
            .bind(transfer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::TransferNotFound(transfer_id))?;
        Ok(row.into_domain())
    }

    pub async fn read_transfer_to_data(
        &self,
        source_chain: ChainId,
        source_transaction_id: &str,
    ) -> Result<Option<TransferSignatureProjection>, StoreError> {
        let row: Option<(i64, i32, String, sqlx::types::BigDecimal)> = sqlx::query_as(
            "SELECT t.id, t.destination_chain, fc.address, t.validator_nonce
             FROM transfers t
             LEFT JOIN forwarder_contracts fc ON fc.id = t.destination_forwarder_contract
             WHERE t.source_chain = $1 AND t.source_transaction_id = $2",
        )
        .bind(source_chain.0)
        .bind(source_transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(transfer_id, destination_chain, forwarder_address, validator_nonce)| {
                TransferSignatureProjection {
                    transfer_id,
                    destination_chain: ChainId(destination_chain),
                    destination_forwarder_address: BlockchainAddress(forwarder_address),
                    validator_nonce: decimal_to_u256(validator_nonce),
                }
            },
        ))
    }

    /// Creates a transfer row, retrying the caller's random draw on a
    /// `(destination_forwarder_contract, validator_nonce)` collision
    /// (§3, §4.1). Runs under `SERIALIZABLE` since the nonce uniqueness
    /// constraint is the race the spec calls out explicitly.
    pub async fn create_transfer(
        &self,
        req: &CreateTransferRequest,
    ) -> Result<i64, StoreError> {
        let mut tx = begin_serializable(&self.pool).await?;
        let result = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO transfers (
                source_chain, destination_chain, sender_address, recipient_address,
                source_token, destination_token, amount, validator_nonce,
                source_hub_contract, destination_forwarder_contract,
                source_transfer_id, source_transaction_id, source_block_number,
                source_block_hash, status
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,'SOURCE_TRANSACTION_DETECTED')
            RETURNING id",
        )
        .bind(req.source_chain.0)
        .bind(req.destination_chain.0)
        .bind(req.sender_address.as_str())
        .bind(req.recipient_address.as_str())
        .bind(req.source_token)
        .bind(req.destination_token)
        .bind(u256_to_decimal(req.amount))
        .bind(u256_to_decimal(req.validator_nonce))
        .bind(req.source_hub_contract)
        .bind(req.destination_forwarder_contract)
        .bind(u256_to_decimal(req.source_transfer_id))
        .bind(&req.source_transaction_id)
        .bind(req.source_block_number)
        .bind(&req.source_block_hash)
        .fetch_one(&mut *tx)
        .await;

        match result {
            Ok((id,)) => {
                tx.commit().await?;
                Ok(id)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("transfers_destination_forwarder_contract_validator_nonce_key") =>
            {
                tx.rollback().await.ok();
                Err(StoreError::ValidatorNonceNotUnique)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e.into())
            }
        }
    }

    pub async fn update_transfer_status(
        &self,
        transfer_id: i64,
        status: TransferStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE transfers SET status = $2, updated = now() WHERE id = $1")
            .bind(transfer_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_transfer_task_id(
        &self,
        transfer_id: i64,
        task_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE transfers SET task_id = $2, updated = now() WHERE id = $1")
            .bind(transfer_id)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Updates `source_transfer_id`/`source_block_number` when the Hub
    /// renumbered a transfer because its transaction landed in a different
    /// block than first assumed (§4.6.1 step 2).
    pub async fn update_transfer_source_transaction(
        &self,
        transfer_id: i64,
        source_transfer_id: U256,
        source_block_number: i64,
        source_block_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfers
             SET source_transfer_id = $2, source_block_number = $3, source_block_hash = $4,
                 updated = now()
             WHERE id = $1",
        )
        .bind(transfer_id)
        .bind(u256_to_decimal(source_transfer_id))
        .bind(source_block_number)
        .bind(source_block_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_transfer_validator_nonce(
        &self,
        transfer_id: i64,
        validator_nonce: U256,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE transfers SET validator_nonce = $2, updated = now() WHERE id = $1")
            .bind(transfer_id)
            .bind(u256_to_decimal(validator_nonce))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks a transfer as a reversal: the eventual destination becomes the
    /// source chain/Hub/Forwarder/token (§4.6.1 step 5, §9 Open Question 2:
    /// "reversal routes to the same destination_forwarder_contract/
    /// hub_contract as computed for eventual_destination_blockchain").
    pub async fn update_reversal_transfer(
        &self,
        transfer_id: i64,
        source_hub_contract: i64,
        destination_forwarder_contract: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfers
             SET is_reversal = TRUE,
                 destination_hub_contract = $2,
                 destination_forwarder_contract = $3,
                 updated = now()
             WHERE id = $1",
        )
        .bind(transfer_id)
        .bind(source_hub_contract)
        .bind(destination_forwarder_contract)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_transfer_submitted_destination_transaction(
        &self,
        transfer_id: i64,
        destination_hub_contract: i64,
        destination_forwarder_contract: i64,
        status: TransferStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfers
             SET destination_hub_contract = $2,
                 destination_forwarder_contract = $3,
                 status = $4,
                 updated = now()
             WHERE id = $1",
        )
        .bind(transfer_id)
        .bind(destination_hub_contract)
        .bind(destination_forwarder_contract)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_transfer_confirmed_destination_transaction(
        &self,
        transfer_id: i64,
        destination_transfer_id: U256,
        destination_transaction_id: &str,
        destination_block_number: i64,
        status: TransferStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfers
             SET destination_transfer_id = $2,
                 destination_transaction_id = $3,
                 destination_block_number = $4,
                 status = $5,
                 updated = now()
             WHERE id = $1",
        )
        .bind(transfer_id)
        .bind(u256_to_decimal(destination_transfer_id))
        .bind(destination_transaction_id)
        .bind(destination_block_number)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reset_transfer_nonce(&self, transfer_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE transfers SET nonce = NULL, updated = now() WHERE id = $1")
            .bind(transfer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Implements the §4.2.3 nonce-arbitration rule: given the latest
    /// observed destination-chain account nonce, either assigns a fresh
    /// nonce to `transfer_id` or recycles the lowest-nonced `*_FAILED`
    /// transfer on that chain. A single UPDATE touches at most two
    /// candidate rows (the new transfer and the recycled one); it does not
    /// block on other chains' submissions.
    pub async fn update_transfer_nonce(
        &self,
        transfer_id: i64,
        destination_chain: ChainId,
        latest_observed_account_nonce: i64,
    ) -> Result<i64, StoreError> {
        let mut tx = begin_serializable(&self.pool).await?;

        let recyclable: Option<(i64, i64, TransferStatus)> = sqlx::query_as(
            "SELECT id, nonce, status FROM transfers
             WHERE destination_chain = $1 AND nonce IS NOT NULL
               AND status IN ('SOURCE_REVERSAL_TRANSACTION_FAILED', 'DESTINATION_TRANSACTION_FAILED')
             ORDER BY nonce ASC
             LIMIT 1
             FOR UPDATE",
        )
        .bind(destination_chain.0)
        .fetch_optional(&mut *tx)
        .await?;

        let assigned_nonce = match recyclable {
            Some((failed_transfer_id, recycled_nonce, _failed_status)) => {
                // The recycled row keeps its `*_FAILED` status and only has
                // its nonce nulled; the new transfer is the one that
                // advances to the `*_NEW_NONCE_ASSIGNED` variant (ground
                // truth: `database/access.py`'s nested CASE keys off
                // `Transfer.id == internal_transfer_id`, not the recycled
                // row).
                sqlx::query(
                    "UPDATE transfers SET nonce = NULL, updated = now() WHERE id = $1",
                )
                .bind(failed_transfer_id)
                .execute(&mut *tx)
                .await?;
                let current_status: TransferStatus = sqlx::query_as(
                    "SELECT status FROM transfers WHERE id = $1",
                )
                .bind(transfer_id)
                .fetch_one(&mut *tx)
                .await
                .map(|(status,): (TransferStatus,)| status)?;
                let new_status = current_status
                    .with_new_nonce_assigned()
                    .unwrap_or(current_status);
                sqlx::query(
                    "UPDATE transfers SET nonce = $2, status = $3, updated = now() WHERE id = $1",
                )
                .bind(transfer_id)
                .bind(recycled_nonce)
                .bind(new_status)
                .execute(&mut *tx)
                .await?;
                recycled_nonce
            }
            None => {
                let (existing_max,): (Option<i64>,) = sqlx::query_as(
                    "SELECT MAX(nonce) FROM transfers WHERE destination_chain = $1 AND nonce IS NOT NULL",
                )
                .bind(destination_chain.0)
                .fetch_one(&mut *tx)
                .await?;
                let assigned = match existing_max {
                    Some(max) if max >= latest_observed_account_nonce => max + 1,
                    _ => latest_observed_account_nonce,
                };
                sqlx::query(
                    "UPDATE transfers SET nonce = $2, updated = now() WHERE id = $1",
                )
                .bind(transfer_id)
                .bind(assigned)
                .execute(&mut *tx)
                .await?;
                assigned
            }
        };

        tx.commit().await?;
        Ok(assigned_nonce)
    }

    pub async fn create_validator_node_signature(
        &self,
        transfer_id: i64,
        validator_node_id: i64,
        signature: &str,
    ) -> Result<(), StoreError> {
        self.insert_validator_node_signature(transfer_id, validator_node_id, signature)
            .await?;
        Ok(())
    }

    /// Same insert, but tells the caller whether the row was newly created.
    /// The REST signature-ingestion path (§4.6.5) needs this distinction to
    /// answer `204` on first submission and `409` on a resubmit; the
    /// Coordinator's own idempotent bookkeeping does not and uses
    /// [`Self::create_validator_node_signature`] instead.
    pub async fn insert_validator_node_signature(
        &self,
        transfer_id: i64,
        validator_node_id: i64,
        signature: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = begin_serializable(&self.pool).await?;
        let result = sqlx::query(
            "INSERT INTO validator_node_signatures (transfer_id, validator_node_id, signature)
             VALUES ($1, $2, $3)",
        )
        .bind(transfer_id)
        .bind(validator_node_id)
        .bind(signature)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(true)
            }
            // Unique-violation on either the primary key or the global
            // signature uniqueness constraint is treated as "already
            // present" (§7: "Constraint races ... treat as success").
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                Ok(false)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e.into())
            }
        }
    }

    pub async fn read_validator_node_signature(
        &self,
        transfer_id: i64,
        validator_node_id: i64,
    ) -> Result<Option<ValidatorNodeSignature>, StoreError> {
        let row: Option<(i64, i64, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT transfer_id, validator_node_id, signature, created
             FROM validator_node_signatures WHERE transfer_id = $1 AND validator_node_id = $2",
        )
        .bind(transfer_id)
        .bind(validator_node_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(transfer_id, validator_node_id, signature, created)| ValidatorNodeSignature {
                transfer_id,
                validator_node_id,
                signature,
                created,
            },
        ))
    }

    pub async fn read_validator_node_signatures(
        &self,
        transfer_id: i64,
    ) -> Result<Vec<ValidatorNodeSignature>, StoreError> {
        let rows: Vec<(i64, i64, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT transfer_id, validator_node_id, signature, created
             FROM validator_node_signatures WHERE transfer_id = $1",
        )
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(transfer_id, validator_node_id, signature, created)| ValidatorNodeSignature {
                    transfer_id,
                    validator_node_id,
                    signature,
                    created,
                },
            )
            .collect())
    }
}

async fn begin_serializable(
    pool: &PgPool,
) -> Result<Transaction<'static, Postgres>, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Draws a random 256-bit validator nonce, per §4.5 step 5 ("randomly
/// generated, rejected and redrawn if the Forwarder reports it already
/// used").
pub fn draw_validator_nonce() -> U256 {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    U256::from_be_bytes(bytes)
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: i64,
    source_chain: i32,
    destination_chain: i32,
    sender_address: String,
    recipient_address: String,
    source_token: i64,
    destination_token: i64,
    amount: sqlx::types::BigDecimal,
    validator_nonce: sqlx::types::BigDecimal,
    source_hub_contract: i64,
    destination_hub_contract: Option<i64>,
    destination_forwarder_contract: Option<i64>,
    source_transfer_id: sqlx::types::BigDecimal,
    source_transaction_id: String,
    source_block_number: i64,
    source_block_hash: String,
    destination_transfer_id: Option<sqlx::types::BigDecimal>,
    destination_transaction_id: Option<String>,
    destination_block_number: Option<i64>,
    task_id: Option<Uuid>,
    nonce: Option<i64>,
    status: TransferStatus,
    is_reversal: bool,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl TransferRow {
    fn into_domain(self) -> Transfer {
        Transfer {
            id: self.id,
            source_chain: ChainId(self.source_chain),
            destination_chain: ChainId(self.destination_chain),
            sender_address: BlockchainAddress(self.sender_address),
            recipient_address: BlockchainAddress(self.recipient_address),
            source_token: self.source_token,
            destination_token: self.destination_token,
            amount: decimal_to_u256(self.amount),
            validator_nonce: decimal_to_u256(self.validator_nonce),
            source_hub_contract: self.source_hub_contract,
            destination_hub_contract: self.destination_hub_contract,
            destination_forwarder_contract: self.destination_forwarder_contract,
            source_transfer_id: decimal_to_u256(self.source_transfer_id),
            source_transaction_id: self.source_transaction_id,
            source_block_number: self.source_block_number,
            source_block_hash: self.source_block_hash,
            destination_transfer_id: self.destination_transfer_id.map(decimal_to_u256),
            destination_transaction_id: self.destination_transaction_id,
            destination_block_number: self.destination_block_number,
            task_id: self.task_id,
            nonce: self.nonce,
            status: self.status,
            is_reversal: self.is_reversal,
            created: self.created,
            updated: self.updated,
        }
    }
}

/// Reconciles a freshly-decoded [`CrossChainTransfer`] event against an
/// already-persisted [`Transfer`] row by value equality of the fields the
/// Hub could not have changed (§4.6.1 step 2: "If the stored transfer is
/// not byte-equal to any decoded event, scan alternative candidates") —
/// the full field set, including the token addresses, so that two transfers
/// in the same source transaction with the same sender/recipient/amount but
/// different tokens are never conflated.
pub async fn transfer_matches_event(
    store: &Store,
    transfer: &Transfer,
    event: &CrossChainTransfer,
) -> Result<bool, StoreError> {
    if !(transfer.source_chain == event.source_chain
        && transfer.destination_chain == event.destination_chain
        && transfer.sender_address == event.sender_address
        && transfer.recipient_address == event.recipient_address
        && transfer.amount == event.amount
        && transfer.is_reversal == event.is_reversal_transfer)
    {
        return Ok(false);
    }
    let source_token_address = store
        .read_contract_address(ContractKind::Token, transfer.source_token)
        .await?;
    let destination_token_address = store
        .read_contract_address(ContractKind::Token, transfer.destination_token)
        .await?;
    Ok(source_token_address == event.source_token_address
        && destination_token_address == event.destination_token_address)
}

