//! Integration coverage for the §4.2.3 nonce-arbitration rule in
//! `Store::update_transfer_nonce`: a fresh submission either recycles the
//! lowest-nonced `*_FAILED` transfer on the destination chain, or is handed
//! the latest observed account nonce (bumped past any in-use value).

use alloy_primitives::U256;
use sqlx::PgPool;
use transfer_validator_node::domain::{BlockchainAddress, ChainId, ContractKind, TransferStatus};
use transfer_validator_node::store::{CreateTransferRequest, Store};

async fn seed_chain_and_contracts(store: &Store, chain: ChainId) -> (i64, i64, i64) {
    store.upsert_chain(chain, "test-chain").await.unwrap();
    let hub = store
        .upsert_contract(chain, &BlockchainAddress("0x1111111111111111111111111111111111111111".to_string()), ContractKind::Hub)
        .await
        .unwrap();
    let forwarder = store
        .upsert_contract(chain, &BlockchainAddress("0x2222222222222222222222222222222222222222".to_string()), ContractKind::Forwarder)
        .await
        .unwrap();
    let token = store
        .upsert_contract(chain, &BlockchainAddress("0x5555555555555555555555555555555555555555".to_string()), ContractKind::Token)
        .await
        .unwrap();
    (hub, forwarder, token)
}

fn request(
    source_chain: ChainId,
    destination_chain: ChainId,
    hub: i64,
    forwarder: i64,
    token: i64,
    source_tx: &str,
    validator_nonce: U256,
) -> CreateTransferRequest {
    CreateTransferRequest {
        source_chain,
        destination_chain,
        sender_address: BlockchainAddress("0x3333333333333333333333333333333333333333".to_string()),
        recipient_address: BlockchainAddress("0x4444444444444444444444444444444444444444".to_string()),
        source_token: token,
        destination_token: token,
        amount: U256::from(100u64),
        validator_nonce,
        source_hub_contract: hub,
        destination_forwarder_contract: forwarder,
        source_transfer_id: U256::from(1u64),
        source_transaction_id: source_tx.to_string(),
        source_block_number: 10,
        source_block_hash: "0xblockhash".to_string(),
    }
}

#[sqlx::test]
async fn assigns_latest_observed_nonce_when_nothing_to_recycle(pool: PgPool) {
    let store = Store::from_pool(pool);
    let source = ChainId(1);
    let destination = ChainId(2);
    let (hub, _, token) = seed_chain_and_contracts(&store, source).await;
    let (_, forwarder, _) = seed_chain_and_contracts(&store, destination).await;

    let transfer_id = store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx1", U256::from(1u64)))
        .await
        .unwrap();

    let assigned = store
        .update_transfer_nonce(transfer_id, destination, 7)
        .await
        .unwrap();

    assert_eq!(assigned, 7);
    let transfer = store.read_transfer(transfer_id).await.unwrap();
    assert_eq!(transfer.nonce, Some(7));
}

#[sqlx::test]
async fn bumps_past_an_already_occupied_nonce(pool: PgPool) {
    let store = Store::from_pool(pool);
    let source = ChainId(1);
    let destination = ChainId(2);
    let (hub, _, token) = seed_chain_and_contracts(&store, source).await;
    let (_, forwarder, _) = seed_chain_and_contracts(&store, destination).await;

    let occupant = store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx1", U256::from(1u64)))
        .await
        .unwrap();
    store.update_transfer_nonce(occupant, destination, 7).await.unwrap();

    let transfer_id = store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx2", U256::from(2u64)))
        .await
        .unwrap();
    let assigned = store
        .update_transfer_nonce(transfer_id, destination, 7)
        .await
        .unwrap();

    assert_eq!(assigned, 8, "nonce 7 is already taken, must bump past it");
}

#[sqlx::test]
async fn recycles_lowest_nonced_failed_transfer(pool: PgPool) {
    let store = Store::from_pool(pool);
    let source = ChainId(1);
    let destination = ChainId(2);
    let (hub, _, token) = seed_chain_and_contracts(&store, source).await;
    let (_, forwarder, _) = seed_chain_and_contracts(&store, destination).await;

    let failed = store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx1", U256::from(1u64)))
        .await
        .unwrap();
    store.update_transfer_nonce(failed, destination, 3).await.unwrap();
    store
        .update_transfer_status(failed, TransferStatus::DestinationTransactionFailed)
        .await
        .unwrap();

    let transfer_id = store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx2", U256::from(2u64)))
        .await
        .unwrap();
    let assigned = store
        .update_transfer_nonce(transfer_id, destination, 99)
        .await
        .unwrap();

    assert_eq!(assigned, 3, "should recycle the failed transfer's nonce rather than draw a fresh one");

    // The recycled row keeps its `*_FAILED` status and only loses its nonce;
    // the new transfer is the one that advances to `*_NEW_NONCE_ASSIGNED`.
    let recycled = store.read_transfer(failed).await.unwrap();
    assert_eq!(recycled.nonce, None);
    assert_eq!(recycled.status, TransferStatus::DestinationTransactionFailed);

    let new_transfer = store.read_transfer(transfer_id).await.unwrap();
    assert_eq!(new_transfer.nonce, Some(3));
    assert_eq!(
        new_transfer.status,
        TransferStatus::SourceTransactionDetectedNewNonceAssigned
    );
}

#[sqlx::test]
async fn create_transfer_rejects_duplicate_validator_nonce(pool: PgPool) {
    let store = Store::from_pool(pool);
    let source = ChainId(1);
    let destination = ChainId(2);
    let (hub, _, token) = seed_chain_and_contracts(&store, source).await;
    let (_, forwarder, _) = seed_chain_and_contracts(&store, destination).await;

    store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx1", U256::from(42u64)))
        .await
        .unwrap();

    let result = store
        .create_transfer(&request(source, destination, hub, forwarder, token, "0xtx2", U256::from(42u64)))
        .await;

    assert!(matches!(
        result,
        Err(transfer_validator_node::store::StoreError::ValidatorNonceNotUnique)
    ));
}
