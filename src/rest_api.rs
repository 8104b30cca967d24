//! HTTP surface a secondary node's [`crate::primary_client::PrimaryClient`]
//! talks to, plus the operational health endpoints (§4.6.5, §6).
//!
//! `POST /transfersignature` runs the six-step ingestion check the spec
//! lays out: schema, source-chain liveness, transaction-id syntax, transfer
//! lookup, signature recovery, signer registration, then the idempotent
//! insert. `GET /validatornonce` just reads back the nonce the Detector
//! already assigned. Status-code mapping here is the server side of the
//! one [`crate::primary_client::PrimaryClientError`] already maps on the
//! client side — the two modules must stay in lockstep.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::app_context::AppContext;
use crate::coordinator::{self, CoordinatorError};
use crate::domain::{BlockchainAddress, ChainId};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RestApiError {
    #[error("unknown or inactive source blockchain")]
    UnknownSourceChain,
    #[error("malformed source transaction id")]
    InvalidTransactionId,
    #[error("Unknown transfer.")]
    TransferNotFound,
    #[error("Invalid signature.")]
    InvalidSignature,
    #[error("Invalid signer.")]
    InvalidSigner,
    #[error("Duplicate signature.")]
    DuplicateSignature,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            RestApiError::UnknownSourceChain
            | RestApiError::InvalidTransactionId
            | RestApiError::InvalidSignature => StatusCode::BAD_REQUEST,
            RestApiError::TransferNotFound => StatusCode::NOT_FOUND,
            RestApiError::InvalidSigner => StatusCode::FORBIDDEN,
            RestApiError::DuplicateSignature => StatusCode::CONFLICT,
            RestApiError::Store(_) | RestApiError::Coordinator(_) => {
                tracing::error!(error = %self, "transfersignature handler failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { message: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TransferSignatureBody {
    source_blockchain_id: i32,
    source_transaction_id: String,
    signature: String,
}

async fn post_transfer_signature(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<TransferSignatureBody>,
) -> Result<StatusCode, RestApiError> {
    let source_chain = ChainId(body.source_blockchain_id);
    let source_adapter = ctx
        .chain(source_chain)
        .ok_or(RestApiError::UnknownSourceChain)?
        .clone();
    if !source_adapter.is_valid_transaction_id(&body.source_transaction_id) {
        return Err(RestApiError::InvalidTransactionId);
    }

    let projection = ctx
        .store
        .read_transfer_to_data(source_chain, &body.source_transaction_id)
        .await?
        .ok_or(RestApiError::TransferNotFound)?;
    let transfer = ctx.store.read_transfer(projection.transfer_id).await?;

    let destination_adapter = ctx
        .chain(transfer.eventual_destination_chain())
        .ok_or(RestApiError::TransferNotFound)?
        .clone();
    let input = coordinator::build_message_input(&ctx, &transfer).await?;
    let signer_address = destination_adapter
        .recover_transfer_to_signer_address(&body.signature, input)
        .map_err(|_| RestApiError::InvalidSignature)?;

    let forwarder_contract_id = transfer
        .destination_forwarder_contract
        .ok_or(RestApiError::TransferNotFound)?;
    let validator_node_id = ctx
        .store
        .read_validator_node_id(forwarder_contract_id, &BlockchainAddress::from(signer_address))
        .await?
        .ok_or(RestApiError::InvalidSigner)?;

    let inserted = ctx
        .store
        .insert_validator_node_signature(projection.transfer_id, validator_node_id, &body.signature)
        .await?;
    if inserted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RestApiError::DuplicateSignature)
    }
}

#[derive(Debug, Deserialize)]
struct ValidatorNonceQuery {
    source_blockchain_id: i32,
    source_transaction_id: String,
}

#[derive(Debug, Serialize)]
struct ValidatorNonceBody {
    validator_nonce: String,
}

async fn get_validator_nonce(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ValidatorNonceQuery>,
) -> Result<Json<ValidatorNonceBody>, RestApiError> {
    let projection = ctx
        .store
        .read_transfer_to_data(ChainId(query.source_blockchain_id), &query.source_transaction_id)
        .await?
        .ok_or(RestApiError::TransferNotFound)?;
    Ok(Json(ValidatorNonceBody {
        validator_nonce: projection.validator_nonce.to_string(),
    }))
}

async fn health_live() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct ChainHealth {
    chain_id: i32,
    chain_name: String,
    last_block_scanned: i64,
    own_address: String,
}

async fn health_nodes(State(ctx): State<Arc<AppContext>>) -> Result<Json<Vec<ChainHealth>>, RestApiError> {
    let mut statuses = Vec::new();
    for (chain_id, adapter) in ctx.chains() {
        let (name, _) = ctx
            .config
            .chain_by_id(*chain_id)
            .expect("every adapter was built from an active config entry");
        let last_block_scanned = ctx.store.read_blockchain_last_block(*chain_id).await?;
        statuses.push(ChainHealth {
            chain_id: chain_id.0,
            chain_name: name.clone(),
            last_block_scanned,
            own_address: adapter.own_address().to_string(),
        });
    }
    Ok(Json(statuses))
}

/// Builds the router, ready to be `.with_state(ctx)`'d and merged into the
/// server's top-level `Router` alongside the CORS/trace layers.
pub fn routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/transfersignature", post(post_transfer_signature))
        .route("/validatornonce", get(get_validator_nonce))
        .route("/health/live", get(health_live))
        .route("/health/nodes", get(health_nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes_match_primary_client_expectations() {
        assert_eq!(
            RestApiError::InvalidTransactionId.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RestApiError::TransferNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RestApiError::InvalidSigner.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RestApiError::DuplicateSignature.into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
