//! REST client a secondary validator uses to reach the primary (§4.3).
//!
//! Status-code-to-error mapping is grounded 1:1 on
//! `examples/original_source/pantos/validatornode/restclient.py`
//! (`PrimaryNodeClient`): a 404 on either endpoint means the primary has
//! never seen this transfer, 409/400/403 on `POST /transfersignature` map
//! to the duplicate/invalid-signature/invalid-signer cases the primary's
//! `RestAPI` can produce (§4.6.5).

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ChainId;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum PrimaryClientError {
    #[error("the primary node does not know this transfer")]
    UnknownTransfer,
    #[error("the primary node rejected the signature as a duplicate")]
    DuplicateSignature,
    #[error("the primary node rejected the signature as invalid")]
    InvalidSignature,
    #[error("the primary node rejected this validator as an unknown signer")]
    InvalidSigner,
    #[error("primary node request failed: {0}")]
    Client(String),
}

#[derive(Debug, Serialize)]
struct TransferSignaturePostBody {
    source_blockchain_id: i32,
    source_transaction_id: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorNonceResponse {
    validator_nonce: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client invoked only by secondary nodes (primaries never call it).
#[derive(Clone)]
pub struct PrimaryClient {
    base_url: url::Url,
    http: reqwest::Client,
}

impl PrimaryClient {
    pub fn new(primary_url: url::Url) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self {
            base_url: primary_url,
            http,
        }
    }

    /// `GET /validatornonce?source_blockchain_id&source_transaction_id`.
    pub async fn get_validator_nonce(
        &self,
        source_chain: ChainId,
        source_transaction_id: &str,
    ) -> Result<U256, PrimaryClientError> {
        let mut url = self
            .base_url
            .join("validatornonce")
            .map_err(|e| PrimaryClientError::Client(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("source_blockchain_id", &source_chain.0.to_string())
            .append_pair("source_transaction_id", source_transaction_id);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PrimaryClientError::Client(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PrimaryClientError::UnknownTransfer);
        }
        if !response.status().is_success() {
            return Err(PrimaryClientError::Client(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        let body: ValidatorNonceResponse = response
            .json()
            .await
            .map_err(|e| PrimaryClientError::Client(e.to_string()))?;
        body.validator_nonce
            .parse()
            .map_err(|_| PrimaryClientError::Client("malformed validator_nonce".into()))
    }

    /// `POST /transfersignature`.
    pub async fn post_transfer_signature(
        &self,
        source_chain: ChainId,
        source_transaction_id: &str,
        signature: &str,
    ) -> Result<(), PrimaryClientError> {
        let url = self
            .base_url
            .join("transfersignature")
            .map_err(|e| PrimaryClientError::Client(e.to_string()))?;
        let body = TransferSignaturePostBody {
            source_blockchain_id: source_chain.0,
            source_transaction_id: source_transaction_id.to_string(),
            signature: signature.to_string(),
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PrimaryClientError::Client(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        match status {
            reqwest::StatusCode::BAD_REQUEST => Err(PrimaryClientError::InvalidSignature),
            reqwest::StatusCode::FORBIDDEN => Err(PrimaryClientError::InvalidSigner),
            reqwest::StatusCode::NOT_FOUND => Err(PrimaryClientError::UnknownTransfer),
            reqwest::StatusCode::CONFLICT => Err(PrimaryClientError::DuplicateSignature),
            other => {
                let message = response
                    .json::<ErrorBody>()
                    .await
                    .ok()
                    .and_then(|b| b.message)
                    .unwrap_or_default();
                Err(PrimaryClientError::Client(format!(
                    "unexpected status {other}: {message}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_validator_nonce_query_url() {
        let client = PrimaryClient::new("http://primary.example/".parse().unwrap());
        let url = client.base_url.join("validatornonce").unwrap();
        assert_eq!(url.as_str(), "http://primary.example/validatornonce");
    }
}
