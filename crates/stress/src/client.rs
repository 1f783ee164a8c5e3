//! Narrow view of the node used by the dispatcher and provisioning.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::account::Address;
use crate::errors::{Result, StressError};
use crate::transaction::SignedPayload;

/// Whether the node knows about a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Known,
    Unknown,
}

/// Capabilities the load generator needs from a node. Implementations must be
/// safe to call from many workers at once.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Next unused sequence number for `address`. Fails for accounts the
    /// node has never seen.
    async fn sequence(&self, address: &Address) -> Result<u64>;

    /// Hand a signed payload to the node, returning the node's identifier for it.
    async fn submit(&self, payload: &SignedPayload) -> Result<String>;

    async fn balance(&self, address: &Address) -> Result<u128>;

    async fn transaction_status(&self, identifier: &str) -> Result<TxStatus>;
}

/// HTTP/JSON client against the node RPC.
#[derive(Clone, Debug)]
pub struct HttpChainClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChainClient {
    /// Build a client whose idle pool can hold one connection per worker.
    pub fn new(base_url: impl Into<String>, max_idle: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(max_idle.max(32))
            .build()?;
        Ok(Self::with_http_client(base_url, http))
    }

    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn fetch_account(&self, address: &Address) -> Result<Option<AccountResponse>> {
        let response = self
            .http
            .get(self.endpoint(&format!("account/{address}")))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(map_api_error(response).await),
        }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn sequence(&self, address: &Address) -> Result<u64> {
        let response = self
            .http
            .get(self.endpoint(&format!("nonce/{address}")))
            .send()
            .await?;

        // Older nodes have no /nonce; fall back to the account view.
        if response.status() == StatusCode::NOT_FOUND {
            return match self.fetch_account(address).await? {
                Some(account) => Ok(account.nonce.saturating_add(1)),
                None => Err(StressError::rpc(
                    StatusCode::NOT_FOUND.as_u16(),
                    "account_not_found",
                    format!("account {address} not found; fund it first"),
                )),
            };
        }
        if !response.status().is_success() {
            return Err(map_api_error(response).await);
        }
        let body: NonceResponse = response.json().await?;
        Ok(body.nonce.saturating_add(1))
    }

    async fn submit(&self, payload: &SignedPayload) -> Result<String> {
        let request = RawTransactionRequest {
            payload: payload.to_hex(),
        };
        let response = self
            .http
            .post(self.endpoint("tx/raw"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(map_api_error(response).await);
        }
        let body: SubmitResponse = response.json().await.unwrap_or_default();
        Ok(body.tx_hash.unwrap_or_else(|| payload.identifier.clone()))
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        let Some(account) = self.fetch_account(address).await? else {
            return Ok(0);
        };
        let raw = account.balance_atomic.replace('_', "");
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse::<u128>()
            .map_err(|err| StressError::Decode(format!("invalid balance format: {err}")))
    }

    async fn transaction_status(&self, identifier: &str) -> Result<TxStatus> {
        let hash = identifier.trim_start_matches("0x");
        let response = self
            .http
            .get(self.endpoint(&format!("tx/{hash}")))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(TxStatus::Unknown),
            status if status.is_success() => Ok(TxStatus::Known),
            _ => Err(map_api_error(response).await),
        }
    }
}

async fn map_api_error(response: Response) -> StressError {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_slice::<ApiErrorResponse>(&bytes) {
        return StressError::rpc(
            status,
            api_error.code.unwrap_or_else(|| "unknown".into()),
            api_error.message.unwrap_or_else(|| "request failed".into()),
        );
    }
    StressError::rpc(status, "http_error", String::from_utf8_lossy(&bytes))
}

#[derive(Debug, Serialize)]
struct RawTransactionRequest {
    payload: String,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitResponse {
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    balance_atomic: String,
    #[serde(default)]
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> HttpChainClient {
        HttpChainClient::new(server.base_url(), 4).unwrap()
    }

    fn address() -> Address {
        Address([7u8; 32])
    }

    #[tokio::test]
    async fn sequence_is_one_past_the_node_nonce() {
        let server = MockServer::start_async().await;
        let nonce = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/nonce/{}", address()));
                then.status(200).json_body(json!({ "nonce": 4 }));
            })
            .await;

        assert_eq!(client_for(&server).sequence(&address()).await.unwrap(), 5);
        nonce.assert_async().await;
    }

    #[tokio::test]
    async fn sequence_falls_back_to_account_view() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/nonce/{}", address()));
                then.status(404);
            })
            .await;
        let account = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/account/{}", address()));
                then.status(200)
                    .json_body(json!({ "balance_atomic": "1_000", "nonce": 2 }));
            })
            .await;

        let client = client_for(&server);
        assert_eq!(client.sequence(&address()).await.unwrap(), 3);
        assert_eq!(client.balance(&address()).await.unwrap(), 1_000);
        account.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn unknown_account_has_no_sequence_and_zero_balance() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/nonce/{}", address()));
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/account/{}", address()));
                then.status(404);
            })
            .await;

        let client = client_for(&server);
        match client.sequence(&address()).await.unwrap_err() {
            StressError::Rpc { status, code, .. } => {
                assert_eq!(status, 404);
                assert_eq!(code, "account_not_found");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.balance(&address()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submit_prefers_the_node_hash() {
        let payload = SignedPayload::new(vec![1, 2, 3]);
        let server = MockServer::start_async().await;
        let raw = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/tx/raw")
                    .json_body(json!({ "payload": "010203" }));
                then.status(200).json_body(json!({ "tx_hash": "0xfeed" }));
            })
            .await;

        assert_eq!(client_for(&server).submit(&payload).await.unwrap(), "0xfeed");
        raw.assert_async().await;
    }

    #[tokio::test]
    async fn submit_without_hash_uses_local_identifier() {
        let payload = SignedPayload::new(vec![9, 9]);
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tx/raw");
                then.status(200).json_body(json!({}));
            })
            .await;

        let identifier = client_for(&server).submit(&payload).await.unwrap();
        assert_eq!(identifier, payload.identifier);
    }

    #[tokio::test]
    async fn rejections_map_to_rpc_errors() {
        let payload = SignedPayload::new(vec![4]);
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tx/raw");
                then.status(400)
                    .json_body(json!({ "code": "nonce_too_low", "message": "stale nonce" }));
            })
            .await;

        match client_for(&server).submit(&payload).await.unwrap_err() {
            StressError::Rpc {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "nonce_too_low");
                assert_eq!(message, "stale nonce");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn plain_text_failures_keep_the_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/nonce/{}", address()));
                then.status(500).body("node overloaded");
            })
            .await;

        match client_for(&server).sequence(&address()).await.unwrap_err() {
            StressError::Rpc {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 500);
                assert_eq!(code, "http_error");
                assert_eq!(message, "node overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transaction_status_follows_http_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tx/abcd");
                then.status(200).json_body(json!({ "hash": "abcd" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tx/ef01");
                then.status(404);
            })
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.transaction_status("0xabcd").await.unwrap(),
            TxStatus::Known
        );
        assert_eq!(
            client.transaction_status("ef01").await.unwrap(),
            TxStatus::Unknown
        );
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let client =
            HttpChainClient::with_http_client("http://127.0.0.1:8080/", reqwest::Client::new());
        assert_eq!(client.endpoint("/tx/raw"), "http://127.0.0.1:8080/tx/raw");
        assert_eq!(client.endpoint("nonce/abc"), "http://127.0.0.1:8080/nonce/abc");
    }

    #[test]
    fn account_response_tolerates_missing_fields() {
        let parsed: AccountResponse = serde_json::from_str(r#"{"nonce": 4}"#).unwrap();
        assert_eq!(parsed.nonce, 4);
        assert!(parsed.balance_atomic.is_empty());
    }

    #[test]
    fn api_error_body_is_optional() {
        let parsed: ApiErrorResponse =
            serde_json::from_str(r#"{"code": "nonce_too_low"}"#).unwrap();
        assert_eq!(parsed.code.as_deref(), Some("nonce_too_low"));
        assert!(parsed.message.is_none());
    }
}
