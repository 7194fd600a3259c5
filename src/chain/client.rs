//! HTTP client for the chain gateway
//!
//! Reads SBT and verifier contract state through the gateway's REST surface.
//! Every request carries the configured timeout; transport errors, timeouts
//! and 5xx responses all surface as `ChainUnavailable`. Retrying is the
//! caller's decision.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::types::OnChainSbtState;
use super::{ChainReader, SignatureVerifier};
use crate::error::{TrustError, TrustResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainClientConfig {
    pub rpc_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainClient {
    config: ChainClientConfig,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SbtStateResponse {
    token_id: u64,
    verification_level: u32,
    trust_score: u32,
    voting_accuracy: u32,
    doi_participation: u32,
    /// Unix seconds of the mint block
    minted_at: i64,
    block_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HasSbtResponse {
    has_sbt: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifiedResponse {
    is_verified: bool,
}

#[derive(Debug, Serialize)]
struct VerifySignatureRequest<'a> {
    address: &'a str,
    message: &'a str,
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifySignatureResponse {
    valid: bool,
}

impl ChainClient {
    pub fn new(config: ChainClientConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Trust-Oracle/1.0")
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                if !config.api_key.is_empty() {
                    if let Ok(val) = reqwest::header::HeaderValue::from_str(&config.api_key) {
                        headers.insert("X-Api-Key", val);
                    }
                }
                headers
            })
            .build()
            .context("Failed to create chain HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// GET a JSON document; `Ok(None)` on 404.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        key: &str,
    ) -> TrustResult<Option<T>> {
        let url = format!("{}{}", self.config.rpc_url.trim_end_matches('/'), path);
        debug!(url = %url, "Chain gateway request");

        let resp = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrustError::chain_unavailable(key, e))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| TrustError::chain_unavailable(key, format!("bad response: {}", e))),
            status => {
                warn!(url = %url, status = %status, "Chain gateway returned error status");
                Err(TrustError::chain_unavailable(
                    key,
                    format!("gateway status {}", status),
                ))
            }
        }
    }
}

#[async_trait]
impl ChainReader for ChainClient {
    async fn read_sbt_state(&self, address: &str) -> TrustResult<Option<OnChainSbtState>> {
        let path = format!("/sbt/v1/{}/state", address);
        let Some(state) = self.get_json::<SbtStateResponse>(&path, address).await? else {
            return Ok(None);
        };

        let minted_at = DateTime::<Utc>::from_timestamp(state.minted_at, 0).ok_or_else(|| {
            TrustError::chain_unavailable(address, format!("invalid mint timestamp {}", state.minted_at))
        })?;

        Ok(Some(OnChainSbtState {
            token_id: state.token_id,
            verification_level: state.verification_level,
            trust_score: state.trust_score,
            voting_accuracy: state.voting_accuracy,
            doi_participation: state.doi_participation,
            minted_at,
            block_number: state.block_number,
        }))
    }

    async fn has_sbt(&self, address: &str) -> TrustResult<bool> {
        let path = format!("/sbt/v1/{}/exists", address);
        Ok(self
            .get_json::<HasSbtResponse>(&path, address)
            .await?
            .is_some_and(|r| r.has_sbt))
    }

    async fn is_verified(&self, address: &str) -> TrustResult<bool> {
        let path = format!("/verifier/v1/{}/verified", address);
        Ok(self
            .get_json::<VerifiedResponse>(&path, address)
            .await?
            .is_some_and(|r| r.is_verified))
    }
}

#[async_trait]
impl SignatureVerifier for ChainClient {
    async fn verify_signature(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> TrustResult<bool> {
        let url = format!(
            "{}/auth/v1/verify-signature",
            self.config.rpc_url.trim_end_matches('/')
        );

        let resp = self
            .http_client
            .post(&url)
            .json(&VerifySignatureRequest {
                address,
                message,
                signature,
            })
            .send()
            .await
            .map_err(|e| TrustError::chain_unavailable(address, e))?;

        if !resp.status().is_success() {
            return Err(TrustError::chain_unavailable(
                address,
                format!("gateway status {}", resp.status()),
            ));
        }

        let body: VerifySignatureResponse = resp
            .json()
            .await
            .map_err(|e| TrustError::chain_unavailable(address, format!("bad response: {}", e)))?;

        Ok(body.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    fn client_for(server: &MockServer) -> ChainClient {
        ChainClient::new(ChainClientConfig {
            rpc_url: server.uri(),
            api_key: "test".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = ChainClientConfig::default();
        assert_eq!(config.timeout_secs, 10);
        assert!(ChainClient::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_read_sbt_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/sbt/v1/{}/state", WALLET)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tokenId": 1,
                "verificationLevel": 2,
                "trustScore": 85,
                "votingAccuracy": 100,
                "doiParticipation": 50,
                "mintedAt": 1_700_000_000,
                "blockNumber": 120
            })))
            .mount(&server)
            .await;

        let state = client_for(&server).read_sbt_state(WALLET).await.unwrap().unwrap();
        assert_eq!(state.token_id, 1);
        assert_eq!(state.trust_score, 85);
        assert_eq!(state.block_number, 120);
        assert_eq!(state.minted_at.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_missing_token_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/sbt/v1/{}/state", WALLET)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let state = client_for(&server).read_sbt_state(WALLET).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_chain_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).has_sbt(WALLET).await.unwrap_err();
        assert_eq!(err.code(), "chain_unavailable");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_verify_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/verify-signature"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "valid": true })),
            )
            .mount(&server)
            .await;

        let valid = client_for(&server)
            .verify_signature(WALLET, "vote:1:for", "0xsig")
            .await
            .unwrap();
        assert!(valid);
    }
}
