//! Identity provider port and the Civic gateway adapter.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::sanitize_for_logging;
use crate::error::{TrustError, TrustResult};

/// Provider answer for a gatepass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatepassVerdict {
    pub valid: bool,
    /// Provider-side expiry, when it reports one
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Issue a challenge for the address; returns the gatepass reference.
    async fn initiate_challenge(&self, address: &str, network: &str) -> TrustResult<String>;

    async fn verify_gatepass(&self, token: &str) -> TrustResult<GatepassVerdict>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivicGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub chain_id: u64,
    pub timeout_secs: u64,
}

impl Default for CivicGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gatekeeper-api.staging.civic.com/v1".to_string(),
            api_key: String::new(),
            chain_id: 11155111,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CivicGatewayClient {
    config: CivicGatewayConfig,
    http_client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    gatekeeper_network: &'a str,
    chain_id: u64,
    wallet_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenStatusResponse {
    is_valid: bool,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
}

impl CivicGatewayClient {
    pub fn new(config: CivicGatewayConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Trust-Oracle/1.0")
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                if !config.api_key.is_empty() {
                    if let Ok(val) = reqwest::header::HeaderValue::from_str(&config.api_key) {
                        headers.insert("X-API-Key", val);
                    }
                }
                headers
            })
            .build()
            .context("Failed to create Civic gateway HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl IdentityProvider for CivicGatewayClient {
    async fn initiate_challenge(&self, address: &str, network: &str) -> TrustResult<String> {
        let resp = self
            .http_client
            .post(self.url("/gateway/token"))
            .json(&TokenRequest {
                gatekeeper_network: network,
                chain_id: self.config.chain_id,
                wallet_address: address,
            })
            .send()
            .await
            .map_err(|e| TrustError::verification_unavailable(address, e))?;

        if !resp.status().is_success() {
            warn!(address = %address, status = %resp.status(), "Civic token request failed");
            return Err(TrustError::verification_unavailable(
                address,
                format!("gateway status {}", resp.status()),
            ));
        }

        let body: TokenResponse = resp.json().await.map_err(|e| {
            TrustError::verification_unavailable(address, format!("bad response: {}", e))
        })?;
        debug!(address = %address, gate_pass = %sanitize_for_logging(&body.token), "Civic challenge issued");
        Ok(body.token)
    }

    async fn verify_gatepass(&self, token: &str) -> TrustResult<GatepassVerdict> {
        let key = sanitize_for_logging(token);
        let resp = self
            .http_client
            .get(self.url(&format!("/gateway/token/{}", token)))
            .send()
            .await
            .map_err(|e| TrustError::verification_unavailable(key.clone(), e))?;

        let status = resp.status();
        if status.is_client_error() {
            // Unknown or revoked gatepass
            return Ok(GatepassVerdict {
                valid: false,
                expires_at: None,
            });
        }
        if !status.is_success() {
            return Err(TrustError::verification_unavailable(
                key,
                format!("gateway status {}", status),
            ));
        }

        let body: TokenStatusResponse = resp.json().await.map_err(|e| {
            TrustError::verification_unavailable(key.clone(), format!("bad response: {}", e))
        })?;

        Ok(GatepassVerdict {
            valid: body.is_valid,
            expires_at: body
                .expires_at
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CivicGatewayClient {
        CivicGatewayClient::new(CivicGatewayConfig {
            base_url: server.uri(),
            api_key: "civic-key".to_string(),
            chain_id: 1,
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_challenge() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gateway/token"))
            .and(header("X-API-Key", "civic-key"))
            .and(body_partial_json(serde_json::json!({
                "gatekeeperNetwork": "ignite",
                "walletAddress": "0xabc"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "gp-123" })),
            )
            .mount(&server)
            .await;

        let token = client_for(&server)
            .initiate_challenge("0xabc", "ignite")
            .await
            .unwrap();
        assert_eq!(token, "gp-123");
    }

    #[tokio::test]
    async fn test_verify_gatepass_with_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/token/gp-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "isValid": true,
                "expiresAt": 1_900_000_000
            })))
            .mount(&server)
            .await;

        let verdict = client_for(&server).verify_gatepass("gp-123").await.unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.expires_at.unwrap().timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn test_unknown_gatepass_is_invalid_not_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let verdict = client_for(&server).verify_gatepass("gp-x").await.unwrap();
        assert!(!verdict.valid);
    }

    #[tokio::test]
    async fn test_gateway_outage_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .initiate_challenge("0xabc", "ignite")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "verification_unavailable");
    }
}
