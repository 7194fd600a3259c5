//! Identity API endpoints
//!
//! Endpoints:
//!   POST /initiate          -> Open a gatepass challenge
//!   POST /verify            -> Answer a challenge with the issued gatepass
//!   GET  /status/{address}  -> Latest session with read-time expiry

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiResult;
use crate::identity::{AuthStatus, CivicAuthSession, IdentitySessionManager, SessionStatus};

#[derive(Clone)]
pub struct CivicApiState {
    pub sessions: Arc<IdentitySessionManager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub address: String,
    /// `userAgent|lang|screen` as reported by the client
    #[serde(default)]
    pub device_info: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub gate_pass: String,
    #[serde(default)]
    pub device_info: String,
}

/// Client view of a session; the device hash stays server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub address: String,
    pub gate_pass: String,
    pub gatekeeper_network: String,
    pub status: SessionStatus,
    pub expires: DateTime<Utc>,
    pub security_level: u8,
    pub risk_score: f64,
    pub security_flags: Vec<String>,
}

impl From<CivicAuthSession> for SessionResponse {
    fn from(session: CivicAuthSession) -> Self {
        Self {
            address: session.user_address,
            gate_pass: session.gate_pass,
            gatekeeper_network: session.gatekeeper_network,
            status: session.status,
            expires: session.token_expiry,
            security_level: session.security_level,
            risk_score: session.risk_score,
            security_flags: session.flags.into_iter().collect(),
        }
    }
}

/// POST /initiate
async fn initiate(
    State(state): State<CivicApiState>,
    Json(req): Json<InitiateRequest>,
) -> ApiResult<SessionResponse> {
    let session = state
        .sessions
        .initiate_auth(&req.address, &req.device_info)
        .await?;
    Ok(Json(session.into()))
}

/// POST /verify
async fn verify(
    State(state): State<CivicApiState>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<SessionResponse> {
    let session = state
        .sessions
        .verify_gatepass(&req.gate_pass, &req.device_info)
        .await?;
    Ok(Json(session.into()))
}

/// GET /status/{address}
async fn status(
    State(state): State<CivicApiState>,
    Path(address): Path<String>,
) -> ApiResult<AuthStatus> {
    Ok(Json(state.sessions.get_auth_status(&address).await?))
}

pub fn create_router(state: CivicApiState) -> Router {
    Router::new()
        .route("/initiate", post(initiate))
        .route("/verify", post(verify))
        .route("/status/{address}", get(status))
        .with_state(state)
}
