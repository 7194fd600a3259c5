//! Threat API endpoints
//!
//! Endpoints:
//!   GET /score/{address}      -> Threat score with risk label and explanation
//!   GET /confirmed/{address}  -> Whether the DAO confirmed the address as a scam
//!   GET /report/{address}     -> Breakdown, threat score and identity risk in one read

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiResult;
use crate::chain::normalize_address;
use crate::reputation::{ReputationReport, ReputationScorer, ThreatScore};

#[derive(Clone)]
pub struct ThreatApiState {
    pub scorer: Arc<ReputationScorer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedResponse {
    pub address: String,
    pub is_confirmed_scam: bool,
}

/// GET /score/{address}
async fn threat_score(
    State(state): State<ThreatApiState>,
    Path(address): Path<String>,
) -> ApiResult<ThreatScore> {
    Ok(Json(state.scorer.threat_score(&address).await?))
}

/// GET /confirmed/{address}
async fn confirmed(
    State(state): State<ThreatApiState>,
    Path(address): Path<String>,
) -> ApiResult<ConfirmedResponse> {
    let is_confirmed_scam = state.scorer.check_confirmed_scam(&address).await?;
    Ok(Json(ConfirmedResponse {
        address: normalize_address(&address),
        is_confirmed_scam,
    }))
}

/// GET /report/{address}
async fn report(
    State(state): State<ThreatApiState>,
    Path(address): Path<String>,
) -> ApiResult<ReputationReport> {
    Ok(Json(state.scorer.report(&address).await?))
}

pub fn create_router(state: ThreatApiState) -> Router {
    Router::new()
        .route("/score/{address}", get(threat_score))
        .route("/confirmed/{address}", get(confirmed))
        .route("/report/{address}", get(report))
        .with_state(state)
}
