//! HTTP API endpoints for the trust oracle
//!
//! Provides REST APIs for:
//! - SBT cache (profiles, breakdowns, leaderboard, event ingest)
//! - DAO governance (proposals, votes, tally, execution, scam scores)
//! - Threat scoring (risk labels, full reputation report)
//! - Identity sessions (gatepass challenge and status)
//!
//! Handlers stay thin: they parse, call one service operation and map its
//! `TrustError` through [`ApiError`].

pub mod civic;
pub mod dao;
pub mod error;
pub mod middleware;
pub mod sbt;
pub mod threat;

use axum::{Json, Router, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::governance::GovernanceEngine;
use crate::identity::IdentitySessionManager;
use crate::reputation::ReputationScorer;
use crate::sbt::ChainMirror;

pub use civic::{CivicApiState, create_router as create_civic_router};
pub use dao::{DaoApiState, create_router as create_dao_router};
pub use error::{ApiError, ApiResult, ErrorBody};
pub use middleware::{USER_ADDRESS_HEADER, require_identity_session};
pub use sbt::{SbtApiState, create_router as create_sbt_router};
pub use threat::{ThreatApiState, create_router as create_threat_router};

/// Every service the routers call into.
#[derive(Clone)]
pub struct AppState {
    pub mirror: Arc<ChainMirror>,
    pub governance: Arc<GovernanceEngine>,
    pub scorer: Arc<ReputationScorer>,
    pub sessions: Arc<IdentitySessionManager>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest(
            "/sbt",
            create_sbt_router(SbtApiState {
                mirror: state.mirror.clone(),
                scorer: state.scorer.clone(),
            }),
        )
        .nest(
            "/dao",
            create_dao_router(DaoApiState {
                engine: state.governance.clone(),
                sessions: state.sessions.clone(),
            }),
        )
        .nest(
            "/threat",
            create_threat_router(ThreatApiState {
                scorer: state.scorer.clone(),
            }),
        )
        .nest(
            "/civic",
            create_civic_router(CivicApiState {
                sessions: state.sessions,
            }),
        )
}
