//! SBT API endpoints
//!
//! Endpoints:
//!   GET  /profile/{wallet}    -> Cached profile, synced from chain on miss
//!   GET  /breakdown/{wallet}  -> Trust score decomposition
//!   GET  /status/{wallet}     -> On-chain hasSBT / isVerified plus cache flag
//!   POST /sync/{wallet}       -> Force a chain sync
//!   GET  /history/{wallet}    -> Recorded mint events
//!   GET  /leaderboard         -> Top records by trust score
//!   GET  /stats               -> Cache statistics
//!   GET  /export              -> Every record with its breakdown
//!   POST /events/mint         -> Ingest a mint event
//!   POST /events/update       -> Ingest an update event

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::ApiResult;
use crate::error::IngestOutcome;
use crate::reputation::{ReputationScorer, TrustScoreBreakdown};
use crate::sbt::{
    ChainMirror, LeaderboardEntry, SbtExportRecord, SbtMintEvent, SbtRecord, SbtStats, SbtStatus,
    SbtUpdateEvent,
};

#[derive(Clone)]
pub struct SbtApiState {
    pub mirror: Arc<ChainMirror>,
    pub scorer: Arc<ReputationScorer>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// GET /profile/{wallet}
async fn get_profile(
    State(state): State<SbtApiState>,
    Path(wallet): Path<String>,
) -> ApiResult<SbtRecord> {
    Ok(Json(state.mirror.profile_or_sync(&wallet).await?))
}

/// GET /breakdown/{wallet}
async fn get_breakdown(
    State(state): State<SbtApiState>,
    Path(wallet): Path<String>,
) -> ApiResult<TrustScoreBreakdown> {
    Ok(Json(state.scorer.trust_breakdown(&wallet).await?))
}

/// GET /status/{wallet}
async fn get_status(
    State(state): State<SbtApiState>,
    Path(wallet): Path<String>,
) -> ApiResult<SbtStatus> {
    Ok(Json(state.mirror.check_sbt_status(&wallet).await?))
}

/// POST /sync/{wallet}
async fn sync_wallet(
    State(state): State<SbtApiState>,
    Path(wallet): Path<String>,
) -> ApiResult<IngestOutcome<SbtRecord>> {
    let result = state.mirror.sync_from_chain(&wallet).await;
    Ok(Json(IngestOutcome::from_result(result)?))
}

/// GET /history/{wallet}
async fn get_history(
    State(state): State<SbtApiState>,
    Path(wallet): Path<String>,
) -> ApiResult<Vec<SbtMintEvent>> {
    Ok(Json(state.mirror.mint_history(&wallet).await?))
}

/// GET /leaderboard?limit=N
async fn get_leaderboard(
    State(state): State<SbtApiState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let limit = query.limit.unwrap_or(0);
    Ok(Json(state.mirror.leaderboard(limit).await?))
}

/// GET /stats
async fn get_stats(State(state): State<SbtApiState>) -> ApiResult<SbtStats> {
    Ok(Json(state.mirror.stats().await?))
}

/// GET /export
async fn export_records(State(state): State<SbtApiState>) -> ApiResult<Vec<SbtExportRecord>> {
    Ok(Json(state.mirror.export().await?))
}

/// POST /events/mint
async fn ingest_mint(
    State(state): State<SbtApiState>,
    Json(event): Json<SbtMintEvent>,
) -> ApiResult<IngestOutcome<SbtRecord>> {
    let result = state.mirror.ingest_mint_event(event).await;
    Ok(Json(IngestOutcome::from_result(result)?))
}

/// POST /events/update
async fn ingest_update(
    State(state): State<SbtApiState>,
    Json(event): Json<SbtUpdateEvent>,
) -> ApiResult<IngestOutcome<SbtRecord>> {
    let result = state.mirror.ingest_update_event(event).await;
    Ok(Json(IngestOutcome::from_result(result)?))
}

pub fn create_router(state: SbtApiState) -> Router {
    Router::new()
        .route("/profile/{wallet}", get(get_profile))
        .route("/breakdown/{wallet}", get(get_breakdown))
        .route("/status/{wallet}", get(get_status))
        .route("/sync/{wallet}", post(sync_wallet))
        .route("/history/{wallet}", get(get_history))
        .route("/leaderboard", get(get_leaderboard))
        .route("/stats", get(get_stats))
        .route("/export", get(export_records))
        .route("/events/mint", post(ingest_mint))
        .route("/events/update", post(ingest_update))
        .with_state(state)
}
