//! DAO API endpoints
//!
//! Endpoints:
//!   POST /proposals                  -> Create a proposal
//!   GET  /proposals?status=active    -> List proposals, newest first
//!   GET  /proposals/{id}             -> Get proposal
//!   GET  /proposals/{id}/votes       -> List votes
//!   POST /proposals/{id}/votes       -> Cast a vote (signed when a signature is given)
//!   POST /proposals/{id}/finalize    -> Tally after the voting window
//!   POST /proposals/{id}/execute     -> Confirm the scam on-chain result
//!                                       (verified identity session required)
//!   GET  /confirmed                  -> Confirmed scams
//!   GET  /scam-score/{address}       -> Community scam score
//!   GET  /address/{address}          -> Scam flag only

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::ApiResult;
use super::middleware::require_identity_session;
use crate::governance::{
    AddressStatus, ConfirmedScam, DaoProposal, DaoVote, GovernanceEngine, ProposalStatus,
    ScamScore, VoteType,
};
use crate::identity::IdentitySessionManager;

#[derive(Clone)]
pub struct DaoApiState {
    pub engine: Arc<GovernanceEngine>,
    /// Gates execution
    pub sessions: Arc<IdentitySessionManager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub title: String,
    pub description: String,
    pub creator_address: String,
    pub suspicious_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub voter_address: String,
    pub vote_type: VoteType,
    pub vote_power: f64,
    /// Wallet signature over the vote message; required for signed voting
    pub signature: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub tx_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Deserialize)]
pub struct ProposalQuery {
    pub status: Option<String>,
}

/// POST /proposals
async fn create_proposal(
    State(state): State<DaoApiState>,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<DaoProposal> {
    let proposal = state
        .engine
        .create_proposal(
            &req.title,
            &req.description,
            &req.creator_address,
            &req.suspicious_address,
        )
        .await?;
    Ok(Json(proposal))
}

/// GET /proposals
async fn list_proposals(
    State(state): State<DaoApiState>,
    Query(query): Query<ProposalQuery>,
) -> ApiResult<Vec<DaoProposal>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ProposalStatus>)
        .transpose()?;
    Ok(Json(state.engine.list_proposals(status).await?))
}

/// GET /proposals/{id}
async fn get_proposal(
    State(state): State<DaoApiState>,
    Path(id): Path<u64>,
) -> ApiResult<DaoProposal> {
    Ok(Json(state.engine.get_proposal(id).await?))
}

/// GET /proposals/{id}/votes
async fn list_votes(
    State(state): State<DaoApiState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<DaoVote>> {
    Ok(Json(state.engine.list_votes(id).await?))
}

/// POST /proposals/{id}/votes
async fn cast_vote(
    State(state): State<DaoApiState>,
    Path(id): Path<u64>,
    Json(req): Json<CastVoteRequest>,
) -> ApiResult<DaoProposal> {
    let proposal = match req.signature.as_deref() {
        Some(signature) => {
            state
                .engine
                .cast_signed_vote(id, &req.voter_address, req.vote_type, req.vote_power, signature)
                .await?
        }
        None => {
            state
                .engine
                .cast_vote(id, &req.voter_address, req.vote_type, req.vote_power)
                .await?
        }
    };
    Ok(Json(proposal))
}

/// POST /proposals/{id}/finalize
async fn finalize(
    State(state): State<DaoApiState>,
    Path(id): Path<u64>,
) -> ApiResult<DaoProposal> {
    Ok(Json(state.engine.finalize_tally(id).await?))
}

/// POST /proposals/{id}/execute
async fn execute(
    State(state): State<DaoApiState>,
    Path(id): Path<u64>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<ConfirmedScam> {
    let scam = state
        .engine
        .execute_proposal(id, &req.tx_hash, req.block_number)
        .await?;
    Ok(Json(scam))
}

/// GET /confirmed
async fn list_confirmed(State(state): State<DaoApiState>) -> ApiResult<Vec<ConfirmedScam>> {
    Ok(Json(state.engine.list_confirmed().await?))
}

/// GET /scam-score/{address}
async fn scam_score(
    State(state): State<DaoApiState>,
    Path(address): Path<String>,
) -> ApiResult<ScamScore> {
    Ok(Json(state.engine.get_scam_score(&address).await?))
}

/// GET /address/{address}
async fn address_status(
    State(state): State<DaoApiState>,
    Path(address): Path<String>,
) -> ApiResult<AddressStatus> {
    Ok(Json(state.engine.get_address_status(&address).await?))
}

pub fn create_router(state: DaoApiState) -> Router {
    Router::new()
        .route("/proposals", post(create_proposal).get(list_proposals))
        .route("/proposals/{id}", get(get_proposal))
        .route("/proposals/{id}/votes", get(list_votes).post(cast_vote))
        .route("/proposals/{id}/finalize", post(finalize))
        .route(
            "/proposals/{id}/execute",
            post(execute).layer(middleware::from_fn_with_state(
                state.sessions.clone(),
                require_identity_session,
            )),
        )
        .route("/confirmed", get(list_confirmed))
        .route("/scam-score/{address}", get(scam_score))
        .route("/address/{address}", get(address_status))
        .with_state(state)
}
