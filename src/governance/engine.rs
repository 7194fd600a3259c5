//! GovernanceEngine - proposal lifecycle over the governance store

use std::sync::Arc;
use tracing::{info, warn};

use super::models::{
    AddressStatus, ConfirmedScam, DaoProposal, DaoVote, NewProposal, ProposalStatus, ScamScore,
    ScamScoreSource, VoteType,
};
use crate::chain::{SignatureVerifier, parse_address};
use crate::clock::TimeSource;
use crate::database::GovernanceRepository;
use crate::error::{TrustError, TrustResult};

/// Score reported for an address that is targeted by an open proposal.
pub const UNDER_REVIEW_SCORE: u8 = 30;

#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    pub voting_period: chrono::Duration,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_period: chrono::Duration::days(7),
        }
    }
}

pub struct GovernanceEngine {
    repo: Arc<dyn GovernanceRepository>,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn TimeSource>,
    config: GovernanceConfig,
}

/// Message a voter signs to authorise a ballot.
pub fn vote_message(proposal_id: u64, vote_type: VoteType, power: f64) -> String {
    format!(
        "trust-oracle:vote:{}:{}:{}",
        proposal_id,
        vote_type.as_str(),
        power
    )
}

impl GovernanceEngine {
    pub fn new(
        repo: Arc<dyn GovernanceRepository>,
        verifier: Arc<dyn SignatureVerifier>,
        clock: Arc<dyn TimeSource>,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            repo,
            verifier,
            clock,
            config,
        }
    }

    pub async fn create_proposal(
        &self,
        title: &str,
        description: &str,
        creator: &str,
        target: &str,
    ) -> TrustResult<DaoProposal> {
        if title.trim().is_empty() {
            return Err(TrustError::invalid_input("title", "proposal title is empty"));
        }
        let creator_address = parse_address(creator)?;
        let suspicious_address = parse_address(target)?;

        let now = self.clock.now();
        let proposal = self
            .repo
            .create_proposal(NewProposal {
                title: title.trim().to_string(),
                description: description.to_string(),
                creator_address,
                suspicious_address,
                created_at: now,
                end_time: now + self.config.voting_period,
            })
            .await?;

        info!(
            proposal_id = proposal.id,
            target = %proposal.suspicious_address,
            end_time = %proposal.end_time,
            "Proposal created"
        );
        Ok(proposal)
    }

    /// Record a weighted ballot. One vote per voter per proposal.
    pub async fn cast_vote(
        &self,
        proposal_id: u64,
        voter: &str,
        vote_type: VoteType,
        power: f64,
    ) -> TrustResult<DaoProposal> {
        let voter_address = parse_address(voter)?;
        if !power.is_finite() || power <= 0.0 {
            return Err(TrustError::invalid_input(
                voter_address,
                "vote power must be a positive number",
            ));
        }

        let vote = DaoVote {
            proposal_id,
            voter_address,
            vote_type,
            vote_power: power,
            voted_at: self.clock.now(),
        };
        let proposal = self.repo.record_vote(&vote).await?;

        info!(
            proposal_id,
            voter = %vote.voter_address,
            vote_type = vote_type.as_str(),
            power,
            votes_for = proposal.votes_for,
            votes_against = proposal.votes_against,
            "Vote recorded"
        );
        Ok(proposal)
    }

    /// `cast_vote` behind a wallet signature over [`vote_message`].
    pub async fn cast_signed_vote(
        &self,
        proposal_id: u64,
        voter: &str,
        vote_type: VoteType,
        power: f64,
        signature: &str,
    ) -> TrustResult<DaoProposal> {
        let voter_address = parse_address(voter)?;
        let message = vote_message(proposal_id, vote_type, power);

        let valid = self
            .verifier
            .verify_signature(&voter_address, &message, signature)
            .await?;
        if !valid {
            warn!(proposal_id, voter = %voter_address, "Rejected vote with invalid signature");
            return Err(TrustError::SignatureInvalid {
                address: voter_address,
            });
        }

        self.cast_vote(proposal_id, &voter_address, vote_type, power)
            .await
    }

    /// Close voting once the end time has passed. A proposal already out of
    /// Active is returned unchanged.
    pub async fn finalize_tally(&self, proposal_id: u64) -> TrustResult<DaoProposal> {
        let proposal = self.repo.finalize(proposal_id, self.clock.now()).await?;
        info!(
            proposal_id,
            status = %proposal.status,
            votes_for = proposal.votes_for,
            votes_against = proposal.votes_against,
            "Tally finalized"
        );
        Ok(proposal)
    }

    /// Confirm the target of a Passed proposal. Exactly one caller wins.
    pub async fn execute_proposal(
        &self,
        proposal_id: u64,
        tx_hash: &str,
        block_number: u64,
    ) -> TrustResult<ConfirmedScam> {
        if tx_hash.trim().is_empty() {
            return Err(TrustError::invalid_input("tx_hash", "transaction hash is empty"));
        }

        let scam = self
            .repo
            .execute(proposal_id, tx_hash, block_number, self.clock.now())
            .await?;

        info!(
            proposal_id,
            address = %scam.address,
            scam_score = scam.scam_score,
            total_voters = scam.total_voters,
            tx_hash = %tx_hash,
            "Proposal executed, address confirmed"
        );
        Ok(scam)
    }

    pub async fn get_proposal(&self, proposal_id: u64) -> TrustResult<DaoProposal> {
        self.repo
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| TrustError::not_found("proposal", proposal_id.to_string()))
    }

    pub async fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
    ) -> TrustResult<Vec<DaoProposal>> {
        self.repo.list_proposals(status).await
    }

    pub async fn list_votes(&self, proposal_id: u64) -> TrustResult<Vec<DaoVote>> {
        self.get_proposal(proposal_id).await?;
        self.repo.list_votes(proposal_id).await
    }

    pub async fn list_confirmed(&self) -> TrustResult<Vec<ConfirmedScam>> {
        self.repo.list_confirmed().await
    }

    pub async fn get_scam_score(&self, address: &str) -> TrustResult<ScamScore> {
        let address = parse_address(address)?;
        let active = self.repo.active_proposals_for(&address).await?;

        if let Some(scam) = self.repo.confirmed_scam(&address).await? {
            return Ok(ScamScore {
                address,
                is_scam: true,
                scam_score: scam.scam_score,
                voters: Some(scam.total_voters),
                confirmed_at: Some(scam.confirmed_at),
                active_proposals: active.len(),
                source: ScamScoreSource::DaoConfirmed,
            });
        }

        let (scam_score, source) = if active.is_empty() {
            (0, ScamScoreSource::Unknown)
        } else {
            (UNDER_REVIEW_SCORE, ScamScoreSource::UnderReview)
        };

        Ok(ScamScore {
            address,
            is_scam: false,
            scam_score,
            voters: None,
            confirmed_at: None,
            active_proposals: active.len(),
            source,
        })
    }

    pub async fn get_address_status(&self, address: &str) -> TrustResult<AddressStatus> {
        let address = parse_address(address)?;
        let is_scam = self.repo.confirmed_scam(&address).await?.is_some();
        Ok(AddressStatus { address, is_scam })
    }
}
