//! DAO proposal, vote and confirmation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TrustError, TrustResult};

/// Forward-only proposal lifecycle:
/// `Active -> Passed | Rejected`, `Passed -> Executed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Active,
    Passed,
    Rejected,
    Executed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Executed => "executed",
        }
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (ProposalStatus::Active, ProposalStatus::Passed)
                | (ProposalStatus::Active, ProposalStatus::Rejected)
                | (ProposalStatus::Passed, ProposalStatus::Executed)
        )
    }

    /// Execution guard: `AlreadyExecuted` for a replay, `InvalidTransition`
    /// for anything else that is not Passed.
    pub fn check_execute(&self, proposal_id: u64) -> TrustResult<()> {
        if self.can_transition_to(ProposalStatus::Executed) {
            return Ok(());
        }
        match self {
            ProposalStatus::Executed => Err(TrustError::AlreadyExecuted { proposal_id }),
            other => Err(TrustError::InvalidTransition {
                proposal_id,
                from: other.to_string(),
                to: ProposalStatus::Executed.to_string(),
            }),
        }
    }

    /// Simple majority of vote power; ties and empty tallies reject.
    pub fn tally(votes_for: f64, votes_against: f64) -> ProposalStatus {
        if votes_for > votes_against {
            ProposalStatus::Passed
        } else {
            ProposalStatus::Rejected
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProposalStatus::Active),
            "passed" => Ok(ProposalStatus::Passed),
            "rejected" => Ok(ProposalStatus::Rejected),
            "executed" => Ok(ProposalStatus::Executed),
            other => Err(TrustError::invalid_input(other, "unknown proposal status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    For,
    Against,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::For => "for",
            VoteType::Against => "against",
        }
    }
}

impl FromStr for VoteType {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "for" => Ok(VoteType::For),
            "against" => Ok(VoteType::Against),
            other => Err(TrustError::invalid_input(
                other,
                "vote type must be 'for' or 'against'",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaoProposal {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub creator_address: String,
    /// Address the proposal wants confirmed as a scam
    pub suspicious_address: String,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ProposalStatus,
    pub votes_for: f64,
    pub votes_against: f64,
}

impl DaoProposal {
    pub fn accepts_votes(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Active && now < self.end_time
    }

    pub fn total_power(&self) -> f64 {
        self.votes_for + self.votes_against
    }

    /// Share of "for" power as a rounded percentage; 0 with no votes.
    pub fn for_percent(&self) -> u8 {
        percent(self.votes_for, self.votes_against)
    }
}

pub(crate) fn percent(votes_for: f64, votes_against: f64) -> u8 {
    let total = votes_for + votes_against;
    if total <= 0.0 {
        return 0;
    }
    (votes_for / total * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Insert form of a proposal; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    pub creator_address: String,
    pub suspicious_address: String,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// One voter's ballot. `(proposal_id, voter_address)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaoVote {
    pub proposal_id: u64,
    pub voter_address: String,
    pub vote_type: VoteType,
    /// Caller-supplied weight (e.g. quadratic)
    pub vote_power: f64,
    pub voted_at: DateTime<Utc>,
}

/// Output of an executed proposal. Unique per address and per proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedScam {
    pub address: String,
    /// 0-100 community confidence
    pub scam_score: u8,
    pub proposal_id: u64,
    pub confirmed_at: DateTime<Utc>,
    pub total_voters: u32,
    pub description: String,
    pub tx_hash: String,
    pub block_number: u64,
}

impl ConfirmedScam {
    pub fn from_proposal(
        proposal: &DaoProposal,
        total_voters: u32,
        tx_hash: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            address: proposal.suspicious_address.clone(),
            scam_score: proposal.for_percent(),
            proposal_id: proposal.id,
            confirmed_at: now,
            total_voters,
            description: proposal.description.clone(),
            tx_hash: tx_hash.to_string(),
            block_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScamScoreSource {
    DaoConfirmed,
    UnderReview,
    Unknown,
}

/// Community scam score for an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScamScore {
    pub address: String,
    pub is_scam: bool,
    pub scam_score: u8,
    pub voters: Option<u32>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub active_proposals: usize,
    pub source: ScamScoreSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressStatus {
    pub address: String,
    pub is_scam: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_forward_only() {
        use ProposalStatus::*;
        assert!(Active.can_transition_to(Passed));
        assert!(Active.can_transition_to(Rejected));
        assert!(Passed.can_transition_to(Executed));

        assert!(!Active.can_transition_to(Executed));
        assert!(!Passed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Passed));
        assert!(!Executed.can_transition_to(Active));
    }

    #[test]
    fn test_execute_guard() {
        use ProposalStatus::*;
        assert!(Passed.check_execute(7).is_ok());
        assert!(matches!(
            Executed.check_execute(7),
            Err(TrustError::AlreadyExecuted { proposal_id: 7 })
        ));
        for status in [Active, Rejected] {
            assert_eq!(status.check_execute(7).unwrap_err().code(), "invalid_transition");
        }
    }

    #[test]
    fn test_tally_majority_and_ties() {
        assert_eq!(ProposalStatus::tally(10.0, 3.0), ProposalStatus::Passed);
        assert_eq!(ProposalStatus::tally(3.0, 3.0), ProposalStatus::Rejected);
        assert_eq!(ProposalStatus::tally(0.0, 0.0), ProposalStatus::Rejected);
        assert_eq!(ProposalStatus::tally(1.0, 4.5), ProposalStatus::Rejected);
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(10.0, 3.0), 77);
        assert_eq!(percent(1.0, 1.0), 50);
        assert_eq!(percent(0.0, 0.0), 0);
        assert_eq!(percent(5.0, 0.0), 100);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            ProposalStatus::Active,
            ProposalStatus::Passed,
            ProposalStatus::Rejected,
            ProposalStatus::Executed,
        ] {
            assert_eq!(status.as_str().parse::<ProposalStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<ProposalStatus>().is_err());
        assert!("abstain".parse::<VoteType>().is_err());
    }
}
