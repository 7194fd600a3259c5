//! ReputationScorer - read-only derivations over mirrored state

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::breakdown::TrustScoreBreakdown;
use super::threat::{RiskLabel, ThreatScore};
use crate::chain::parse_address;
use crate::clock::TimeSource;
use crate::database::{GovernanceRepository, SbtRepository, SessionRepository};
use crate::error::{TrustError, TrustResult};
use crate::governance::DaoProposal;
use crate::sbt::SbtRecord;

/// Identity-session risk signal for an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySignal {
    pub session_valid: bool,
    pub security_level: u8,
    pub risk_score: f64,
    pub flags: Vec<String>,
}

/// Everything known about an address in one read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationReport {
    pub address: String,
    pub sbt: Option<SbtRecord>,
    pub breakdown: Option<TrustScoreBreakdown>,
    pub threat: ThreatScore,
    pub identity: Option<IdentitySignal>,
}

pub struct ReputationScorer {
    sbt: Arc<dyn SbtRepository>,
    governance: Arc<dyn GovernanceRepository>,
    sessions: Arc<dyn SessionRepository>,
    clock: Arc<dyn TimeSource>,
}

impl ReputationScorer {
    pub fn new(
        sbt: Arc<dyn SbtRepository>,
        governance: Arc<dyn GovernanceRepository>,
        sessions: Arc<dyn SessionRepository>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            sbt,
            governance,
            sessions,
            clock,
        }
    }

    pub async fn trust_breakdown(&self, wallet: &str) -> TrustResult<TrustScoreBreakdown> {
        let wallet = parse_address(wallet)?;
        let record = self
            .sbt
            .get_record(&wallet)
            .await?
            .ok_or_else(|| TrustError::not_found("sbt_record", wallet))?;
        Ok(record.breakdown())
    }

    /// Confirmed-scam lookup; absence is `false`.
    pub async fn check_confirmed_scam(&self, address: &str) -> TrustResult<bool> {
        let address = parse_address(address)?;
        Ok(self.governance.confirmed_scam(&address).await?.is_some())
    }

    pub async fn threat_score(&self, address: &str) -> TrustResult<ThreatScore> {
        let address = parse_address(address)?;

        let mut threat = match self.governance.confirmed_scam(&address).await? {
            Some(scam) => {
                let proposal = self.governance.get_proposal(scam.proposal_id).await?;
                ThreatScore {
                    address: address.clone(),
                    confirmed: true,
                    score: scam.scam_score,
                    confidence: scam.scam_score,
                    votes_for: proposal.as_ref().map_or(0.0, |p| p.votes_for),
                    votes_against: proposal.as_ref().map_or(0.0, |p| p.votes_against),
                    total_voters: scam.total_voters,
                    proposal_id: Some(scam.proposal_id),
                    risk_label: RiskLabel::for_score(scam.scam_score),
                    risk_color: RiskLabel::for_score(scam.scam_score).color(),
                    explanation: Vec::new(),
                }
            }
            None => {
                let active = self.governance.active_proposals_for(&address).await?;
                let leading = leading_proposal(&active);
                let total_voters = match leading {
                    Some(p) => self.governance.list_votes(p.id).await?.len() as u32,
                    None => 0,
                };

                ThreatScore {
                    address: address.clone(),
                    confirmed: false,
                    score: 0,
                    confidence: leading.map_or(0, DaoProposal::for_percent),
                    votes_for: leading.map_or(0.0, |p| p.votes_for),
                    votes_against: leading.map_or(0.0, |p| p.votes_against),
                    total_voters,
                    proposal_id: leading.map(|p| p.id),
                    risk_label: RiskLabel::Clean,
                    risk_color: RiskLabel::Clean.color(),
                    explanation: Vec::new(),
                }
            }
        };

        threat.explain();
        debug!(
            address = %address,
            confirmed = threat.confirmed,
            score = threat.score,
            confidence = threat.confidence,
            "Threat score computed"
        );
        Ok(threat)
    }

    /// Latest identity session's risk signal, `None` without any session.
    pub async fn identity_signal(&self, address: &str) -> TrustResult<Option<IdentitySignal>> {
        let address = parse_address(address)?;
        let now = self.clock.now();
        let sessions = self.sessions.sessions_for(&address).await?;

        let Some(latest) = sessions.first() else {
            return Ok(None);
        };

        Ok(Some(IdentitySignal {
            session_valid: sessions.iter().any(|s| s.is_valid(now)),
            security_level: latest.security_level,
            risk_score: latest.risk_score,
            flags: latest.flags.iter().cloned().collect(),
        }))
    }

    pub async fn report(&self, address: &str) -> TrustResult<ReputationReport> {
        let address = parse_address(address)?;
        let sbt = self.sbt.get_record(&address).await?;
        let breakdown = sbt.as_ref().map(SbtRecord::breakdown);
        let threat = self.threat_score(&address).await?;
        let identity = self.identity_signal(&address).await?;

        Ok(ReputationReport {
            address,
            sbt,
            breakdown,
            threat,
            identity,
        })
    }
}

/// Active proposal carrying the most vote power; the newest wins ties.
fn leading_proposal(newest_first: &[DaoProposal]) -> Option<&DaoProposal> {
    newest_first.iter().fold(None, |best, p| match best {
        Some(b) if b.total_power() >= p.total_power() => Some(b),
        _ => Some(p),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::database::{
        MemoryGovernanceRepository, MemorySbtRepository, MemorySessionRepository,
    };
    use crate::governance::{DaoVote, NewProposal, ProposalStatus, VoteType};
    use chrono::{Duration, Utc};

    const TARGET: &str = "0x00000000000000000000000000000000000000bb";

    fn voter(n: u8) -> String {
        format!("0x{:040x}", n)
    }

    struct Fixture {
        scorer: ReputationScorer,
        governance: Arc<MemoryGovernanceRepository>,
    }

    fn fixture() -> Fixture {
        let governance = Arc::new(MemoryGovernanceRepository::new());
        let scorer = ReputationScorer::new(
            Arc::new(MemorySbtRepository::new()),
            governance.clone(),
            Arc::new(MemorySessionRepository::new()),
            Arc::new(ManualTimeSource::new(Utc::now())),
        );
        Fixture { scorer, governance }
    }

    async fn proposal_with_votes(
        repo: &MemoryGovernanceRepository,
        votes: &[(u8, VoteType, f64)],
    ) -> DaoProposal {
        let now = Utc::now();
        let proposal = repo
            .create_proposal(NewProposal {
                title: "Drainer".to_string(),
                description: "Approval phishing".to_string(),
                creator_address: voter(200),
                suspicious_address: TARGET.to_string(),
                created_at: now,
                end_time: now + Duration::days(7),
            })
            .await
            .unwrap();

        let mut latest = proposal;
        for (n, vote_type, power) in votes {
            latest = repo
                .record_vote(&DaoVote {
                    proposal_id: latest.id,
                    voter_address: voter(*n),
                    vote_type: *vote_type,
                    vote_power: *power,
                    voted_at: now,
                })
                .await
                .unwrap();
        }
        latest
    }

    #[tokio::test]
    async fn test_clean_address() {
        let f = fixture();
        let threat = f.scorer.threat_score(TARGET).await.unwrap();
        assert!(!threat.confirmed);
        assert_eq!(threat.score, 0);
        assert_eq!(threat.confidence, 0);
        assert_eq!(threat.risk_label, RiskLabel::Clean);
        assert!(!f.scorer.check_confirmed_scam(TARGET).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_flight_proposal_sets_confidence_only() {
        let f = fixture();
        proposal_with_votes(
            &f.governance,
            &[(1, VoteType::For, 3.0), (2, VoteType::Against, 1.0)],
        )
        .await;

        let threat = f.scorer.threat_score(TARGET).await.unwrap();
        assert!(!threat.confirmed);
        assert_eq!(threat.score, 0);
        assert_eq!(threat.confidence, 75);
        assert_eq!(threat.total_voters, 2);
        assert!(threat.explanation[0].contains("under community review"));
    }

    #[tokio::test]
    async fn test_confirmed_scam_reports_row_score() {
        let f = fixture();
        let proposal = proposal_with_votes(
            &f.governance,
            &[(1, VoteType::For, 10.0), (2, VoteType::Against, 3.0)],
        )
        .await;
        let closed = f
            .governance
            .finalize(proposal.id, proposal.end_time)
            .await
            .unwrap();
        assert_eq!(closed.status, ProposalStatus::Passed);
        f.governance
            .execute(proposal.id, "0xexec", 900, proposal.end_time)
            .await
            .unwrap();

        let threat = f.scorer.threat_score(TARGET).await.unwrap();
        assert!(threat.confirmed);
        assert_eq!(threat.score, 77);
        assert_eq!(threat.risk_label, RiskLabel::Critical);
        assert!(f.scorer.check_confirmed_scam(TARGET).await.unwrap());
    }

    #[tokio::test]
    async fn test_breakdown_requires_record() {
        let f = fixture();
        let err = f.scorer.trust_breakdown(TARGET).await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let report = f.scorer.report(TARGET).await.unwrap();
        assert!(report.sbt.is_none() && report.breakdown.is_none());
        assert!(report.identity.is_none());
    }

    #[test]
    fn test_leading_proposal_prefers_power_then_newest() {
        let now = Utc::now();
        let make = |id: u64, power: f64| DaoProposal {
            id,
            title: String::new(),
            description: String::new(),
            creator_address: String::new(),
            suspicious_address: TARGET.to_string(),
            created_at: now,
            end_time: now,
            status: ProposalStatus::Active,
            votes_for: power,
            votes_against: 0.0,
        };

        let newest_first = vec![make(3, 2.0), make(2, 5.0), make(1, 5.0)];
        assert_eq!(leading_proposal(&newest_first).map(|p| p.id), Some(2));
        assert!(leading_proposal(&[]).is_none());
    }
}
