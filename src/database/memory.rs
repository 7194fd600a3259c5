//! In-memory repositories
//!
//! Each store keeps its tables behind a single `tokio::sync::RwLock`, so every
//! port method runs as one critical section. That gives the same uniqueness
//! and ordering guarantees the PostgreSQL implementation gets from its
//! constraints and row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{GovernanceRepository, SbtRepository, SessionRepository};
use crate::chain::OnChainSbtState;
use crate::error::{TrustError, TrustResult};
use crate::governance::{
    ConfirmedScam, DaoProposal, DaoVote, NewProposal, ProposalStatus, VoteType,
};
use crate::identity::{CivicAuthSession, SessionStatus, VerificationLog, VerificationType};
use crate::sbt::{SbtMintEvent, SbtRecord, SbtStats, SbtUpdateEvent};

// ---------------------------------------------------------------------------
// SBT
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SbtTables {
    records: HashMap<String, SbtRecord>,
    mint_events: HashMap<String, SbtMintEvent>,
    update_events: HashMap<String, SbtUpdateEvent>,
}

impl SbtTables {
    fn token_holder(&self, token_id: u64) -> Option<&SbtRecord> {
        self.records.values().find(|r| r.token_id == token_id)
    }

    fn check_token_free(&self, wallet: &str, token_id: u64) -> TrustResult<()> {
        match self.token_holder(token_id) {
            Some(holder) if holder.wallet_address != wallet => Err(TrustError::invalid_input(
                wallet,
                format!("token {} is held by another wallet", token_id),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemorySbtRepository {
    inner: RwLock<SbtTables>,
}

impl MemorySbtRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SbtRepository for MemorySbtRepository {
    async fn apply_mint(
        &self,
        event: &SbtMintEvent,
        now: DateTime<Utc>,
    ) -> TrustResult<SbtRecord> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;

        if tables.mint_events.contains_key(&event.tx_hash) {
            return Err(TrustError::DuplicateEvent {
                tx_hash: event.tx_hash.clone(),
            });
        }
        if let Some(existing) = tables.records.get(&event.wallet_address) {
            if existing.token_id != event.token_id {
                return Err(TrustError::AlreadyMinted {
                    wallet: event.wallet_address.clone(),
                    existing: existing.token_id,
                    incoming: event.token_id,
                });
            }
        }
        tables.check_token_free(&event.wallet_address, event.token_id)?;

        tables
            .mint_events
            .insert(event.tx_hash.clone(), event.clone());

        let record = tables
            .records
            .entry(event.wallet_address.clone())
            .and_modify(|r| {
                if event.block_number > r.block_number {
                    r.tx_hash = Some(event.tx_hash.clone());
                    r.block_number = event.block_number;
                }
            })
            .or_insert_with(|| SbtRecord::from_mint(event, now));

        Ok(record.clone())
    }

    async fn apply_update(&self, event: &SbtUpdateEvent) -> TrustResult<SbtRecord> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;

        if tables.update_events.contains_key(&event.tx_hash) {
            return Err(TrustError::DuplicateEvent {
                tx_hash: event.tx_hash.clone(),
            });
        }

        let wallet = tables
            .token_holder(event.token_id)
            .map(|r| r.wallet_address.clone())
            .ok_or_else(|| TrustError::not_found("sbt_token", event.token_id.to_string()))?;

        let record = tables
            .records
            .get_mut(&wallet)
            .ok_or_else(|| TrustError::not_found("sbt_record", wallet.clone()))?;

        if event.block_number <= record.block_number {
            return Err(TrustError::StaleWrite {
                key: wallet,
                incoming: event.block_number,
                applied: record.block_number,
            });
        }

        record.metadata_uri = Some(event.new_uri.clone());
        record.tx_hash = Some(event.tx_hash.clone());
        record.block_number = event.block_number;
        let updated = record.clone();

        tables
            .update_events
            .insert(event.tx_hash.clone(), event.clone());

        Ok(updated)
    }

    async fn apply_sync(
        &self,
        wallet: &str,
        state: &OnChainSbtState,
        now: DateTime<Utc>,
    ) -> TrustResult<SbtRecord> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;

        if let Some(record) = tables.records.get_mut(wallet) {
            if record.token_id != state.token_id {
                return Err(TrustError::AlreadyMinted {
                    wallet: wallet.to_string(),
                    existing: record.token_id,
                    incoming: state.token_id,
                });
            }
            if state.block_number <= record.block_number {
                return Err(TrustError::StaleWrite {
                    key: wallet.to_string(),
                    incoming: state.block_number,
                    applied: record.block_number,
                });
            }
            record.overwrite_from_chain(state, now);
            return Ok(record.clone());
        }

        tables.check_token_free(wallet, state.token_id)?;
        let record = SbtRecord::from_chain(wallet, state, now);
        tables.records.insert(wallet.to_string(), record.clone());
        Ok(record)
    }

    async fn get_record(&self, wallet: &str) -> TrustResult<Option<SbtRecord>> {
        Ok(self.inner.read().await.records.get(wallet).cloned())
    }

    async fn touch_synced(
        &self,
        wallet: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> TrustResult<()> {
        let mut tables = self.inner.write().await;
        if let Some(record) = tables.records.get_mut(wallet) {
            if record.block_number == block_number && record.last_synced_at < now {
                record.last_synced_at = now;
            }
        }
        Ok(())
    }

    async fn top_by_trust(&self, limit: usize) -> TrustResult<Vec<SbtRecord>> {
        let mut records = self.all_records().await?;
        records.truncate(limit);
        Ok(records)
    }

    async fn all_records(&self) -> TrustResult<Vec<SbtRecord>> {
        let tables = self.inner.read().await;
        let mut records: Vec<SbtRecord> = tables.records.values().cloned().collect();
        records.sort_by(|a, b| {
            b.trust_score
                .cmp(&a.trust_score)
                .then_with(|| a.wallet_address.cmp(&b.wallet_address))
        });
        Ok(records)
    }

    async fn stats(&self) -> TrustResult<SbtStats> {
        let tables = self.inner.read().await;
        let total = tables.records.len() as u64;
        let avg = if total == 0 {
            0.0
        } else {
            let sum: u64 = tables.records.values().map(|r| r.trust_score as u64).sum();
            (sum as f64 / total as f64 * 10.0).round() / 10.0
        };

        Ok(SbtStats {
            total_minted: total,
            avg_trust_score: avg,
            premium_holders: tables
                .records
                .values()
                .filter(|r| r.verification_level == 3)
                .count() as u64,
            total_mint_events: tables.mint_events.len() as u64,
            total_update_events: tables.update_events.len() as u64,
        })
    }

    async fn mint_events_for(&self, wallet: &str) -> TrustResult<Vec<SbtMintEvent>> {
        let tables = self.inner.read().await;
        let mut events: Vec<SbtMintEvent> = tables
            .mint_events
            .values()
            .filter(|e| e.wallet_address == wallet)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.block_number);
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GovernanceTables {
    last_id: u64,
    proposals: BTreeMap<u64, DaoProposal>,
    votes: BTreeMap<(u64, String), DaoVote>,
    confirmed: HashMap<String, ConfirmedScam>,
}

#[derive(Default)]
pub struct MemoryGovernanceRepository {
    inner: RwLock<GovernanceTables>,
}

impl MemoryGovernanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GovernanceRepository for MemoryGovernanceRepository {
    async fn create_proposal(&self, proposal: NewProposal) -> TrustResult<DaoProposal> {
        let mut tables = self.inner.write().await;
        tables.last_id += 1;
        let created = DaoProposal {
            id: tables.last_id,
            title: proposal.title,
            description: proposal.description,
            creator_address: proposal.creator_address,
            suspicious_address: proposal.suspicious_address,
            created_at: proposal.created_at,
            end_time: proposal.end_time,
            status: ProposalStatus::Active,
            votes_for: 0.0,
            votes_against: 0.0,
        };
        tables.proposals.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_proposal(&self, id: u64) -> TrustResult<Option<DaoProposal>> {
        Ok(self.inner.read().await.proposals.get(&id).cloned())
    }

    async fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
    ) -> TrustResult<Vec<DaoProposal>> {
        let tables = self.inner.read().await;
        Ok(tables
            .proposals
            .values()
            .rev()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect())
    }

    async fn active_proposals_for(&self, address: &str) -> TrustResult<Vec<DaoProposal>> {
        let tables = self.inner.read().await;
        Ok(tables
            .proposals
            .values()
            .rev()
            .filter(|p| p.status == ProposalStatus::Active && p.suspicious_address == address)
            .cloned()
            .collect())
    }

    async fn record_vote(&self, vote: &DaoVote) -> TrustResult<DaoProposal> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;

        let proposal = tables
            .proposals
            .get_mut(&vote.proposal_id)
            .ok_or_else(|| TrustError::not_found("proposal", vote.proposal_id.to_string()))?;

        if !proposal.accepts_votes(vote.voted_at) {
            return Err(TrustError::VotingClosed {
                proposal_id: vote.proposal_id,
            });
        }

        let key = (vote.proposal_id, vote.voter_address.clone());
        if tables.votes.contains_key(&key) {
            return Err(TrustError::AlreadyVoted {
                proposal_id: vote.proposal_id,
                voter: vote.voter_address.clone(),
            });
        }

        match vote.vote_type {
            VoteType::For => proposal.votes_for += vote.vote_power,
            VoteType::Against => proposal.votes_against += vote.vote_power,
        }
        let updated = proposal.clone();
        tables.votes.insert(key, vote.clone());
        Ok(updated)
    }

    async fn list_votes(&self, proposal_id: u64) -> TrustResult<Vec<DaoVote>> {
        let tables = self.inner.read().await;
        let mut votes: Vec<DaoVote> = tables
            .votes
            .values()
            .filter(|v| v.proposal_id == proposal_id)
            .cloned()
            .collect();
        votes.sort_by_key(|v| v.voted_at);
        Ok(votes)
    }

    async fn finalize(&self, proposal_id: u64, now: DateTime<Utc>) -> TrustResult<DaoProposal> {
        let mut tables = self.inner.write().await;
        let proposal = tables
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| TrustError::not_found("proposal", proposal_id.to_string()))?;

        let outcome = ProposalStatus::tally(proposal.votes_for, proposal.votes_against);
        if !proposal.status.can_transition_to(outcome) {
            return Ok(proposal.clone());
        }
        if now < proposal.end_time {
            return Err(TrustError::VotingStillOpen { proposal_id });
        }

        proposal.status = outcome;
        Ok(proposal.clone())
    }

    async fn execute(
        &self,
        proposal_id: u64,
        tx_hash: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> TrustResult<ConfirmedScam> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;

        let proposal = tables
            .proposals
            .get(&proposal_id)
            .ok_or_else(|| TrustError::not_found("proposal", proposal_id.to_string()))?;

        proposal.status.check_execute(proposal_id)?;
        if tables.confirmed.contains_key(&proposal.suspicious_address) {
            return Err(TrustError::AlreadyConfirmed {
                address: proposal.suspicious_address.clone(),
            });
        }

        let voters = tables
            .votes
            .keys()
            .filter(|(id, _)| *id == proposal_id)
            .count() as u32;
        let scam = ConfirmedScam::from_proposal(proposal, voters, tx_hash, block_number, now);

        tables.confirmed.insert(scam.address.clone(), scam.clone());
        if let Some(proposal) = tables.proposals.get_mut(&proposal_id) {
            proposal.status = ProposalStatus::Executed;
        }
        Ok(scam)
    }

    async fn confirmed_scam(&self, address: &str) -> TrustResult<Option<ConfirmedScam>> {
        Ok(self.inner.read().await.confirmed.get(address).cloned())
    }

    async fn list_confirmed(&self) -> TrustResult<Vec<ConfirmedScam>> {
        let tables = self.inner.read().await;
        let mut confirmed: Vec<ConfirmedScam> = tables.confirmed.values().cloned().collect();
        confirmed.sort_by(|a, b| b.confirmed_at.cmp(&a.confirmed_at));
        Ok(confirmed)
    }
}

// ---------------------------------------------------------------------------
// Identity sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionTables {
    sessions: Vec<CivicAuthSession>,
    logs: Vec<VerificationLog>,
}

#[derive(Default)]
pub struct MemorySessionRepository {
    inner: RwLock<SessionTables>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut sessions: Vec<CivicAuthSession>) -> Vec<CivicAuthSession> {
    sessions.reverse();
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sessions
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn replace_pending(&self, session: &CivicAuthSession) -> TrustResult<()> {
        let mut tables = self.inner.write().await;
        let superseded = |s: &CivicAuthSession| {
            s.user_address == session.user_address && s.status == SessionStatus::Pending
        };
        if tables
            .sessions
            .iter()
            .any(|s| s.gate_pass == session.gate_pass && !superseded(s))
        {
            return Err(TrustError::invalid_input(
                &session.gate_pass,
                "gate pass already issued",
            ));
        }
        tables.sessions.retain(|s| !superseded(s));
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn get_by_gate_pass(&self, gate_pass: &str) -> TrustResult<Option<CivicAuthSession>> {
        let tables = self.inner.read().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.gate_pass == gate_pass)
            .cloned())
    }

    async fn save(&self, session: &CivicAuthSession) -> TrustResult<()> {
        let mut tables = self.inner.write().await;
        let slot = tables
            .sessions
            .iter_mut()
            .find(|s| s.gate_pass == session.gate_pass)
            .ok_or_else(|| TrustError::not_found("auth_session", session.gate_pass.clone()))?;
        *slot = session.clone();
        Ok(())
    }

    async fn sessions_for(&self, address: &str) -> TrustResult<Vec<CivicAuthSession>> {
        let tables = self.inner.read().await;
        Ok(newest_first(
            tables
                .sessions
                .iter()
                .filter(|s| s.user_address == address)
                .cloned()
                .collect(),
        ))
    }

    async fn sessions_with_device(&self, device_hash: &str) -> TrustResult<Vec<CivicAuthSession>> {
        let tables = self.inner.read().await;
        Ok(newest_first(
            tables
                .sessions
                .iter()
                .filter(|s| s.device_hash.as_deref() == Some(device_hash))
                .cloned()
                .collect(),
        ))
    }

    async fn flag_address(&self, address: &str, flag: &str) -> TrustResult<()> {
        let mut tables = self.inner.write().await;
        for session in tables
            .sessions
            .iter_mut()
            .filter(|s| s.user_address == address)
        {
            session.add_flag(flag);
        }
        Ok(())
    }

    async fn append_log(&self, log: &VerificationLog) -> TrustResult<()> {
        self.inner.write().await.logs.push(log.clone());
        Ok(())
    }

    async fn logs_since(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> TrustResult<Vec<VerificationLog>> {
        let tables = self.inner.read().await;
        Ok(tables
            .logs
            .iter()
            .rev()
            .filter(|l| l.user_address == address && l.created_at >= since)
            .cloned()
            .collect())
    }

    async fn last_geo_location(&self, address: &str) -> TrustResult<Option<String>> {
        let tables = self.inner.read().await;
        Ok(tables
            .logs
            .iter()
            .rev()
            .filter(|l| {
                l.user_address == address
                    && l.success
                    && l.verification_type == VerificationType::Verification
            })
            .find_map(|l| l.geo_location.clone()))
    }
}
