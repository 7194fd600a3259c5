//! Persistence Layer
//!
//! Repository ports for the three entity groups plus two implementations:
//! PostgreSQL (sqlx) for deployments and an in-memory store for tests and
//! single-node runs. Each port method is one atomic semantic operation; the
//! uniqueness and ordering guarantees are enforced inside the store, never
//! by a read-then-write in the caller.
//!
//! ```text
//!  ChainMirror ──────► SbtRepository        ─┬─► PgSbtRepository
//!  GovernanceEngine ─► GovernanceRepository  ├─► PgGovernanceRepository
//!  SessionManager ───► SessionRepository    ─┤   PgSessionRepository
//!                                            └─► Memory*Repository
//! ```

pub mod governance;
pub mod identity;
pub mod memory;
pub mod pool;
pub mod sbt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chain::OnChainSbtState;
use crate::error::TrustResult;
use crate::governance::{ConfirmedScam, DaoProposal, DaoVote, NewProposal, ProposalStatus};
use crate::identity::{CivicAuthSession, VerificationLog};
use crate::sbt::{SbtMintEvent, SbtRecord, SbtStats, SbtUpdateEvent};

pub use governance::PgGovernanceRepository;
pub use identity::PgSessionRepository;
pub use memory::{MemoryGovernanceRepository, MemorySbtRepository, MemorySessionRepository};
pub use pool::DatabasePool;
pub use sbt::PgSbtRepository;

/// SBT cache and its append-only event audit.
#[async_trait]
pub trait SbtRepository: Send + Sync {
    /// Record a mint event and create the wallet's record if absent.
    ///
    /// Fails with `DuplicateEvent` for a known tx hash and `AlreadyMinted`
    /// when the wallet already holds a different token.
    async fn apply_mint(&self, event: &SbtMintEvent, now: DateTime<Utc>)
    -> TrustResult<SbtRecord>;

    /// Record an update event and move the record's metadata forward.
    ///
    /// `NotFound` when no record carries the token (nothing is recorded, so
    /// redelivery after the mint succeeds), `StaleWrite` when the event's
    /// block is not above the record's.
    async fn apply_update(&self, event: &SbtUpdateEvent) -> TrustResult<SbtRecord>;

    /// Upsert a wallet's record from authoritative chain state, guarded by
    /// the block number of the last applied write.
    async fn apply_sync(
        &self,
        wallet: &str,
        state: &OnChainSbtState,
        now: DateTime<Utc>,
    ) -> TrustResult<SbtRecord>;

    async fn get_record(&self, wallet: &str) -> TrustResult<Option<SbtRecord>>;

    /// Stamp `last_synced_at` on a record whose chain state matched the
    /// cache at `block_number`. Nothing else changes; a record that has
    /// already moved past that block is left alone.
    async fn touch_synced(
        &self,
        wallet: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> TrustResult<()>;

    /// Records ordered by trust score, highest first.
    async fn top_by_trust(&self, limit: usize) -> TrustResult<Vec<SbtRecord>>;

    async fn all_records(&self) -> TrustResult<Vec<SbtRecord>>;

    async fn stats(&self) -> TrustResult<SbtStats>;

    async fn mint_events_for(&self, wallet: &str) -> TrustResult<Vec<SbtMintEvent>>;
}

/// Proposals, votes and confirmed scams.
#[async_trait]
pub trait GovernanceRepository: Send + Sync {
    async fn create_proposal(&self, proposal: NewProposal) -> TrustResult<DaoProposal>;

    async fn get_proposal(&self, id: u64) -> TrustResult<Option<DaoProposal>>;

    /// Newest first; all statuses when `status` is `None`.
    async fn list_proposals(&self, status: Option<ProposalStatus>)
    -> TrustResult<Vec<DaoProposal>>;

    async fn active_proposals_for(&self, address: &str) -> TrustResult<Vec<DaoProposal>>;

    /// Insert the vote and add its power to the tally in one step.
    ///
    /// `VotingClosed` unless the proposal is Active with `now < end_time`;
    /// `AlreadyVoted` on a second ballot from the same voter.
    async fn record_vote(&self, vote: &DaoVote) -> TrustResult<DaoProposal>;

    async fn list_votes(&self, proposal_id: u64) -> TrustResult<Vec<DaoVote>>;

    /// Close an Active proposal whose window has ended. Proposals already
    /// out of Active are returned unchanged.
    async fn finalize(&self, proposal_id: u64, now: DateTime<Utc>) -> TrustResult<DaoProposal>;

    /// Move a Passed proposal to Executed and write its confirmation, once.
    async fn execute(
        &self,
        proposal_id: u64,
        tx_hash: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> TrustResult<ConfirmedScam>;

    async fn confirmed_scam(&self, address: &str) -> TrustResult<Option<ConfirmedScam>>;

    async fn list_confirmed(&self) -> TrustResult<Vec<ConfirmedScam>>;
}

/// Identity sessions and the verification attempt log.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Drop the address's pending sessions and insert the new one.
    async fn replace_pending(&self, session: &CivicAuthSession) -> TrustResult<()>;

    async fn get_by_gate_pass(&self, gate_pass: &str) -> TrustResult<Option<CivicAuthSession>>;

    /// Overwrite the session stored under the same gate pass.
    async fn save(&self, session: &CivicAuthSession) -> TrustResult<()>;

    /// Sessions for an address, newest first.
    async fn sessions_for(&self, address: &str) -> TrustResult<Vec<CivicAuthSession>>;

    async fn sessions_with_device(&self, device_hash: &str) -> TrustResult<Vec<CivicAuthSession>>;

    /// Set-insert a flag on every session of the address and recompute risk.
    async fn flag_address(&self, address: &str, flag: &str) -> TrustResult<()>;

    async fn append_log(&self, log: &VerificationLog) -> TrustResult<()>;

    /// Log entries for an address at or after `since`, newest first.
    async fn logs_since(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> TrustResult<Vec<VerificationLog>>;

    /// Region recorded by the address's most recent successful verification.
    async fn last_geo_location(&self, address: &str) -> TrustResult<Option<String>>;
}
