//! Trust Oracle
//!
//! Off-chain mirror and decision layer for wallet reputation: caches the
//! soulbound-token (SBT) state held on-chain, runs DAO votes that confirm
//! scam addresses, scores trust and threat per address, and manages
//! identity-verification sessions against an external gatepass provider.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - TrustError taxonomy, IngestOutcome
//! ├── clock.rs       - Injected time source
//! ├── chain/         - Chain ports and gateway client
//! │   ├── types.rs   - On-chain SBT state, address parsing
//! │   └── client.rs  - reqwest gateway adapter
//! ├── sbt/           - ChainMirror: event ingest, chain sync, cache reads
//! ├── governance/    - Proposals, votes, tally, execution, scam scores
//! ├── reputation/    - Trust breakdown, threat score, reputation report
//! ├── identity/      - Gatepass sessions, device/location risk, Civic client
//! ├── api/           - HTTP API endpoints (axum)
//! └── database/      - Repository ports, PostgreSQL and in-memory stores
//! ```

pub mod api;
pub mod chain;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod governance;
pub mod identity;
pub mod reputation;
pub mod sbt;

// Re-export main types for convenience
pub use config::OracleConfig;
pub use error::{IngestOutcome, TrustError, TrustResult};

pub use chain::{ChainClient, ChainClientConfig, ChainReader, RetryPolicy, SignatureVerifier};
pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use database::{DatabasePool, GovernanceRepository, SbtRepository, SessionRepository};

pub use governance::{
    ConfirmedScam, DaoProposal, DaoVote, GovernanceConfig, GovernanceEngine, ProposalStatus,
    ScamScore, VoteType,
};
pub use identity::{
    AuthStatus, CivicAuthSession, CivicGatewayClient, IdentityProvider, IdentitySessionManager,
    SessionConfig, SessionStatus,
};
pub use reputation::{
    ReputationReport, ReputationScorer, RiskLabel, ThreatScore, TrustScoreBreakdown,
};
pub use sbt::{ChainMirror, MirrorConfig, SbtMintEvent, SbtRecord, SbtUpdateEvent};
