//! DAO Governance
//!
//! Turns proposals and weighted votes into confirmed-scam determinations.
//!
//! ## Proposal lifecycle
//!
//! ```text
//!            end time reached, tally
//! ┌────────┐ ──────────────────────► ┌──────────┐    execute    ┌──────────┐
//! │ Active │                         │  Passed  │ ────────────► │ Executed │
//! └────────┘ ──────────────────────► └──────────┘               └──────────┘
//!      │        (for <= against)     ┌──────────┐
//!      └───────────────────────────► │ Rejected │
//!                                    └──────────┘
//! ```
//!
//! Votes rely on the `(proposal, voter)` uniqueness; tally and execution run
//! against the proposal row under a lock, with the confirmed-scam uniqueness
//! on proposal and address as the final arbiter.

mod engine;
mod models;

pub use engine::{GovernanceConfig, GovernanceEngine, UNDER_REVIEW_SCORE, vote_message};
pub use models::{
    AddressStatus, ConfirmedScam, DaoProposal, DaoVote, NewProposal, ProposalStatus, ScamScore,
    ScamScoreSource, VoteType,
};
