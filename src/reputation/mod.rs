//! Reputation Scoring
//!
//! Deterministic, side-effect-free scoring over the mirrored SBT cache, DAO
//! outcomes and identity sessions. Nothing here is persisted.
//!
//! ```text
//! ┌─────────────┐      ┌──────────────────┐      ┌──────────────────┐
//! │ SbtRecord   │─────►│ ReputationScorer │◄─────│ ConfirmedScam /  │
//! │ (cache)     │      │                  │      │ active proposals │
//! └─────────────┘      └──────────────────┘      └──────────────────┘
//!                         │            ▲
//!                         ▼            │
//!          TrustScoreBreakdown    session risk
//!          ThreatScore            (identity)
//! ```

mod breakdown;
mod scorer;
mod threat;

pub use breakdown::{CIVIC_VERIFICATION_POINTS, COMPONENT_CAP, TrustScoreBreakdown};
pub use scorer::{IdentitySignal, ReputationReport, ReputationScorer};
pub use threat::{RiskLabel, ThreatScore};
