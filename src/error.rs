//! Error Taxonomy
//!
//! Every failure a core operation can report, each carrying the entity key
//! (wallet address, tx hash or proposal id) it refers to. Row identifiers are
//! never exposed.
//!
//! Two groups get special treatment at the caller boundary:
//! - transient (`ChainUnavailable`, `VerificationUnavailable`) are retried
//!   with a bounded count before being surfaced
//! - already-applied (`DuplicateEvent`, `StaleWrite`) are idempotent no-ops
//!   and are reported through [`IngestOutcome`] instead of as failures

use serde::Serialize;
use thiserror::Error;

pub type TrustResult<T> = Result<T, TrustError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("event already recorded: tx {tx_hash}")]
    DuplicateEvent { tx_hash: String },

    #[error("stale write for {key}: block {incoming} <= applied block {applied}")]
    StaleWrite {
        key: String,
        incoming: u64,
        applied: u64,
    },

    #[error("wallet {wallet} already minted token {existing}, refusing token {incoming}")]
    AlreadyMinted {
        wallet: String,
        existing: u64,
        incoming: u64,
    },

    #[error("{voter} already voted on proposal {proposal_id}")]
    AlreadyVoted { proposal_id: u64, voter: String },

    #[error("voting closed on proposal {proposal_id}")]
    VotingClosed { proposal_id: u64 },

    #[error("voting still open on proposal {proposal_id}")]
    VotingStillOpen { proposal_id: u64 },

    #[error("proposal {proposal_id} already executed")]
    AlreadyExecuted { proposal_id: u64 },

    #[error("address {address} already confirmed by another proposal")]
    AlreadyConfirmed { address: String },

    #[error("proposal {proposal_id} cannot move from {from} to {to}")]
    InvalidTransition {
        proposal_id: u64,
        from: String,
        to: String,
    },

    #[error("chain unavailable while reading {key}: {reason}")]
    ChainUnavailable { key: String, reason: String },

    #[error("identity provider unavailable for {key}: {reason}")]
    VerificationUnavailable { key: String, reason: String },

    #[error("verification failed for {key}: {reason}")]
    VerificationFailed { key: String, reason: String },

    #[error("invalid signature from {address}")]
    SignatureInvalid { address: String },

    #[error("invalid input for {key}: {reason}")]
    InvalidInput { key: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl TrustError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn invalid_input(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn chain_unavailable(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::ChainUnavailable {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn verification_unavailable(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::VerificationUnavailable {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable reason code, safe to hand to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateEvent { .. } => "duplicate_event",
            Self::StaleWrite { .. } => "stale_write",
            Self::AlreadyMinted { .. } => "already_minted",
            Self::AlreadyVoted { .. } => "already_voted",
            Self::VotingClosed { .. } => "voting_closed",
            Self::VotingStillOpen { .. } => "voting_still_open",
            Self::AlreadyExecuted { .. } => "already_executed",
            Self::AlreadyConfirmed { .. } => "already_confirmed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ChainUnavailable { .. } => "chain_unavailable",
            Self::VerificationUnavailable { .. } => "verification_unavailable",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Storage(_) => "storage_error",
        }
    }

    /// The address, tx hash or proposal id this error is about.
    pub fn entity_key(&self) -> Option<String> {
        match self {
            Self::NotFound { key, .. }
            | Self::StaleWrite { key, .. }
            | Self::ChainUnavailable { key, .. }
            | Self::VerificationUnavailable { key, .. }
            | Self::VerificationFailed { key, .. }
            | Self::InvalidInput { key, .. } => Some(key.clone()),
            Self::DuplicateEvent { tx_hash } => Some(tx_hash.clone()),
            Self::AlreadyMinted { wallet, .. } => Some(wallet.clone()),
            Self::AlreadyVoted { proposal_id, .. }
            | Self::VotingClosed { proposal_id }
            | Self::VotingStillOpen { proposal_id }
            | Self::AlreadyExecuted { proposal_id }
            | Self::InvalidTransition { proposal_id, .. } => Some(proposal_id.to_string()),
            Self::AlreadyConfirmed { address } | Self::SignatureInvalid { address } => {
                Some(address.clone())
            }
            Self::Storage(_) => None,
        }
    }

    /// Transport-level failure of an external collaborator; worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ChainUnavailable { .. } | Self::VerificationUnavailable { .. }
        )
    }

    /// The effect this call wanted is already in the cache.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, Self::DuplicateEvent { .. } | Self::StaleWrite { .. })
    }
}

impl From<sqlx::Error> for TrustError {
    fn from(e: sqlx::Error) -> Self {
        TrustError::Storage(e.to_string())
    }
}

/// Result of an idempotent ingest as seen by the caller boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome<T> {
    Applied { value: T },
    AlreadyApplied { code: &'static str, key: Option<String> },
}

impl<T> IngestOutcome<T> {
    /// Folds duplicate/stale rejections into `AlreadyApplied`; every other
    /// error is passed through untouched.
    pub fn from_result(result: TrustResult<T>) -> TrustResult<Self> {
        match result {
            Ok(value) => Ok(Self::Applied { value }),
            Err(e) if e.is_already_applied() => Ok(Self::AlreadyApplied {
                code: e.code(),
                key: e.entity_key(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = TrustError::DuplicateEvent {
            tx_hash: "0xabc".to_string(),
        };
        assert_eq!(err.code(), "duplicate_event");
        assert_eq!(err.entity_key().as_deref(), Some("0xabc"));

        let err = TrustError::AlreadyVoted {
            proposal_id: 7,
            voter: "0x1".to_string(),
        };
        assert_eq!(err.code(), "already_voted");
        assert_eq!(err.entity_key().as_deref(), Some("7"));
    }

    #[test]
    fn test_classification() {
        assert!(TrustError::chain_unavailable("0x1", "timeout").is_transient());
        assert!(!TrustError::VotingClosed { proposal_id: 1 }.is_transient());
        assert!(
            TrustError::StaleWrite {
                key: "0x1".to_string(),
                incoming: 90,
                applied: 100
            }
            .is_already_applied()
        );
        assert!(!TrustError::not_found("sbt_record", "0x1").is_already_applied());
    }

    #[test]
    fn test_outcome_folds_noops_only() {
        let ok: TrustResult<u32> = Ok(5);
        assert_eq!(
            IngestOutcome::from_result(ok).unwrap(),
            IngestOutcome::Applied { value: 5 }
        );

        let dup: TrustResult<u32> = Err(TrustError::DuplicateEvent {
            tx_hash: "0xdead".to_string(),
        });
        let outcome = IngestOutcome::from_result(dup).unwrap();
        assert!(!outcome.is_applied());

        let fatal: TrustResult<u32> = Err(TrustError::AlreadyMinted {
            wallet: "0x1".to_string(),
            existing: 1,
            incoming: 2,
        });
        assert!(IngestOutcome::from_result(fatal).is_err());
    }
}
