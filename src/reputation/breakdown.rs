//! Trust Score Breakdown
//!
//! Splits the single on-chain trust score into four components:
//!
//! | Component           | Rule                                  | Max |
//! |---------------------|---------------------------------------|-----|
//! | civic verification  | 40 when verification level > 0        | 40  |
//! | voting accuracy     | floor(accuracy * 0.2)                 | 20  |
//! | DAO participation   | votes cast * 2                        | 20  |
//! | transaction history | remainder of the trust score, clamped | 20  |
//!
//! Transaction history is derived, not measured. When the trust score is
//! larger than the other three components can explain plus 20, the remainder
//! saturates and the components sum to less than `total`.

use serde::Serialize;

use crate::sbt::SbtRecord;

pub const CIVIC_VERIFICATION_POINTS: u32 = 40;
pub const COMPONENT_CAP: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustScoreBreakdown {
    pub civic_verification: u32,
    pub transaction_history: u32,
    pub voting_accuracy: u32,
    pub dao_participation: u32,
    /// Echo of the record's trust score
    pub total: u32,
}

impl TrustScoreBreakdown {
    pub fn decompose(record: &SbtRecord) -> Self {
        let civic_verification = if record.verification_level > 0 {
            CIVIC_VERIFICATION_POINTS
        } else {
            0
        };
        // floor(x * 0.2) in integer arithmetic
        let voting_accuracy = (record.voting_accuracy / 5).min(COMPONENT_CAP);
        let dao_participation = record
            .doi_participation
            .saturating_mul(2)
            .min(COMPONENT_CAP);

        let explained = civic_verification + voting_accuracy + dao_participation;
        let transaction_history = record
            .trust_score
            .saturating_sub(explained)
            .min(COMPONENT_CAP);

        Self {
            civic_verification,
            transaction_history,
            voting_accuracy,
            dao_participation,
            total: record.trust_score,
        }
    }

    pub fn component_sum(&self) -> u32 {
        self.civic_verification + self.transaction_history + self.voting_accuracy + self.dao_participation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(trust: u32, level: u32, accuracy: u32, doi: u32) -> SbtRecord {
        SbtRecord {
            wallet_address: "0x00000000000000000000000000000000000000aa".to_string(),
            token_id: 1,
            verification_level: level,
            trust_score: trust,
            voting_accuracy: accuracy,
            doi_participation: doi,
            metadata_uri: None,
            minted_at: Utc::now(),
            last_synced_at: Utc::now(),
            tx_hash: None,
            block_number: 1,
        }
    }

    #[test]
    fn test_reference_decomposition() {
        let b = TrustScoreBreakdown::decompose(&record(85, 1, 100, 50));
        assert_eq!(b.civic_verification, 40);
        assert_eq!(b.voting_accuracy, 20);
        assert_eq!(b.dao_participation, 20);
        assert_eq!(b.transaction_history, 5);
        assert_eq!(b.total, 85);
        assert_eq!(b.component_sum(), 85);
    }

    #[test]
    fn test_unverified_holder_gets_no_civic_points() {
        let b = TrustScoreBreakdown::decompose(&record(30, 0, 49, 3));
        assert_eq!(b.civic_verification, 0);
        assert_eq!(b.voting_accuracy, 9);
        assert_eq!(b.dao_participation, 6);
        assert_eq!(b.transaction_history, 15);
        assert_eq!(b.component_sum(), 30);
    }

    #[test]
    fn test_remainder_never_goes_negative() {
        let b = TrustScoreBreakdown::decompose(&record(10, 1, 100, 50));
        assert_eq!(b.transaction_history, 0);
        assert_eq!(b.total, 10);
    }

    #[test]
    fn test_remainder_saturates_above_explainable_score() {
        // 0 + 0 + 0 + 20 explains at most 20 points
        let b = TrustScoreBreakdown::decompose(&record(90, 0, 0, 0));
        assert_eq!(b.transaction_history, 20);
        assert_eq!(b.total, 90);
        assert!(b.component_sum() < b.total);
    }

    #[test]
    fn test_sum_matches_whenever_explainable() {
        for level in [0u32, 2] {
            for accuracy in [0u32, 37, 100] {
                for doi in [0u32, 4, 30] {
                    let explained = TrustScoreBreakdown::decompose(&record(0, level, accuracy, doi))
                        .component_sum();
                    let ceiling = (explained + COMPONENT_CAP).min(100);
                    for trust in explained..=ceiling {
                        let b = TrustScoreBreakdown::decompose(&record(trust, level, accuracy, doi));
                        assert_eq!(b.component_sum(), trust);
                    }
                }
            }
        }
    }
}
