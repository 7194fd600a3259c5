//! SBT cache rows and audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::OnChainSbtState;
use crate::reputation::TrustScoreBreakdown;

/// Cached copy of one wallet's soulbound token. Unique per wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtRecord {
    pub wallet_address: String,
    /// Immutable once minted
    pub token_id: u64,
    /// 0 = none, 1 = basic, 2 = advanced, 3 = premium
    pub verification_level: u32,
    /// 0-100
    pub trust_score: u32,
    /// 0-100
    pub voting_accuracy: u32,
    /// Total DAO votes cast by the holder
    pub doi_participation: u32,
    pub metadata_uri: Option<String>,
    pub minted_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
    /// Tx of the last applied mint/update event
    pub tx_hash: Option<String>,
    /// Block of the last applied write; drives the stale-write check
    pub block_number: u64,
}

impl SbtRecord {
    /// Fresh record for a mint event; scores stay zero until a chain sync.
    pub fn from_mint(event: &SbtMintEvent, now: DateTime<Utc>) -> Self {
        Self {
            wallet_address: event.wallet_address.clone(),
            token_id: event.token_id,
            verification_level: 0,
            trust_score: 0,
            voting_accuracy: 0,
            doi_participation: 0,
            metadata_uri: None,
            minted_at: event.minted_at,
            last_synced_at: now,
            tx_hash: Some(event.tx_hash.clone()),
            block_number: event.block_number,
        }
    }

    pub fn from_chain(wallet: &str, state: &OnChainSbtState, now: DateTime<Utc>) -> Self {
        Self {
            wallet_address: wallet.to_string(),
            token_id: state.token_id,
            verification_level: state.verification_level,
            trust_score: state.trust_score,
            voting_accuracy: state.voting_accuracy,
            doi_participation: state.doi_participation,
            metadata_uri: None,
            minted_at: state.minted_at,
            last_synced_at: now,
            tx_hash: None,
            block_number: state.block_number,
        }
    }

    /// Overwrite the chain-owned fields. Callers have already passed the
    /// token and stale-write checks.
    pub fn overwrite_from_chain(&mut self, state: &OnChainSbtState, now: DateTime<Utc>) {
        self.verification_level = state.verification_level;
        self.trust_score = state.trust_score;
        self.voting_accuracy = state.voting_accuracy;
        self.doi_participation = state.doi_participation;
        self.minted_at = state.minted_at;
        self.block_number = state.block_number;
        self.last_synced_at = now;
    }

    pub fn breakdown(&self) -> TrustScoreBreakdown {
        TrustScoreBreakdown::decompose(self)
    }
}

/// `SBTMinted(to, tokenId)` audit row, keyed by tx hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtMintEvent {
    pub tx_hash: String,
    pub wallet_address: String,
    pub token_id: u64,
    pub block_number: u64,
    pub minted_at: DateTime<Utc>,
}

/// `MetadataUpdated(tokenId, newUri)` audit row, keyed by tx hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtUpdateEvent {
    pub tx_hash: String,
    pub token_id: u64,
    pub new_uri: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub wallet_address: String,
    pub trust_score: u32,
    pub verification_level: u32,
    pub voting_accuracy: u32,
    pub doi_participation: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtStats {
    pub total_minted: u64,
    pub avg_trust_score: f64,
    pub premium_holders: u64,
    pub total_mint_events: u64,
    pub total_update_events: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtExportRecord {
    pub wallet_address: String,
    pub trust_score: u32,
    pub verification_level: u32,
    pub breakdown: TrustScoreBreakdown,
    pub minted_at: DateTime<Utc>,
}

impl From<&SbtRecord> for SbtExportRecord {
    fn from(record: &SbtRecord) -> Self {
        Self {
            wallet_address: record.wallet_address.clone(),
            trust_score: record.trust_score,
            verification_level: record.verification_level,
            breakdown: record.breakdown(),
            minted_at: record.minted_at,
        }
    }
}

/// On-chain status check result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtStatus {
    pub address: String,
    pub has_sbt: bool,
    pub is_verified: bool,
    pub cached: bool,
}
