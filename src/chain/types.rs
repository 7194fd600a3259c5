//! Types shared between the chain gateway and the mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TrustError, TrustResult};

/// Authoritative SBT fields as read from the contract at `block_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainSbtState {
    pub token_id: u64,
    pub verification_level: u32,
    pub trust_score: u32,
    pub voting_accuracy: u32,
    pub doi_participation: u32,
    pub minted_at: DateTime<Utc>,
    pub block_number: u64,
}

/// Lowercase, trimmed form used as the cache key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Normalize and check the `0x` + 40 hex digit shape.
pub fn parse_address(address: &str) -> TrustResult<String> {
    let normalized = normalize_address(address);
    let valid = normalized.len() == 42
        && normalized.starts_with("0x")
        && normalized[2..].chars().all(|c| c.is_ascii_hexdigit());

    if valid {
        Ok(normalized)
    } else {
        Err(TrustError::invalid_input(
            address,
            "expected 0x-prefixed 20-byte hex address",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_normalizes() {
        let addr = parse_address(" 0xAbCdEf0123456789abcdef0123456789ABCDEF01 ").unwrap();
        assert_eq!(addr, "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("zz00000000000000000000000000000000000000aa").is_err());
        assert!(parse_address("0xg000000000000000000000000000000000000000").is_err());
    }
}
