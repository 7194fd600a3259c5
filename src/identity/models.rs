//! Identity session and verification log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::TrustError;

pub const FLAG_MULTIPLE_DEVICES: &str = "multiple_devices_detected";
pub const FLAG_RAPID_ATTEMPTS: &str = "rapid_verification_attempts";
pub const FLAG_LOCATION_CHANGE: &str = "location_change_detected";
pub const FLAG_SHARED_DEVICE: &str = "shared_device_detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Verified,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Verified => "verified",
            SessionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "verified" => Ok(SessionStatus::Verified),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(TrustError::invalid_input(other, "unknown session status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    Initial,
    Refresh,
    Verification,
}

impl VerificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationType::Initial => "initial",
            VerificationType::Refresh => "refresh",
            VerificationType::Verification => "verification",
        }
    }
}

impl FromStr for VerificationType {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(VerificationType::Initial),
            "refresh" => Ok(VerificationType::Refresh),
            "verification" => Ok(VerificationType::Verification),
            other => Err(TrustError::invalid_input(other, "unknown verification type")),
        }
    }
}

/// One gatepass challenge for a user. The gate pass is unique; an address
/// has at most one pending session, while earlier verified sessions stay
/// readable until their expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CivicAuthSession {
    pub user_address: String,
    pub gatekeeper_network: String,
    pub gate_pass: String,
    pub status: SessionStatus,
    /// Challenge deadline while pending, session deadline once verified
    pub token_expiry: DateTime<Utc>,
    pub last_verified: Option<DateTime<Utc>>,
    /// 1 basic, 2 enhanced, 3 maximum
    pub security_level: u8,
    pub device_hash: Option<String>,
    pub risk_score: f64,
    pub flags: BTreeSet<String>,
    /// Whether this challenge superseded an earlier session
    pub is_refresh: bool,
    pub created_at: DateTime<Utc>,
}

impl CivicAuthSession {
    /// Status as of `now`; expiry is evaluated on read, never swept.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        match self.status {
            SessionStatus::Verified | SessionStatus::Pending if now >= self.token_expiry => {
                SessionStatus::Expired
            }
            status => status,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Verified && now < self.token_expiry
    }

    /// Set-insert a flag and recompute risk and security level from the
    /// flag set.
    pub fn add_flag(&mut self, flag: &str) -> bool {
        let added = self.flags.insert(flag.to_string());
        self.risk_score = risk_score_for(&self.flags);
        self.security_level = security_level(self.risk_score, self.is_refresh);
        added
    }
}

/// Append-only record of one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLog {
    pub user_address: String,
    pub verification_type: VerificationType,
    pub success: bool,
    pub device_hash: Option<String>,
    /// Region hint from the client locale, when one was supplied
    pub geo_location: Option<String>,
    pub risk_factors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Read-side view returned by `GetAuthStatus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub address: String,
    pub status: SessionStatus,
    pub is_valid: bool,
    pub security_level: u8,
    pub expires: DateTime<Utc>,
    pub last_verified: Option<DateTime<Utc>>,
    pub risk_score: f64,
    pub security_flags: Vec<String>,
}

/// 3 when risk is high, 2 when elevated or re-verifying, else 1.
pub fn security_level(risk_score: f64, is_refresh: bool) -> u8 {
    if risk_score > 0.7 {
        3
    } else if risk_score > 0.3 || is_refresh {
        2
    } else {
        1
    }
}

/// Additive weights per flag, capped at 1.0.
pub fn risk_score_for(flags: &BTreeSet<String>) -> f64 {
    let score: f64 = flags
        .iter()
        .map(|flag| match flag.as_str() {
            FLAG_MULTIPLE_DEVICES => 0.3,
            FLAG_RAPID_ATTEMPTS => 0.4,
            FLAG_LOCATION_CHANGE => 0.2,
            FLAG_SHARED_DEVICE => 0.3,
            _ => 0.0,
        })
        .sum();
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: SessionStatus, expiry: DateTime<Utc>) -> CivicAuthSession {
        CivicAuthSession {
            user_address: "0x01".to_string(),
            gatekeeper_network: "net".to_string(),
            gate_pass: "gp".to_string(),
            status,
            token_expiry: expiry,
            last_verified: None,
            security_level: 1,
            device_hash: Some("dev".to_string()),
            risk_score: 0.0,
            flags: BTreeSet::new(),
            is_refresh: false,
            created_at: expiry - Duration::hours(24),
        }
    }

    #[test]
    fn test_expiry_is_evaluated_at_read_time() {
        let now = Utc::now();
        let s = session(SessionStatus::Verified, now + Duration::minutes(1));
        assert!(s.is_valid(now));
        assert_eq!(s.effective_status(now), SessionStatus::Verified);

        let later = now + Duration::minutes(1);
        assert!(!s.is_valid(later));
        assert_eq!(s.effective_status(later), SessionStatus::Expired);
    }

    #[test]
    fn test_pending_is_never_valid() {
        let now = Utc::now();
        let s = session(SessionStatus::Pending, now + Duration::hours(1));
        assert!(!s.is_valid(now));
    }

    #[test]
    fn test_flags_are_a_set_and_drive_risk() {
        let now = Utc::now();
        let mut s = session(SessionStatus::Verified, now);
        assert!(s.add_flag(FLAG_SHARED_DEVICE));
        assert!(!s.add_flag(FLAG_SHARED_DEVICE));
        assert_eq!(s.flags.len(), 1);
        assert!((s.risk_score - 0.3).abs() < f64::EPSILON);

        s.add_flag(FLAG_RAPID_ATTEMPTS);
        s.add_flag(FLAG_MULTIPLE_DEVICES);
        s.add_flag(FLAG_LOCATION_CHANGE);
        assert!((s.risk_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_late_flags_raise_security_level() {
        let now = Utc::now();
        let mut s = session(SessionStatus::Verified, now);
        assert_eq!(s.security_level, 1);

        s.add_flag(FLAG_RAPID_ATTEMPTS);
        assert_eq!(s.security_level, 2);
        s.add_flag(FLAG_SHARED_DEVICE);
        assert_eq!(s.security_level, 2);
        s.add_flag(FLAG_LOCATION_CHANGE);
        assert_eq!(s.security_level, 3);
    }
}
