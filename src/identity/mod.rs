//! Identity Verification
//!
//! Gatepass challenges against an external identity provider, the session
//! state machine that gates high-value operations, and the device/location
//! heuristics that feed a risk signal to reputation scoring.
//!
//! ## Risk flags
//!
//! | Flag                          | Trigger                                     | Weight |
//! |-------------------------------|---------------------------------------------|--------|
//! | `multiple_devices_detected`   | more than 2 other devices on the address    | 0.3    |
//! | `rapid_verification_attempts` | more than 5 attempts in 5 minutes           | 0.4    |
//! | `location_change_detected`    | locale region differs from last verified    | 0.2    |
//! | `shared_device_detected`      | device also used by another address         | 0.3    |
//!
//! Flags raise the session's risk score (capped at 1.0) and security level;
//! none of them blocks verification.

mod fingerprint;
mod manager;
mod models;
mod provider;

pub use fingerprint::{device_hash, geo_location};
pub use manager::{IdentitySessionManager, SessionConfig};
pub use models::{
    AuthStatus, CivicAuthSession, FLAG_LOCATION_CHANGE, FLAG_MULTIPLE_DEVICES,
    FLAG_RAPID_ATTEMPTS, FLAG_SHARED_DEVICE, SessionStatus, VerificationLog, VerificationType,
    risk_score_for, security_level,
};
pub use provider::{CivicGatewayClient, CivicGatewayConfig, GatepassVerdict, IdentityProvider};
