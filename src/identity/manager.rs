//! IdentitySessionManager - gatepass challenge and session lifecycle
//!
//! ```text
//! (none) ──initiate──► Pending ──verify ok, before deadline──► Verified ──ttl──► Expired
//!                         │
//!                         └──provider rejects──► Pending (logged, unchanged)
//!                         └──deadline passed───► Expired
//! ```
//!
//! Expiry is a property of the stored deadline and is evaluated on every
//! read. A verified user may be re-challenged; the fresh pending session
//! does not hide the earlier verified one until that one expires.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::fingerprint::{device_hash, geo_location};
use super::models::{
    AuthStatus, CivicAuthSession, FLAG_LOCATION_CHANGE, FLAG_MULTIPLE_DEVICES,
    FLAG_RAPID_ATTEMPTS, FLAG_SHARED_DEVICE, SessionStatus, VerificationLog, VerificationType,
    risk_score_for, security_level,
};
use super::provider::IdentityProvider;
use crate::chain::parse_address;
use crate::clock::TimeSource;
use crate::config::sanitize_for_logging;
use crate::database::SessionRepository;
use crate::error::{TrustError, TrustResult};

/// Other device hashes an address may use before it is flagged.
const MAX_OTHER_DEVICES: usize = 2;
/// Attempts tolerated inside the rapid-attempt window.
const MAX_RECENT_ATTEMPTS: usize = 5;
const RAPID_ATTEMPT_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub gatekeeper_network: String,
    /// Lifetime of a verified session
    pub session_ttl: Duration,
    /// How long a pending challenge may be answered
    pub challenge_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gatekeeper_network: "ignite".to_string(),
            session_ttl: Duration::hours(24),
            challenge_ttl: Duration::minutes(30),
        }
    }
}

pub struct IdentitySessionManager {
    repo: Arc<dyn SessionRepository>,
    provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn TimeSource>,
    config: SessionConfig,
}

impl IdentitySessionManager {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn TimeSource>,
        config: SessionConfig,
    ) -> Self {
        Self {
            repo,
            provider,
            clock,
            config,
        }
    }

    /// Open a pending challenge, replacing any earlier pending one.
    pub async fn initiate_auth(
        &self,
        address: &str,
        device_info: &str,
    ) -> TrustResult<CivicAuthSession> {
        let address = parse_address(address)?;
        let now = self.clock.now();

        let previous = self.repo.sessions_for(&address).await?;
        let is_refresh = previous
            .iter()
            .any(|s| s.status == SessionStatus::Verified);

        let gate_pass = self
            .provider
            .initiate_challenge(&address, &self.config.gatekeeper_network)
            .await?;

        let session = CivicAuthSession {
            user_address: address.clone(),
            gatekeeper_network: self.config.gatekeeper_network.clone(),
            gate_pass,
            status: SessionStatus::Pending,
            token_expiry: now + self.config.challenge_ttl,
            last_verified: None,
            security_level: 1,
            device_hash: device_hash(device_info),
            risk_score: 0.0,
            flags: BTreeSet::new(),
            is_refresh,
            created_at: now,
        };
        self.repo.replace_pending(&session).await?;

        let verification_type = if is_refresh {
            VerificationType::Refresh
        } else {
            VerificationType::Initial
        };
        self.log_attempt(&address, verification_type, true, device_info, Vec::new(), now)
            .await?;

        info!(
            address = %address,
            gate_pass = %sanitize_for_logging(&session.gate_pass),
            refresh = is_refresh,
            "Identity challenge initiated"
        );
        Ok(session)
    }

    /// Answer a pending challenge with the gatepass the provider issued.
    ///
    /// A provider rejection is logged with the attempt's risk factors and
    /// leaves the session pending. Verifying after the challenge deadline
    /// expires the session.
    pub async fn verify_gatepass(
        &self,
        gate_pass: &str,
        device_info: &str,
    ) -> TrustResult<CivicAuthSession> {
        let key = sanitize_for_logging(gate_pass);
        let mut session = self
            .repo
            .get_by_gate_pass(gate_pass)
            .await?
            .ok_or_else(|| TrustError::not_found("auth_session", key.clone()))?;
        let address = session.user_address.clone();
        let now = self.clock.now();

        let status = session.status;
        match status {
            SessionStatus::Pending => {}
            SessionStatus::Verified if session.is_valid(now) => return Ok(session),
            _ => {
                return Err(TrustError::VerificationFailed {
                    key,
                    reason: "session is no longer pending".to_string(),
                });
            }
        }

        if now >= session.token_expiry {
            session.status = SessionStatus::Expired;
            self.repo.save(&session).await?;
            self.log_attempt(
                &address,
                VerificationType::Verification,
                false,
                device_info,
                Vec::new(),
                now,
            )
            .await?;
            return Err(TrustError::VerificationFailed {
                key,
                reason: "challenge window lapsed".to_string(),
            });
        }

        let hash = device_hash(device_info);
        let risk_factors = self
            .security_checks(&address, hash.as_deref(), device_info, now)
            .await?;

        let verdict = match self.provider.verify_gatepass(gate_pass).await {
            Ok(verdict) => verdict,
            Err(e) => {
                self.log_attempt(
                    &address,
                    VerificationType::Verification,
                    false,
                    device_info,
                    risk_factors,
                    now,
                )
                .await?;
                return Err(e);
            }
        };

        if !verdict.valid {
            warn!(
                address = %address,
                risk_factors = ?risk_factors,
                "Gatepass rejected by identity provider"
            );
            self.log_attempt(
                &address,
                VerificationType::Verification,
                false,
                device_info,
                risk_factors,
                now,
            )
            .await?;
            return Err(TrustError::VerificationFailed {
                key,
                reason: "gatepass rejected by provider".to_string(),
            });
        }

        let shared_with = match &hash {
            Some(hash) => self.correlate_device(&address, hash).await?,
            None => Vec::new(),
        };

        session.device_hash = hash;
        session.flags.extend(risk_factors.iter().cloned());
        if !shared_with.is_empty() {
            session.flags.insert(FLAG_SHARED_DEVICE.to_string());
        }
        session.risk_score = risk_score_for(&session.flags);
        session.security_level = security_level(session.risk_score, session.is_refresh);
        session.status = SessionStatus::Verified;
        session.last_verified = Some(now);
        session.token_expiry = verdict
            .expires_at
            .map_or(now + self.config.session_ttl, |provider| {
                provider.min(now + self.config.session_ttl)
            });
        self.repo.save(&session).await?;

        for other in &shared_with {
            self.repo.flag_address(other, FLAG_SHARED_DEVICE).await?;
        }
        if !shared_with.is_empty() {
            warn!(
                address = %address,
                shared_with = ?shared_with,
                "Device fingerprint shared across addresses"
            );
        }

        self.log_attempt(
            &address,
            VerificationType::Verification,
            true,
            device_info,
            risk_factors,
            now,
        )
        .await?;

        info!(
            address = %address,
            security_level = session.security_level,
            risk_score = session.risk_score,
            expires = %session.token_expiry,
            "Identity verified"
        );
        Ok(session)
    }

    /// True iff some session is verified and not yet past its deadline.
    pub async fn is_session_valid(&self, address: &str) -> TrustResult<bool> {
        let address = parse_address(address)?;
        let now = self.clock.now();
        Ok(self
            .repo
            .sessions_for(&address)
            .await?
            .iter()
            .any(|s| s.is_valid(now)))
    }

    /// Latest session with its status as of now.
    pub async fn get_auth_status(&self, address: &str) -> TrustResult<AuthStatus> {
        let address = parse_address(address)?;
        let now = self.clock.now();
        let sessions = self.repo.sessions_for(&address).await?;

        let latest = sessions
            .first()
            .ok_or_else(|| TrustError::not_found("auth_session", address.clone()))?;

        Ok(AuthStatus {
            address: address.clone(),
            status: latest.effective_status(now),
            is_valid: sessions.iter().any(|s| s.is_valid(now)),
            security_level: latest.security_level,
            expires: latest.token_expiry,
            last_verified: latest.last_verified,
            risk_score: latest.risk_score,
            security_flags: latest.flags.iter().cloned().collect(),
        })
    }

    /// Gate for high-value operations.
    pub async fn require_valid_session(&self, address: &str) -> TrustResult<CivicAuthSession> {
        let address = parse_address(address)?;
        let now = self.clock.now();
        let sessions = self.repo.sessions_for(&address).await?;

        if sessions.is_empty() {
            return Err(TrustError::not_found("auth_session", address));
        }
        sessions
            .into_iter()
            .find(|s| s.is_valid(now))
            .ok_or_else(|| TrustError::VerificationFailed {
                key: address,
                reason: "no valid identity session".to_string(),
            })
    }

    async fn security_checks(
        &self,
        address: &str,
        hash: Option<&str>,
        device_info: &str,
        now: DateTime<Utc>,
    ) -> TrustResult<Vec<String>> {
        let mut flags = Vec::new();

        // No descriptor, no device to compare
        if let Some(hash) = hash {
            let other_devices: HashSet<String> = self
                .repo
                .sessions_for(address)
                .await?
                .into_iter()
                .filter_map(|s| s.device_hash)
                .filter(|h| h != hash)
                .collect();
            if other_devices.len() > MAX_OTHER_DEVICES {
                flags.push(FLAG_MULTIPLE_DEVICES.to_string());
            }
        }

        let since = now - Duration::minutes(RAPID_ATTEMPT_WINDOW_MINUTES);
        if self.repo.logs_since(address, since).await?.len() > MAX_RECENT_ATTEMPTS {
            flags.push(FLAG_RAPID_ATTEMPTS.to_string());
        }

        if let Some(geo) = geo_location(device_info) {
            if let Some(last) = self.repo.last_geo_location(address).await? {
                if last != geo {
                    flags.push(FLAG_LOCATION_CHANGE.to_string());
                }
            }
        }

        Ok(flags)
    }

    /// Other addresses whose sessions carry the same device hash.
    async fn correlate_device(&self, address: &str, hash: &str) -> TrustResult<Vec<String>> {
        let mut others: Vec<String> = self
            .repo
            .sessions_with_device(hash)
            .await?
            .into_iter()
            .map(|s| s.user_address)
            .filter(|a| a != address)
            .collect();
        others.sort();
        others.dedup();
        Ok(others)
    }

    async fn log_attempt(
        &self,
        address: &str,
        verification_type: VerificationType,
        success: bool,
        device_info: &str,
        risk_factors: Vec<String>,
        now: DateTime<Utc>,
    ) -> TrustResult<()> {
        self.repo
            .append_log(&VerificationLog {
                user_address: address.to_string(),
                verification_type,
                success,
                device_hash: device_hash(device_info),
                geo_location: geo_location(device_info),
                risk_factors,
                created_at: now,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::database::MemorySessionRepository;
    use crate::identity::GatepassVerdict;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";
    const BOB: &str = "0x00000000000000000000000000000000000000b2";
    const LAPTOP: &str = "Mozilla/5.0|en-US|1920x1080";

    /// Issues sequential gatepasses and accepts those not starting with "bad".
    struct StubProvider {
        issued: AtomicU32,
        prefix: &'static str,
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        async fn initiate_challenge(&self, _address: &str, _network: &str) -> TrustResult<String> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}-{}", self.prefix, n))
        }

        async fn verify_gatepass(&self, token: &str) -> TrustResult<GatepassVerdict> {
            Ok(GatepassVerdict {
                valid: !token.starts_with("bad"),
                expires_at: None,
            })
        }
    }

    fn manager_with(prefix: &'static str) -> (IdentitySessionManager, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(Utc::now()));
        let manager = IdentitySessionManager::new(
            Arc::new(MemorySessionRepository::new()),
            Arc::new(StubProvider {
                issued: AtomicU32::new(0),
                prefix,
            }),
            clock.clone(),
            SessionConfig::default(),
        );
        (manager, clock)
    }

    #[test]
    fn test_security_level_rules() {
        assert_eq!(security_level(0.0, false), 1);
        assert_eq!(security_level(0.3, false), 1);
        assert_eq!(security_level(0.0, true), 2);
        assert_eq!(security_level(0.4, false), 2);
        assert_eq!(security_level(0.8, false), 3);
    }

    #[tokio::test]
    async fn test_verify_then_expire() {
        let (manager, clock) = manager_with("gp");
        let pending = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();
        assert_eq!(pending.status, SessionStatus::Pending);
        assert!(!manager.is_session_valid(ALICE).await.unwrap());

        let verified = manager.verify_gatepass(&pending.gate_pass, LAPTOP).await.unwrap();
        assert_eq!(verified.status, SessionStatus::Verified);
        assert_eq!(verified.security_level, 1);
        assert_eq!(verified.token_expiry, clock.now() + Duration::hours(24));
        assert!(manager.is_session_valid(ALICE).await.unwrap());

        clock.advance(Duration::hours(24));
        assert!(!manager.is_session_valid(ALICE).await.unwrap());
        let status = manager.get_auth_status(ALICE).await.unwrap();
        assert_eq!(status.status, SessionStatus::Expired);
        assert_eq!(
            manager.require_valid_session(ALICE).await.unwrap_err().code(),
            "verification_failed"
        );
    }

    #[tokio::test]
    async fn test_rejected_gatepass_leaves_session_pending() {
        let (manager, _) = manager_with("bad");
        let pending = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();

        let err = manager
            .verify_gatepass(&pending.gate_pass, LAPTOP)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "verification_failed");

        let status = manager.get_auth_status(ALICE).await.unwrap();
        assert_eq!(status.status, SessionStatus::Pending);
        assert!(!status.is_valid);
    }

    #[tokio::test]
    async fn test_lapsed_challenge_expires() {
        let (manager, clock) = manager_with("gp");
        let pending = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();

        clock.advance(Duration::minutes(31));
        let err = manager
            .verify_gatepass(&pending.gate_pass, LAPTOP)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "verification_failed");
        assert_eq!(
            manager.get_auth_status(ALICE).await.unwrap().status,
            SessionStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_rechallenge_keeps_prior_session_valid() {
        let (manager, _) = manager_with("gp");
        let first = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();
        manager.verify_gatepass(&first.gate_pass, LAPTOP).await.unwrap();

        let second = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();
        assert!(second.is_refresh);
        assert!(manager.is_session_valid(ALICE).await.unwrap());

        let status = manager.get_auth_status(ALICE).await.unwrap();
        assert_eq!(status.status, SessionStatus::Pending);
        assert!(status.is_valid);

        let refreshed = manager.verify_gatepass(&second.gate_pass, LAPTOP).await.unwrap();
        assert_eq!(refreshed.security_level, 2);
    }

    #[tokio::test]
    async fn test_shared_device_flags_both_addresses() {
        let (manager, _) = manager_with("gp");
        let a = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();
        manager.verify_gatepass(&a.gate_pass, LAPTOP).await.unwrap();

        let b = manager.initiate_auth(BOB, LAPTOP).await.unwrap();
        let bob = manager.verify_gatepass(&b.gate_pass, LAPTOP).await.unwrap();
        assert!(bob.flags.contains(FLAG_SHARED_DEVICE));
        assert!((bob.risk_score - 0.3).abs() < f64::EPSILON);

        let alice = manager.get_auth_status(ALICE).await.unwrap();
        assert!(alice.security_flags.iter().any(|f| f == FLAG_SHARED_DEVICE));
        // Flagging never blocks
        assert!(manager.is_session_valid(ALICE).await.unwrap());
        assert!(manager.is_session_valid(BOB).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_device_info_is_not_a_shared_device() {
        let (manager, _) = manager_with("gp");
        let a = manager.initiate_auth(ALICE, "").await.unwrap();
        manager.verify_gatepass(&a.gate_pass, "").await.unwrap();

        let b = manager.initiate_auth(BOB, "").await.unwrap();
        let bob = manager.verify_gatepass(&b.gate_pass, "").await.unwrap();
        assert!(bob.device_hash.is_none());
        assert!(bob.flags.is_empty());
        assert_eq!(bob.risk_score, 0.0);
        assert_eq!(bob.security_level, 1);

        let alice = manager.get_auth_status(ALICE).await.unwrap();
        assert!(alice.security_flags.is_empty());
    }

    #[tokio::test]
    async fn test_location_change_is_flagged() {
        let (manager, _) = manager_with("gp");
        let first = manager.initiate_auth(ALICE, LAPTOP).await.unwrap();
        manager.verify_gatepass(&first.gate_pass, LAPTOP).await.unwrap();

        let abroad = "Mozilla/5.0|de-DE|1920x1080";
        let second = manager.initiate_auth(ALICE, abroad).await.unwrap();
        let session = manager.verify_gatepass(&second.gate_pass, abroad).await.unwrap();
        assert!(session.flags.contains(FLAG_LOCATION_CHANGE));
    }

    #[tokio::test]
    async fn test_unknown_gatepass_is_not_found() {
        let (manager, _) = manager_with("gp");
        let err = manager.verify_gatepass("nope", LAPTOP).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
