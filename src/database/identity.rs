//! Session Repository - PostgreSQL persistence for identity sessions and the
//! verification attempt log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use tracing::info;

use super::SessionRepository;
use super::pool::{is_unique_violation, storage};
use crate::error::{TrustError, TrustResult};
use crate::identity::{CivicAuthSession, VerificationLog};

const SESSION_COLUMNS: &str = "user_address, gatekeeper_network, gate_pass, status, \
     token_expiry, last_verified, security_level, device_hash, risk_score, flags, is_refresh, \
     created_at";

const LOG_COLUMNS: &str = "user_address, verification_type, success, device_hash, \
     geo_location, risk_factors, created_at";

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize identity tables
    pub async fn init_schema(&self) -> TrustResult<()> {
        info!("Initializing civic schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS civic.auth_sessions (
                gate_pass TEXT PRIMARY KEY,
                user_address VARCHAR(42) NOT NULL,
                gatekeeper_network TEXT NOT NULL,
                status VARCHAR(16) NOT NULL,
                token_expiry TIMESTAMP WITH TIME ZONE NOT NULL,
                last_verified TIMESTAMP WITH TIME ZONE,
                security_level SMALLINT NOT NULL DEFAULT 1,
                device_hash VARCHAR(64),
                risk_score DOUBLE PRECISION NOT NULL DEFAULT 0,
                flags TEXT[] NOT NULL DEFAULT '{}',
                is_refresh BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create civic.auth_sessions"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS civic.verification_logs (
                id BIGSERIAL PRIMARY KEY,
                user_address VARCHAR(42) NOT NULL,
                verification_type VARCHAR(16) NOT NULL,
                success BOOLEAN NOT NULL,
                device_hash VARCHAR(64),
                geo_location TEXT,
                risk_factors TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create civic.verification_logs"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_address ON civic.auth_sessions(user_address, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create session address index"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_device ON civic.auth_sessions(device_hash)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create session device index"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_logs_address ON civic.verification_logs(user_address, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create log index"))?;

        info!("Civic schema initialized");
        Ok(())
    }
}

fn session_from_row(row: &PgRow) -> TrustResult<CivicAuthSession> {
    let status: String = row.get("status");
    let flags: Vec<String> = row.get("flags");
    Ok(CivicAuthSession {
        user_address: row.get("user_address"),
        gatekeeper_network: row.get("gatekeeper_network"),
        gate_pass: row.get("gate_pass"),
        status: status.parse()?,
        token_expiry: row.get("token_expiry"),
        last_verified: row.get("last_verified"),
        security_level: row.get::<i16, _>("security_level") as u8,
        device_hash: row.get("device_hash"),
        risk_score: row.get("risk_score"),
        flags: flags.into_iter().collect(),
        is_refresh: row.get("is_refresh"),
        created_at: row.get("created_at"),
    })
}

fn log_from_row(row: &PgRow) -> TrustResult<VerificationLog> {
    let verification_type: String = row.get("verification_type");
    Ok(VerificationLog {
        user_address: row.get("user_address"),
        verification_type: verification_type.parse()?,
        success: row.get("success"),
        device_hash: row.get("device_hash"),
        geo_location: row.get("geo_location"),
        risk_factors: row.get("risk_factors"),
        created_at: row.get("created_at"),
    })
}

fn flag_list(session: &CivicAuthSession) -> Vec<String> {
    session.flags.iter().cloned().collect()
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn replace_pending(&self, session: &CivicAuthSession) -> TrustResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        sqlx::query("DELETE FROM civic.auth_sessions WHERE user_address = $1 AND status = 'pending'")
            .bind(&session.user_address)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to drop pending sessions"))?;

        sqlx::query(&format!(
            r#"
            INSERT INTO civic.auth_sessions ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
            SESSION_COLUMNS
        ))
        .bind(&session.user_address)
        .bind(&session.gatekeeper_network)
        .bind(&session.gate_pass)
        .bind(session.status.as_str())
        .bind(session.token_expiry)
        .bind(session.last_verified)
        .bind(session.security_level as i16)
        .bind(&session.device_hash)
        .bind(session.risk_score)
        .bind(flag_list(session))
        .bind(session.is_refresh)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TrustError::invalid_input(&session.gate_pass, "gate pass already issued")
            } else {
                storage("Failed to insert session")(e)
            }
        })?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit session"))?;
        Ok(())
    }

    async fn get_by_gate_pass(&self, gate_pass: &str) -> TrustResult<Option<CivicAuthSession>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM civic.auth_sessions WHERE gate_pass = $1",
            SESSION_COLUMNS
        ))
        .bind(gate_pass)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to get session"))?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn save(&self, session: &CivicAuthSession) -> TrustResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE civic.auth_sessions SET
                status = $2,
                token_expiry = $3,
                last_verified = $4,
                security_level = $5,
                risk_score = $6,
                flags = $7,
                is_refresh = $8
            WHERE gate_pass = $1
            "#,
        )
        .bind(&session.gate_pass)
        .bind(session.status.as_str())
        .bind(session.token_expiry)
        .bind(session.last_verified)
        .bind(session.security_level as i16)
        .bind(session.risk_score)
        .bind(flag_list(session))
        .bind(session.is_refresh)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to save session"))?;

        if result.rows_affected() == 0 {
            return Err(TrustError::not_found("auth_session", session.gate_pass.clone()));
        }
        Ok(())
    }

    async fn sessions_for(&self, address: &str) -> TrustResult<Vec<CivicAuthSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM civic.auth_sessions WHERE user_address = $1 ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to get sessions"))?;

        rows.iter().map(session_from_row).collect()
    }

    async fn sessions_with_device(&self, device_hash: &str) -> TrustResult<Vec<CivicAuthSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM civic.auth_sessions WHERE device_hash = $1 ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(device_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to get sessions by device"))?;

        rows.iter().map(session_from_row).collect()
    }

    async fn flag_address(&self, address: &str, flag: &str) -> TrustResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM civic.auth_sessions WHERE user_address = $1 FOR UPDATE",
            SESSION_COLUMNS
        ))
        .bind(address)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage("Failed to lock sessions"))?;

        for row in &rows {
            let mut session = session_from_row(row)?;
            if !session.add_flag(flag) {
                continue;
            }
            sqlx::query(
                "UPDATE civic.auth_sessions SET flags = $2, risk_score = $3, security_level = $4 \
                 WHERE gate_pass = $1",
            )
            .bind(&session.gate_pass)
            .bind(flag_list(&session))
            .bind(session.risk_score)
            .bind(session.security_level as i16)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to flag session"))?;
        }

        tx.commit()
            .await
            .map_err(storage("Failed to commit flags"))?;
        Ok(())
    }

    async fn append_log(&self, log: &VerificationLog) -> TrustResult<()> {
        sqlx::query(&format!(
            "INSERT INTO civic.verification_logs ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            LOG_COLUMNS
        ))
        .bind(&log.user_address)
        .bind(log.verification_type.as_str())
        .bind(log.success)
        .bind(&log.device_hash)
        .bind(&log.geo_location)
        .bind(&log.risk_factors)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to append verification log"))?;
        Ok(())
    }

    async fn logs_since(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> TrustResult<Vec<VerificationLog>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM civic.verification_logs
            WHERE user_address = $1 AND created_at >= $2
            ORDER BY id DESC
            "#,
            LOG_COLUMNS
        ))
        .bind(address)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to get verification logs"))?;

        rows.iter().map(log_from_row).collect()
    }

    async fn last_geo_location(&self, address: &str) -> TrustResult<Option<String>> {
        let geo: Option<String> = sqlx::query_scalar(
            r#"
            SELECT geo_location FROM civic.verification_logs
            WHERE user_address = $1
              AND success
              AND verification_type = 'verification'
              AND geo_location IS NOT NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to get last location"))?;

        Ok(geo)
    }
}
