//! SBT Repository - PostgreSQL persistence for the SBT cache
//!
//! Event de-duplication rides on the `tx_hash` primary keys; ordering of
//! cache writes rides on the record's `block_number`, checked inside the
//! same statement or transaction that performs the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use tracing::{debug, info};

use super::SbtRepository;
use super::pool::{is_unique_violation, storage};
use crate::chain::OnChainSbtState;
use crate::error::{TrustError, TrustResult};
use crate::sbt::{SbtMintEvent, SbtRecord, SbtStats, SbtUpdateEvent};

const RECORD_COLUMNS: &str = "wallet_address, token_id, verification_level, trust_score, \
     voting_accuracy, doi_participation, metadata_uri, minted_at, last_synced_at, tx_hash, \
     block_number";

pub struct PgSbtRepository {
    pool: PgPool,
}

impl PgSbtRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize SBT tables
    pub async fn init_schema(&self) -> TrustResult<()> {
        info!("Initializing sbt schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sbt.records (
                wallet_address VARCHAR(42) PRIMARY KEY,
                token_id BIGINT NOT NULL UNIQUE,
                verification_level INTEGER NOT NULL DEFAULT 0,
                trust_score INTEGER NOT NULL DEFAULT 0,
                voting_accuracy INTEGER NOT NULL DEFAULT 0,
                doi_participation INTEGER NOT NULL DEFAULT 0,
                metadata_uri TEXT,
                minted_at TIMESTAMP WITH TIME ZONE NOT NULL,
                last_synced_at TIMESTAMP WITH TIME ZONE NOT NULL,
                tx_hash VARCHAR(66),
                block_number BIGINT NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create sbt.records"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sbt.mint_events (
                tx_hash VARCHAR(66) PRIMARY KEY,
                wallet_address VARCHAR(42) NOT NULL,
                token_id BIGINT NOT NULL,
                block_number BIGINT NOT NULL,
                minted_at TIMESTAMP WITH TIME ZONE NOT NULL,
                recorded_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create sbt.mint_events"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sbt.update_events (
                tx_hash VARCHAR(66) PRIMARY KEY,
                token_id BIGINT NOT NULL,
                new_uri TEXT NOT NULL,
                block_number BIGINT NOT NULL,
                recorded_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create sbt.update_events"))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sbt_records_trust ON sbt.records(trust_score DESC)")
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to create trust score index"))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sbt_mint_wallet ON sbt.mint_events(wallet_address)")
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to create mint events index"))?;

        info!("SBT schema initialized");
        Ok(())
    }

    /// Explains why a guarded upsert wrote nothing.
    async fn rejection<'e, E>(
        executor: E,
        wallet: &str,
        token_id: u64,
        block_number: u64,
    ) -> TrustError
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query("SELECT token_id, block_number FROM sbt.records WHERE wallet_address = $1")
            .bind(wallet)
            .fetch_optional(executor)
            .await;

        match row {
            Ok(Some(row)) => {
                let existing = row.get::<i64, _>("token_id") as u64;
                let applied = row.get::<i64, _>("block_number") as u64;
                if existing != token_id {
                    TrustError::AlreadyMinted {
                        wallet: wallet.to_string(),
                        existing,
                        incoming: token_id,
                    }
                } else {
                    TrustError::StaleWrite {
                        key: wallet.to_string(),
                        incoming: block_number,
                        applied,
                    }
                }
            }
            Ok(None) => TrustError::Storage(format!("record for {} vanished during write", wallet)),
            Err(e) => storage("Failed to read record")(e),
        }
    }
}

fn record_from_row(row: &PgRow) -> SbtRecord {
    SbtRecord {
        wallet_address: row.get("wallet_address"),
        token_id: row.get::<i64, _>("token_id") as u64,
        verification_level: row.get::<i32, _>("verification_level") as u32,
        trust_score: row.get::<i32, _>("trust_score") as u32,
        voting_accuracy: row.get::<i32, _>("voting_accuracy") as u32,
        doi_participation: row.get::<i32, _>("doi_participation") as u32,
        metadata_uri: row.get("metadata_uri"),
        minted_at: row.get("minted_at"),
        last_synced_at: row.get("last_synced_at"),
        tx_hash: row.get("tx_hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
    }
}

fn token_conflict(wallet: &str, token_id: u64) -> TrustError {
    TrustError::invalid_input(wallet, format!("token {} is held by another wallet", token_id))
}

#[async_trait]
impl SbtRepository for PgSbtRepository {
    async fn apply_mint(
        &self,
        event: &SbtMintEvent,
        now: DateTime<Utc>,
    ) -> TrustResult<SbtRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sbt.mint_events (tx_hash, wallet_address, token_id, block_number, minted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(&event.tx_hash)
        .bind(&event.wallet_address)
        .bind(event.token_id as i64)
        .bind(event.block_number as i64)
        .bind(event.minted_at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to insert mint event"))?;

        if inserted.rows_affected() == 0 {
            return Err(TrustError::DuplicateEvent {
                tx_hash: event.tx_hash.clone(),
            });
        }

        // Existing rows only advance when they already carry this token.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sbt.records
                (wallet_address, token_id, minted_at, last_synced_at, tx_hash, block_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (wallet_address) DO UPDATE SET
                tx_hash = CASE WHEN EXCLUDED.block_number > sbt.records.block_number
                               THEN EXCLUDED.tx_hash ELSE sbt.records.tx_hash END,
                block_number = GREATEST(sbt.records.block_number, EXCLUDED.block_number)
            WHERE sbt.records.token_id = EXCLUDED.token_id
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(&event.wallet_address)
        .bind(event.token_id as i64)
        .bind(event.minted_at)
        .bind(now)
        .bind(&event.tx_hash)
        .bind(event.block_number as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                token_conflict(&event.wallet_address, event.token_id)
            } else {
                storage("Failed to upsert record")(e)
            }
        })?;

        let Some(row) = row else {
            return Err(Self::rejection(
                &mut *tx,
                &event.wallet_address,
                event.token_id,
                event.block_number,
            )
            .await);
        };
        let record = record_from_row(&row);

        tx.commit()
            .await
            .map_err(storage("Failed to commit mint"))?;

        debug!(wallet = %record.wallet_address, tx_hash = %event.tx_hash, "Mint event stored");
        Ok(record)
    }

    async fn apply_update(&self, event: &SbtUpdateEvent) -> TrustResult<SbtRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sbt.update_events (tx_hash, token_id, new_uri, block_number)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(&event.tx_hash)
        .bind(event.token_id as i64)
        .bind(&event.new_uri)
        .bind(event.block_number as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to insert update event"))?;

        if inserted.rows_affected() == 0 {
            return Err(TrustError::DuplicateEvent {
                tx_hash: event.tx_hash.clone(),
            });
        }

        let current = sqlx::query(
            "SELECT wallet_address, block_number FROM sbt.records WHERE token_id = $1 FOR UPDATE",
        )
        .bind(event.token_id as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to lock record"))?
        .ok_or_else(|| TrustError::not_found("sbt_token", event.token_id.to_string()))?;

        let wallet: String = current.get("wallet_address");
        let applied = current.get::<i64, _>("block_number") as u64;
        if event.block_number <= applied {
            return Err(TrustError::StaleWrite {
                key: wallet,
                incoming: event.block_number,
                applied,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE sbt.records
            SET metadata_uri = $2, tx_hash = $3, block_number = $4
            WHERE wallet_address = $1
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(&wallet)
        .bind(&event.new_uri)
        .bind(&event.tx_hash)
        .bind(event.block_number as i64)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage("Failed to update record"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit update"))?;

        Ok(record_from_row(&row))
    }

    async fn apply_sync(
        &self,
        wallet: &str,
        state: &OnChainSbtState,
        now: DateTime<Utc>,
    ) -> TrustResult<SbtRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sbt.records
                (wallet_address, token_id, verification_level, trust_score, voting_accuracy,
                 doi_participation, minted_at, last_synced_at, block_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (wallet_address) DO UPDATE SET
                verification_level = EXCLUDED.verification_level,
                trust_score = EXCLUDED.trust_score,
                voting_accuracy = EXCLUDED.voting_accuracy,
                doi_participation = EXCLUDED.doi_participation,
                minted_at = EXCLUDED.minted_at,
                last_synced_at = EXCLUDED.last_synced_at,
                block_number = EXCLUDED.block_number
            WHERE sbt.records.token_id = EXCLUDED.token_id
              AND sbt.records.block_number < EXCLUDED.block_number
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(wallet)
        .bind(state.token_id as i64)
        .bind(state.verification_level as i32)
        .bind(state.trust_score as i32)
        .bind(state.voting_accuracy as i32)
        .bind(state.doi_participation as i32)
        .bind(state.minted_at)
        .bind(now)
        .bind(state.block_number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                token_conflict(wallet, state.token_id)
            } else {
                storage("Failed to sync record")(e)
            }
        })?;

        match row {
            Some(row) => Ok(record_from_row(&row)),
            None => Err(Self::rejection(&self.pool, wallet, state.token_id, state.block_number).await),
        }
    }

    async fn get_record(&self, wallet: &str) -> TrustResult<Option<SbtRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sbt.records WHERE wallet_address = $1",
            RECORD_COLUMNS
        ))
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to get record"))?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn touch_synced(
        &self,
        wallet: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> TrustResult<()> {
        sqlx::query(
            r#"
            UPDATE sbt.records SET last_synced_at = GREATEST(last_synced_at, $3)
            WHERE wallet_address = $1 AND block_number = $2
            "#,
        )
        .bind(wallet)
        .bind(block_number as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to stamp sync time"))?;

        Ok(())
    }

    async fn top_by_trust(&self, limit: usize) -> TrustResult<Vec<SbtRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sbt.records ORDER BY trust_score DESC, wallet_address ASC LIMIT $1",
            RECORD_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to get leaderboard"))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn all_records(&self) -> TrustResult<Vec<SbtRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sbt.records ORDER BY trust_score DESC, wallet_address ASC",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list records"))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn stats(&self) -> TrustResult<SbtStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sbt.records) AS total,
                (SELECT COALESCE(AVG(trust_score), 0)::DOUBLE PRECISION FROM sbt.records) AS avg_trust,
                (SELECT COUNT(*) FROM sbt.records WHERE verification_level = 3) AS premium,
                (SELECT COUNT(*) FROM sbt.mint_events) AS mints,
                (SELECT COUNT(*) FROM sbt.update_events) AS updates
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to get stats"))?;

        let avg: f64 = row.get("avg_trust");
        Ok(SbtStats {
            total_minted: row.get::<i64, _>("total") as u64,
            avg_trust_score: (avg * 10.0).round() / 10.0,
            premium_holders: row.get::<i64, _>("premium") as u64,
            total_mint_events: row.get::<i64, _>("mints") as u64,
            total_update_events: row.get::<i64, _>("updates") as u64,
        })
    }

    async fn mint_events_for(&self, wallet: &str) -> TrustResult<Vec<SbtMintEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT tx_hash, wallet_address, token_id, block_number, minted_at
            FROM sbt.mint_events
            WHERE wallet_address = $1
            ORDER BY block_number ASC
            "#,
        )
        .bind(wallet)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to get mint events"))?;

        Ok(rows
            .iter()
            .map(|row| SbtMintEvent {
                tx_hash: row.get("tx_hash"),
                wallet_address: row.get("wallet_address"),
                token_id: row.get::<i64, _>("token_id") as u64,
                block_number: row.get::<i64, _>("block_number") as u64,
                minted_at: row.get("minted_at"),
            })
            .collect())
    }
}
