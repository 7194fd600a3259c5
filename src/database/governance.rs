//! Governance Repository - PostgreSQL persistence for proposals, votes and
//! confirmed scams

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use tracing::{debug, info, warn};

use super::GovernanceRepository;
use super::pool::{is_unique_violation, storage, violated_constraint};
use crate::error::{TrustError, TrustResult};
use crate::governance::{ConfirmedScam, DaoProposal, DaoVote, NewProposal, ProposalStatus};

const PROPOSAL_COLUMNS: &str = "id, title, description, creator_address, suspicious_address, \
     created_at, end_time, status, votes_for, votes_against";

const SCAM_COLUMNS: &str = "address, scam_score, proposal_id, confirmed_at, total_voters, \
     description, tx_hash, block_number";

pub struct PgGovernanceRepository {
    pool: PgPool,
}

impl PgGovernanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize governance tables
    pub async fn init_schema(&self) -> TrustResult<()> {
        info!("Initializing dao schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dao.proposals (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                creator_address VARCHAR(42) NOT NULL,
                suspicious_address VARCHAR(42) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                end_time TIMESTAMP WITH TIME ZONE NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'active',
                votes_for DOUBLE PRECISION NOT NULL DEFAULT 0,
                votes_against DOUBLE PRECISION NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create dao.proposals"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dao.votes (
                proposal_id BIGINT NOT NULL REFERENCES dao.proposals(id),
                voter_address VARCHAR(42) NOT NULL,
                vote_type VARCHAR(8) NOT NULL,
                vote_power DOUBLE PRECISION NOT NULL,
                voted_at TIMESTAMP WITH TIME ZONE NOT NULL,
                PRIMARY KEY (proposal_id, voter_address)
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create dao.votes"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dao.confirmed_scams (
                address VARCHAR(42) NOT NULL,
                scam_score SMALLINT NOT NULL,
                proposal_id BIGINT NOT NULL REFERENCES dao.proposals(id),
                confirmed_at TIMESTAMP WITH TIME ZONE NOT NULL,
                total_voters INTEGER NOT NULL,
                description TEXT NOT NULL,
                tx_hash VARCHAR(66) NOT NULL,
                block_number BIGINT NOT NULL,
                CONSTRAINT uq_confirmed_scam_address UNIQUE (address),
                CONSTRAINT uq_confirmed_scam_proposal UNIQUE (proposal_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create dao.confirmed_scams"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_proposals_target ON dao.proposals(suspicious_address, status)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to create proposal index"))?;

        info!("DAO schema initialized");
        Ok(())
    }
}

fn proposal_from_row(row: &PgRow) -> TrustResult<DaoProposal> {
    let status: String = row.get("status");
    Ok(DaoProposal {
        id: row.get::<i64, _>("id") as u64,
        title: row.get("title"),
        description: row.get("description"),
        creator_address: row.get("creator_address"),
        suspicious_address: row.get("suspicious_address"),
        created_at: row.get("created_at"),
        end_time: row.get("end_time"),
        status: status.parse()?,
        votes_for: row.get("votes_for"),
        votes_against: row.get("votes_against"),
    })
}

fn vote_from_row(row: &PgRow) -> TrustResult<DaoVote> {
    let vote_type: String = row.get("vote_type");
    Ok(DaoVote {
        proposal_id: row.get::<i64, _>("proposal_id") as u64,
        voter_address: row.get("voter_address"),
        vote_type: vote_type.parse()?,
        vote_power: row.get("vote_power"),
        voted_at: row.get("voted_at"),
    })
}

fn scam_from_row(row: &PgRow) -> ConfirmedScam {
    ConfirmedScam {
        address: row.get("address"),
        scam_score: row.get::<i16, _>("scam_score") as u8,
        proposal_id: row.get::<i64, _>("proposal_id") as u64,
        confirmed_at: row.get("confirmed_at"),
        total_voters: row.get::<i32, _>("total_voters") as u32,
        description: row.get("description"),
        tx_hash: row.get("tx_hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
    }
}

#[async_trait]
impl GovernanceRepository for PgGovernanceRepository {
    async fn create_proposal(&self, proposal: NewProposal) -> TrustResult<DaoProposal> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO dao.proposals
                (title, description, creator_address, suspicious_address, created_at, end_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PROPOSAL_COLUMNS
        ))
        .bind(&proposal.title)
        .bind(&proposal.description)
        .bind(&proposal.creator_address)
        .bind(&proposal.suspicious_address)
        .bind(proposal.created_at)
        .bind(proposal.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to create proposal"))?;

        proposal_from_row(&row)
    }

    async fn get_proposal(&self, id: u64) -> TrustResult<Option<DaoProposal>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM dao.proposals WHERE id = $1",
            PROPOSAL_COLUMNS
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to get proposal"))?;

        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
    ) -> TrustResult<Vec<DaoProposal>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM dao.proposals
            WHERE $1::VARCHAR IS NULL OR status = $1
            ORDER BY id DESC
            "#,
            PROPOSAL_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list proposals"))?;

        rows.iter().map(proposal_from_row).collect()
    }

    async fn active_proposals_for(&self, address: &str) -> TrustResult<Vec<DaoProposal>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM dao.proposals
            WHERE suspicious_address = $1 AND status = 'active'
            ORDER BY id DESC
            "#,
            PROPOSAL_COLUMNS
        ))
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to get active proposals"))?;

        rows.iter().map(proposal_from_row).collect()
    }

    async fn record_vote(&self, vote: &DaoVote) -> TrustResult<DaoProposal> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        // The row lock taken by this UPDATE serializes ballots per proposal
        // and keeps them out of a concurrent finalize.
        let row = sqlx::query(&format!(
            r#"
            UPDATE dao.proposals SET
                votes_for = votes_for
                    + CASE WHEN $2::VARCHAR = 'for' THEN $3::DOUBLE PRECISION ELSE 0 END,
                votes_against = votes_against
                    + CASE WHEN $2::VARCHAR = 'against' THEN $3::DOUBLE PRECISION ELSE 0 END
            WHERE id = $1 AND status = 'active' AND end_time > $4
            RETURNING {}
            "#,
            PROPOSAL_COLUMNS
        ))
        .bind(vote.proposal_id as i64)
        .bind(vote.vote_type.as_str())
        .bind(vote.vote_power)
        .bind(vote.voted_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to update tally"))?;

        let Some(row) = row else {
            let exists = sqlx::query("SELECT 1 FROM dao.proposals WHERE id = $1")
                .bind(vote.proposal_id as i64)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage("Failed to get proposal"))?;
            return Err(match exists {
                Some(_) => TrustError::VotingClosed {
                    proposal_id: vote.proposal_id,
                },
                None => TrustError::not_found("proposal", vote.proposal_id.to_string()),
            });
        };
        let proposal = proposal_from_row(&row)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO dao.votes (proposal_id, voter_address, vote_type, vote_power, voted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (proposal_id, voter_address) DO NOTHING
            "#,
        )
        .bind(vote.proposal_id as i64)
        .bind(&vote.voter_address)
        .bind(vote.vote_type.as_str())
        .bind(vote.vote_power)
        .bind(vote.voted_at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to insert vote"))?;

        if inserted.rows_affected() == 0 {
            // Dropping the transaction rolls the tally back.
            return Err(TrustError::AlreadyVoted {
                proposal_id: vote.proposal_id,
                voter: vote.voter_address.clone(),
            });
        }

        tx.commit()
            .await
            .map_err(storage("Failed to commit vote"))?;

        debug!(
            proposal_id = vote.proposal_id,
            voter = %vote.voter_address,
            vote_type = vote.vote_type.as_str(),
            "Vote recorded"
        );
        Ok(proposal)
    }

    async fn list_votes(&self, proposal_id: u64) -> TrustResult<Vec<DaoVote>> {
        let rows = sqlx::query(
            r#"
            SELECT proposal_id, voter_address, vote_type, vote_power, voted_at
            FROM dao.votes
            WHERE proposal_id = $1
            ORDER BY voted_at ASC
            "#,
        )
        .bind(proposal_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list votes"))?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn finalize(&self, proposal_id: u64, now: DateTime<Utc>) -> TrustResult<DaoProposal> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM dao.proposals WHERE id = $1 FOR UPDATE",
            PROPOSAL_COLUMNS
        ))
        .bind(proposal_id as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to lock proposal"))?
        .ok_or_else(|| TrustError::not_found("proposal", proposal_id.to_string()))?;

        let mut proposal = proposal_from_row(&row)?;
        let outcome = ProposalStatus::tally(proposal.votes_for, proposal.votes_against);
        if !proposal.status.can_transition_to(outcome) {
            return Ok(proposal);
        }
        if now < proposal.end_time {
            return Err(TrustError::VotingStillOpen { proposal_id });
        }

        proposal.status = outcome;
        sqlx::query("UPDATE dao.proposals SET status = $2 WHERE id = $1")
            .bind(proposal_id as i64)
            .bind(proposal.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to finalize proposal"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit finalize"))?;

        Ok(proposal)
    }

    async fn execute(
        &self,
        proposal_id: u64,
        tx_hash: &str,
        block_number: u64,
        now: DateTime<Utc>,
    ) -> TrustResult<ConfirmedScam> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM dao.proposals WHERE id = $1 FOR UPDATE",
            PROPOSAL_COLUMNS
        ))
        .bind(proposal_id as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to lock proposal"))?
        .ok_or_else(|| TrustError::not_found("proposal", proposal_id.to_string()))?;

        let proposal = proposal_from_row(&row)?;
        proposal.status.check_execute(proposal_id)?;

        let voters: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dao.votes WHERE proposal_id = $1")
            .bind(proposal_id as i64)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage("Failed to count voters"))?;

        let scam = ConfirmedScam::from_proposal(&proposal, voters as u32, tx_hash, block_number, now);

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO dao.confirmed_scams ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SCAM_COLUMNS, SCAM_COLUMNS
        ))
        .bind(&scam.address)
        .bind(scam.scam_score as i16)
        .bind(scam.proposal_id as i64)
        .bind(scam.confirmed_at)
        .bind(scam.total_voters as i32)
        .bind(&scam.description)
        .bind(&scam.tx_hash)
        .bind(scam.block_number as i64)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                let constraint = violated_constraint(&e);
                warn!(
                    proposal_id,
                    address = %scam.address,
                    constraint = ?constraint,
                    "Confirmation rejected by uniqueness constraint"
                );
                return Err(match constraint.as_deref() {
                    Some("uq_confirmed_scam_proposal") => {
                        TrustError::AlreadyExecuted { proposal_id }
                    }
                    _ => TrustError::AlreadyConfirmed {
                        address: scam.address.clone(),
                    },
                });
            }
            Err(e) => return Err(storage("Failed to insert confirmation")(e)),
        };

        sqlx::query("UPDATE dao.proposals SET status = 'executed' WHERE id = $1")
            .bind(proposal_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to mark proposal executed"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit execution"))?;

        info!(proposal_id, address = %scam.address, score = scam.scam_score, "Scam confirmed");
        Ok(scam_from_row(&row))
    }

    async fn confirmed_scam(&self, address: &str) -> TrustResult<Option<ConfirmedScam>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM dao.confirmed_scams WHERE address = $1",
            SCAM_COLUMNS
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to get confirmed scam"))?;

        Ok(row.as_ref().map(scam_from_row))
    }

    async fn list_confirmed(&self) -> TrustResult<Vec<ConfirmedScam>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM dao.confirmed_scams ORDER BY confirmed_at DESC",
            SCAM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list confirmed scams"))?;

        Ok(rows.iter().map(scam_from_row).collect())
    }
}
