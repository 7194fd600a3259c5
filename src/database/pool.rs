//! Database Connection Pool using sqlx

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

use crate::database::governance::PgGovernanceRepository;
use crate::database::identity::PgSessionRepository;
use crate::database::sbt::PgSbtRepository;
use crate::error::TrustError;

pub struct DatabasePool {
    pool: PgPool,
    sbt: Arc<PgSbtRepository>,
    governance: Arc<PgGovernanceRepository>,
    sessions: Arc<PgSessionRepository>,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            sbt: Arc::new(PgSbtRepository::new(pool.clone())),
            governance: Arc::new(PgGovernanceRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            pool,
        })
    }

    pub async fn init_schema(&self) -> anyhow::Result<()> {
        info!("Initializing database schema...");

        for schema in ["sbt", "dao", "civic"] {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {} schema", schema))?;
        }

        self.sbt.init_schema().await?;
        self.governance.init_schema().await?;
        self.sessions.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn sbt(&self) -> Arc<PgSbtRepository> {
        self.sbt.clone()
    }

    pub fn governance(&self) -> Arc<PgGovernanceRepository> {
        self.governance.clone()
    }

    pub fn sessions(&self) -> Arc<PgSessionRepository> {
        self.sessions.clone()
    }
}

/// `map_err` adapter: driver failure with the operation that hit it.
pub(crate) fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> TrustError {
    move |e| TrustError::Storage(format!("{}: {}", context, e))
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Name of the constraint a database error tripped, if any.
pub(crate) fn violated_constraint(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.constraint().map(str::to_string),
        _ => None,
    }
}
