use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use trust_oracle::{
    api::{AppState, create_router},
    chain::{ChainClient, ChainReader, SignatureVerifier},
    clock::{SystemTimeSource, TimeSource},
    config::OracleConfig,
    database::{
        DatabasePool, GovernanceRepository, MemoryGovernanceRepository, MemorySbtRepository,
        MemorySessionRepository, SbtRepository, SessionRepository,
    },
    governance::GovernanceEngine,
    identity::{CivicGatewayClient, IdentityProvider, IdentitySessionManager},
    reputation::ReputationScorer,
    sbt::ChainMirror,
};

/// The three repositories, whichever backend holds them.
struct Stores {
    sbt: Arc<dyn SbtRepository>,
    governance: Arc<dyn GovernanceRepository>,
    sessions: Arc<dyn SessionRepository>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = OracleConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check the TRUST_ORACLE_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting trust oracle");

    let stores = init_stores(&config).await?;
    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);

    let chain_client = Arc::new(
        ChainClient::new(config.chain_client()).context("Failed to create chain client")?,
    );
    let chain: Arc<dyn ChainReader> = chain_client.clone();
    let verifier: Arc<dyn SignatureVerifier> = chain_client;
    info!(rpc_url = %config.chain.rpc_url, retry_attempts = config.chain.retry_attempts, "Chain gateway configured");

    let provider: Arc<dyn IdentityProvider> = Arc::new(
        CivicGatewayClient::new(config.civic_gateway())
            .context("Failed to create identity provider client")?,
    );

    let state = AppState {
        mirror: Arc::new(ChainMirror::new(
            stores.sbt.clone(),
            chain,
            clock.clone(),
            config.mirror(),
        )),
        governance: Arc::new(GovernanceEngine::new(
            stores.governance.clone(),
            verifier,
            clock.clone(),
            config.governance(),
        )),
        scorer: Arc::new(ReputationScorer::new(
            stores.sbt.clone(),
            stores.governance.clone(),
            stores.sessions.clone(),
            clock.clone(),
        )),
        sessions: Arc::new(IdentitySessionManager::new(
            stores.sessions,
            provider,
            clock,
            config.sessions(),
        )),
    };

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Trust oracle listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Trust oracle stopped");
    Ok(())
}

async fn init_stores(config: &OracleConfig) -> Result<Stores> {
    if !config.database.postgres_enabled {
        warn!("PostgreSQL disabled, using in-memory stores (state is lost on restart)");
        return Ok(Stores {
            sbt: Arc::new(MemorySbtRepository::new()),
            governance: Arc::new(MemoryGovernanceRepository::new()),
            sessions: Arc::new(MemorySessionRepository::new()),
        });
    }

    let db = DatabasePool::new(&config.database.postgres_url, config.database.max_connections)
        .await?;
    db.init_schema().await?;

    Ok(Stores {
        sbt: db.sbt(),
        governance: db.governance(),
        sessions: db.sessions(),
    })
}

/// Initialize logging
fn init_logging(config: &OracleConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
