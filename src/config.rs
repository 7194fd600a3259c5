use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::chain::{ChainClientConfig, RetryPolicy};
use crate::governance::GovernanceConfig;
use crate::identity::{CivicGatewayConfig, SessionConfig};
use crate::sbt::MirrorConfig;

const ENV_PREFIX: &str = "TRUST_ORACLE_";

/// Configuration for the trust oracle service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Chain gateway configuration
    pub chain: ChainConfig,
    /// Identity provider configuration
    pub civic: CivicConfig,
    /// Governance and session timing
    pub policy: PolicyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Total tries for a chain read, first one included
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivicConfig {
    pub gateway_url: String,
    pub api_key: String,
    pub gatekeeper_network: String,
    pub chain_id: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub voting_period_hours: i64,
    pub session_ttl_hours: i64,
    pub challenge_ttl_minutes: i64,
    /// Cached profiles older than this are refreshed in the background
    pub profile_staleness_secs: i64,
    pub refresh_on_mint: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
    /// Enable request/response logging
    pub log_requests: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/trust_oracle".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        let chain = ChainClientConfig::default();
        let civic = CivicGatewayConfig::default();
        let retry = RetryPolicy::default();
        let session = SessionConfig::default();

        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            chain: ChainConfig {
                rpc_url: chain.rpc_url,
                api_key: chain.api_key,
                timeout_secs: chain.timeout_secs,
                retry_attempts: retry.attempts,
                retry_delay_ms: retry.delay.as_millis() as u64,
            },
            civic: CivicConfig {
                gateway_url: civic.base_url,
                api_key: civic.api_key,
                gatekeeper_network: session.gatekeeper_network,
                chain_id: civic.chain_id,
                timeout_secs: civic.timeout_secs,
            },
            policy: PolicyConfig {
                voting_period_hours: GovernanceConfig::default().voting_period.num_hours(),
                session_ttl_hours: session.session_ttl.num_hours(),
                challenge_ttl_minutes: session.challenge_ttl.num_minutes(),
                profile_staleness_secs: 300,
                refresh_on_mint: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
            },
        }
    }
}

/// Overwrite `target` with `TRUST_ORACLE_{name}` when it is set.
fn read_var<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    if let Ok(raw) = env::var(&key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", key))?;
    }
    Ok(())
}

impl OracleConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        read_var("HOST", &mut config.server.host)?;
        read_var("PORT", &mut config.server.port)?;

        // Database configuration
        read_var("POSTGRES_URL", &mut config.database.postgres_url)?;
        read_var("POSTGRES_ENABLED", &mut config.database.postgres_enabled)?;
        read_var("POSTGRES_MAX_CONNECTIONS", &mut config.database.max_connections)?;

        // Chain gateway
        read_var("CHAIN_RPC_URL", &mut config.chain.rpc_url)?;
        read_var("CHAIN_API_KEY", &mut config.chain.api_key)?;
        read_var("CHAIN_TIMEOUT_SECS", &mut config.chain.timeout_secs)?;
        read_var("CHAIN_RETRY_ATTEMPTS", &mut config.chain.retry_attempts)?;
        read_var("CHAIN_RETRY_DELAY_MS", &mut config.chain.retry_delay_ms)?;

        // Identity provider
        read_var("CIVIC_GATEWAY_URL", &mut config.civic.gateway_url)?;
        read_var("CIVIC_API_KEY", &mut config.civic.api_key)?;
        read_var("CIVIC_GATEKEEPER_NETWORK", &mut config.civic.gatekeeper_network)?;
        read_var("CIVIC_CHAIN_ID", &mut config.civic.chain_id)?;
        read_var("CIVIC_TIMEOUT_SECS", &mut config.civic.timeout_secs)?;

        // Timing policy
        read_var("VOTING_PERIOD_HOURS", &mut config.policy.voting_period_hours)?;
        read_var("SESSION_TTL_HOURS", &mut config.policy.session_ttl_hours)?;
        read_var("CHALLENGE_TTL_MINUTES", &mut config.policy.challenge_ttl_minutes)?;
        read_var("PROFILE_STALENESS_SECS", &mut config.policy.profile_staleness_secs)?;
        read_var("REFRESH_ON_MINT", &mut config.policy.refresh_on_mint)?;

        // Logging configuration
        read_var("LOG_LEVEL", &mut config.logging.level)?;
        read_var("LOG_REQUESTS", &mut config.logging.log_requests)?;

        if config.civic.api_key.is_empty() {
            warn!("TRUST_ORACLE_CIVIC_API_KEY not set, gateway requests will be unauthenticated");
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!(
                "PostgreSQL is enabled but no connection string is configured"
            ));
        }

        if self.chain.rpc_url.is_empty() {
            return Err(anyhow::anyhow!("Chain RPC URL cannot be empty"));
        }

        if self.chain.retry_attempts == 0 {
            return Err(anyhow::anyhow!("Chain retry attempts must be at least 1"));
        }

        if self.civic.gateway_url.is_empty() {
            return Err(anyhow::anyhow!("Civic gateway URL cannot be empty"));
        }

        if self.civic.gatekeeper_network.is_empty() {
            return Err(anyhow::anyhow!("Gatekeeper network cannot be empty"));
        }

        if self.policy.voting_period_hours <= 0 {
            return Err(anyhow::anyhow!("Voting period must be positive"));
        }

        if self.policy.session_ttl_hours <= 0 || self.policy.challenge_ttl_minutes <= 0 {
            return Err(anyhow::anyhow!("Session and challenge lifetimes must be positive"));
        }

        if self.policy.profile_staleness_secs < 0 {
            return Err(anyhow::anyhow!("Profile staleness cannot be negative"));
        }

        Ok(())
    }

    pub fn chain_client(&self) -> ChainClientConfig {
        ChainClientConfig {
            rpc_url: self.chain.rpc_url.clone(),
            api_key: self.chain.api_key.clone(),
            timeout_secs: self.chain.timeout_secs,
        }
    }

    pub fn civic_gateway(&self) -> CivicGatewayConfig {
        CivicGatewayConfig {
            base_url: self.civic.gateway_url.clone(),
            api_key: self.civic.api_key.clone(),
            chain_id: self.civic.chain_id,
            timeout_secs: self.civic.timeout_secs,
        }
    }

    pub fn mirror(&self) -> MirrorConfig {
        MirrorConfig {
            retry: RetryPolicy {
                attempts: self.chain.retry_attempts,
                delay: Duration::from_millis(self.chain.retry_delay_ms),
            },
            staleness: chrono::Duration::seconds(self.policy.profile_staleness_secs),
            refresh_on_mint: self.policy.refresh_on_mint,
        }
    }

    pub fn governance(&self) -> GovernanceConfig {
        GovernanceConfig {
            voting_period: chrono::Duration::hours(self.policy.voting_period_hours),
        }
    }

    pub fn sessions(&self) -> SessionConfig {
        SessionConfig {
            gatekeeper_network: self.civic.gatekeeper_network.clone(),
            session_ttl: chrono::Duration::hours(self.policy.session_ttl_hours),
            challenge_ttl: chrono::Duration::minutes(self.policy.challenge_ttl_minutes),
        }
    }
}

/// Mask a secret (API key, gatepass) for logging, keeping just enough of
/// both ends to correlate log lines.
pub fn sanitize_for_logging(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let keep = match chars.len() {
        0 => return String::new(),
        1..=8 => 1,
        9..=20 => 2,
        _ => 4,
    };
    if chars.len() <= keep * 2 {
        return "***".to_string();
    }

    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}***{}", head, tail)
}
