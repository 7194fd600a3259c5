//! Chain Integration
//!
//! Ports for the authoritative on-chain ledger plus the HTTP gateway adapter
//! that implements them.
//!
//! ```text
//! ┌──────────────────┐   ChainReader    ┌──────────────────┐
//! │ ChainMirror      │◄────────────────│ ChainClient      │──► chain gateway
//! └──────────────────┘                  │ (reqwest)        │
//! ┌──────────────────┐ SignatureVerifier│                  │
//! │ GovernanceEngine │◄────────────────│                  │
//! └──────────────────┘                  └──────────────────┘
//! ```

pub mod client;
pub mod types;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::TrustResult;

pub use client::{ChainClient, ChainClientConfig};
pub use types::{OnChainSbtState, normalize_address, parse_address};

/// Read side of the SBT and verifier contracts.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Full authoritative SBT state, `None` when the wallet holds no token.
    async fn read_sbt_state(&self, address: &str) -> TrustResult<Option<OnChainSbtState>>;

    async fn has_sbt(&self, address: &str) -> TrustResult<bool>;

    async fn is_verified(&self, address: &str) -> TrustResult<bool>;
}

/// Wallet signature check, delegated to whoever owns the signature scheme.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify_signature(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> TrustResult<bool>;
}

/// Fixed-delay retry for transient chain failures. Semantic rejections are
/// returned on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub async fn run<T, F, Fut>(&self, op: &str, key: &str, mut call: F) -> TrustResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TrustResult<T>>,
    {
        let max_attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        op = op,
                        key = key,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Transient chain failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrustError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_stops_after_bounded_attempts() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: TrustResult<()> = policy
            .run("read", "0x1", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TrustError::chain_unavailable("0x1", "timeout"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_never_repeats_semantic_errors() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: TrustResult<()> = policy
            .run("read", "0x1", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TrustError::not_found("sbt_record", "0x1"))
            })
            .await;

        assert_eq!(result.unwrap_err().code(), "not_found");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = policy
            .run("read", "0x1", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TrustError::chain_unavailable("0x1", "reset"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
