//! ChainMirror - applies chain events and reads to the SBT cache

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::models::{
    LeaderboardEntry, SbtExportRecord, SbtMintEvent, SbtRecord, SbtStats, SbtStatus,
    SbtUpdateEvent,
};
use crate::chain::{ChainReader, RetryPolicy, parse_address};
use crate::clock::TimeSource;
use crate::database::SbtRepository;
use crate::error::{TrustError, TrustResult};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 20;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Applied to chain reads only
    pub retry: RetryPolicy,
    /// Cached profiles older than this are refreshed in the background
    pub staleness: chrono::Duration,
    /// Pull full chain state right after a mint event lands
    pub refresh_on_mint: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            staleness: chrono::Duration::seconds(300),
            refresh_on_mint: true,
        }
    }
}

#[derive(Clone)]
pub struct ChainMirror {
    repo: Arc<dyn SbtRepository>,
    chain: Arc<dyn ChainReader>,
    clock: Arc<dyn TimeSource>,
    config: MirrorConfig,
    /// Wallets with a background refresh in flight
    refreshing: Arc<Mutex<HashSet<String>>>,
}

impl ChainMirror {
    pub fn new(
        repo: Arc<dyn SbtRepository>,
        chain: Arc<dyn ChainReader>,
        clock: Arc<dyn TimeSource>,
        config: MirrorConfig,
    ) -> Self {
        Self {
            repo,
            chain,
            clock,
            config,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Apply an `SBTMinted` event. Replays fail with `DuplicateEvent`.
    pub async fn ingest_mint_event(&self, mut event: SbtMintEvent) -> TrustResult<SbtRecord> {
        event.wallet_address = parse_address(&event.wallet_address)?;
        require_tx_hash(&event.tx_hash)?;

        let record = self.repo.apply_mint(&event, self.clock.now()).await?;
        info!(
            wallet = %event.wallet_address,
            token_id = event.token_id,
            tx_hash = %event.tx_hash,
            block = event.block_number,
            "SBT mint applied"
        );

        if !self.config.refresh_on_mint {
            return Ok(record);
        }

        // The event is already recorded; a failed refresh only delays scores.
        match self.sync_from_chain(&event.wallet_address).await {
            Ok(synced) => Ok(synced),
            Err(e) if e.is_already_applied() => Ok(record),
            Err(e) => {
                warn!(
                    wallet = %event.wallet_address,
                    error = %e,
                    "Post-mint chain refresh failed"
                );
                Ok(record)
            }
        }
    }

    /// Apply a `MetadataUpdated` event.
    pub async fn ingest_update_event(&self, event: SbtUpdateEvent) -> TrustResult<SbtRecord> {
        require_tx_hash(&event.tx_hash)?;

        let record = self.repo.apply_update(&event).await?;
        info!(
            wallet = %record.wallet_address,
            token_id = event.token_id,
            tx_hash = %event.tx_hash,
            block = event.block_number,
            "SBT metadata update applied"
        );
        Ok(record)
    }

    /// Overwrite the cached record with authoritative chain state.
    ///
    /// Transient read failures are retried per the mirror's policy. The read
    /// is applied whole or not at all.
    pub async fn sync_from_chain(&self, wallet: &str) -> TrustResult<SbtRecord> {
        let wallet = parse_address(wallet)?;
        let chain = &self.chain;
        let key = wallet.as_str();

        let state = self
            .config
            .retry
            .run("read_sbt_state", key, move || chain.read_sbt_state(key))
            .await?
            .ok_or_else(|| TrustError::not_found("sbt_record", wallet.clone()))?;

        let now = self.clock.now();
        let record = match self.repo.apply_sync(&wallet, &state, now).await {
            Ok(record) => record,
            Err(TrustError::StaleWrite {
                key,
                incoming,
                applied,
            }) => {
                // Chain has not moved: the cache is current as of now
                if incoming == applied {
                    self.repo.touch_synced(&wallet, applied, now).await?;
                    debug!(wallet = %wallet, block = applied, "SBT cache already at chain head");
                }
                return Err(TrustError::StaleWrite {
                    key,
                    incoming,
                    applied,
                });
            }
            Err(e) => return Err(e),
        };
        info!(
            wallet = %wallet,
            trust_score = record.trust_score,
            block = record.block_number,
            "SBT synced from chain"
        );
        Ok(record)
    }

    /// Cache-only check; absence is `false`, not an error.
    pub async fn has_sbt(&self, wallet: &str) -> TrustResult<bool> {
        let wallet = parse_address(wallet)?;
        Ok(self.repo.get_record(&wallet).await?.is_some())
    }

    pub async fn get_sbt_profile(&self, wallet: &str) -> TrustResult<SbtRecord> {
        let wallet = parse_address(wallet)?;
        self.repo
            .get_record(&wallet)
            .await?
            .ok_or_else(|| TrustError::not_found("sbt_record", wallet))
    }

    /// Read-through profile lookup.
    ///
    /// A miss syncs from chain before answering. A hit older than the
    /// staleness window is returned as-is while a refresh runs in the
    /// background. At most one refresh per wallet is in flight.
    pub async fn profile_or_sync(&self, wallet: &str) -> TrustResult<SbtRecord> {
        let wallet = parse_address(wallet)?;

        let Some(record) = self.repo.get_record(&wallet).await? else {
            debug!(wallet = %wallet, "Profile cache miss, syncing from chain");
            return self.sync_from_chain(&wallet).await;
        };

        if self.clock.now() - record.last_synced_at > self.config.staleness
            && self.refreshing.lock().await.insert(wallet.clone())
        {
            let mirror = self.clone();
            let stale_wallet = wallet.clone();
            tokio::spawn(async move {
                match mirror.sync_from_chain(&stale_wallet).await {
                    Ok(_) => {}
                    Err(e) if e.is_already_applied() => {}
                    Err(e) => warn!(wallet = %stale_wallet, error = %e, "Background SBT refresh failed"),
                }
                mirror.refreshing.lock().await.remove(&stale_wallet);
            });
        }

        Ok(record)
    }

    /// On-chain holder and verifier status next to the cache flag.
    pub async fn check_sbt_status(&self, wallet: &str) -> TrustResult<SbtStatus> {
        let wallet = parse_address(wallet)?;
        let chain = &self.chain;
        let key = wallet.as_str();

        let has_sbt = self
            .config
            .retry
            .run("has_sbt", key, move || chain.has_sbt(key))
            .await?;
        let is_verified = self
            .config
            .retry
            .run("is_verified", key, move || chain.is_verified(key))
            .await?;
        let cached = self.repo.get_record(&wallet).await?.is_some();

        Ok(SbtStatus {
            address: wallet,
            has_sbt,
            is_verified,
            cached,
        })
    }

    /// Top holders by trust score. Limits outside `1..=100` fall back to 20.
    pub async fn leaderboard(&self, limit: i64) -> TrustResult<Vec<LeaderboardEntry>> {
        let limit = match usize::try_from(limit) {
            Ok(n) if (1..=MAX_LEADERBOARD_LIMIT).contains(&n) => n,
            _ => DEFAULT_LEADERBOARD_LIMIT,
        };

        let records = self.repo.top_by_trust(limit).await?;
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, r)| LeaderboardEntry {
                rank: i + 1,
                wallet_address: r.wallet_address,
                trust_score: r.trust_score,
                verification_level: r.verification_level,
                voting_accuracy: r.voting_accuracy,
                doi_participation: r.doi_participation,
            })
            .collect())
    }

    pub async fn stats(&self) -> TrustResult<SbtStats> {
        self.repo.stats().await
    }

    pub async fn export(&self) -> TrustResult<Vec<SbtExportRecord>> {
        let records = self.repo.all_records().await?;
        Ok(records.iter().map(SbtExportRecord::from).collect())
    }

    pub async fn mint_history(&self, wallet: &str) -> TrustResult<Vec<SbtMintEvent>> {
        let wallet = parse_address(wallet)?;
        self.repo.mint_events_for(&wallet).await
    }
}

fn require_tx_hash(tx_hash: &str) -> TrustResult<()> {
    if tx_hash.trim().is_empty() {
        return Err(TrustError::invalid_input("tx_hash", "transaction hash is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::OnChainSbtState;
    use crate::clock::ManualTimeSource;
    use crate::database::MemorySbtRepository;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    /// Chain stub: serves a fixed state and fails the first `failures` reads.
    struct StubChain {
        state: Mutex<Option<OnChainSbtState>>,
        failures: AtomicU32,
        reads: AtomicU32,
    }

    impl StubChain {
        fn new(state: Option<OnChainSbtState>, failures: u32) -> Self {
            Self {
                state: Mutex::new(state),
                failures: AtomicU32::new(failures),
                reads: AtomicU32::new(0),
            }
        }

        fn set(&self, state: OnChainSbtState) {
            *self.state.lock().unwrap() = Some(state);
        }
    }

    #[async_trait]
    impl ChainReader for StubChain {
        async fn read_sbt_state(&self, address: &str) -> TrustResult<Option<OnChainSbtState>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TrustError::chain_unavailable(address, "connection reset"));
            }
            Ok(self.state.lock().unwrap().clone())
        }

        async fn has_sbt(&self, _address: &str) -> TrustResult<bool> {
            Ok(self.state.lock().unwrap().is_some())
        }

        async fn is_verified(&self, _address: &str) -> TrustResult<bool> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|s| s.verification_level > 0))
        }
    }

    fn state(trust: u32, block: u64) -> OnChainSbtState {
        OnChainSbtState {
            token_id: 1,
            verification_level: 1,
            trust_score: trust,
            voting_accuracy: 100,
            doi_participation: 50,
            minted_at: Utc::now(),
            block_number: block,
        }
    }

    fn mirror_with(chain: Arc<StubChain>, refresh_on_mint: bool) -> (ChainMirror, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(Utc::now()));
        let mirror = ChainMirror::new(
            Arc::new(MemorySbtRepository::new()),
            chain,
            clock.clone(),
            MirrorConfig {
                retry: RetryPolicy {
                    attempts: 3,
                    delay: std::time::Duration::ZERO,
                },
                staleness: Duration::seconds(300),
                refresh_on_mint,
            },
        );
        (mirror, clock)
    }

    fn mint(tx: &str, block: u64) -> SbtMintEvent {
        SbtMintEvent {
            tx_hash: tx.to_string(),
            wallet_address: WALLET.to_uppercase().replace("0X", "0x"),
            token_id: 1,
            block_number: block,
            minted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mint_normalizes_wallet_and_rejects_replay() {
        let (mirror, _) = mirror_with(Arc::new(StubChain::new(None, 0)), false);

        let record = mirror.ingest_mint_event(mint("0xa", 100)).await.unwrap();
        assert_eq!(record.wallet_address, WALLET);
        assert_eq!(record.trust_score, 0);

        let err = mirror.ingest_mint_event(mint("0xa", 100)).await.unwrap_err();
        assert_eq!(err.code(), "duplicate_event");
        assert!(mirror.has_sbt(WALLET).await.unwrap());
    }

    #[tokio::test]
    async fn test_mint_refreshes_scores_from_chain() {
        let chain = Arc::new(StubChain::new(Some(state(85, 101)), 0));
        let (mirror, _) = mirror_with(chain, true);

        let record = mirror.ingest_mint_event(mint("0xa", 100)).await.unwrap();
        assert_eq!(record.trust_score, 85);
        assert_eq!(record.block_number, 101);
    }

    #[tokio::test]
    async fn test_stale_update_leaves_record_untouched() {
        let (mirror, _) = mirror_with(Arc::new(StubChain::new(None, 0)), false);
        mirror.ingest_mint_event(mint("0xa", 100)).await.unwrap();

        let err = mirror
            .ingest_update_event(SbtUpdateEvent {
                tx_hash: "0xb".to_string(),
                token_id: 1,
                new_uri: "ipfs://old".to_string(),
                block_number: 90,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::StaleWrite { applied: 100, .. }));

        let record = mirror.get_sbt_profile(WALLET).await.unwrap();
        assert_eq!(record.block_number, 100);
        assert!(record.metadata_uri.is_none());
    }

    #[tokio::test]
    async fn test_sync_retries_transient_failures() {
        let chain = Arc::new(StubChain::new(Some(state(70, 10)), 2));
        let (mirror, _) = mirror_with(chain.clone(), false);

        let record = mirror.sync_from_chain(WALLET).await.unwrap();
        assert_eq!(record.trust_score, 70);
        assert_eq!(chain.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sync_gives_up_after_bounded_attempts() {
        let chain = Arc::new(StubChain::new(Some(state(70, 10)), 5));
        let (mirror, _) = mirror_with(chain.clone(), false);

        let err = mirror.sync_from_chain(WALLET).await.unwrap_err();
        assert_eq!(err.code(), "chain_unavailable");
        assert_eq!(chain.reads.load(Ordering::SeqCst), 3);
        assert!(!mirror.has_sbt(WALLET).await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_without_token_is_not_found() {
        let (mirror, _) = mirror_with(Arc::new(StubChain::new(None, 0)), false);
        let err = mirror.sync_from_chain(WALLET).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_profile_read_through_and_background_refresh() {
        let chain = Arc::new(StubChain::new(Some(state(60, 10)), 0));
        let (mirror, clock) = mirror_with(chain.clone(), false);

        let first = mirror.profile_or_sync(WALLET).await.unwrap();
        assert_eq!(first.trust_score, 60);

        chain.set(state(75, 11));
        clock.advance(Duration::seconds(301));

        // Stale copy is served immediately
        let served = mirror.profile_or_sync(WALLET).await.unwrap();
        assert_eq!(served.trust_score, 60);

        let mut refreshed = served;
        for _ in 0..50 {
            refreshed = mirror.get_sbt_profile(WALLET).await.unwrap();
            if refreshed.trust_score == 75 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(refreshed.trust_score, 75);
    }

    #[tokio::test]
    async fn test_unchanged_chain_refreshes_sync_stamp_once() {
        let chain = Arc::new(StubChain::new(Some(state(60, 10)), 0));
        let (mirror, clock) = mirror_with(chain.clone(), false);

        let synced = mirror.sync_from_chain(WALLET).await.unwrap();
        clock.advance(Duration::seconds(301));

        for _ in 0..10 {
            mirror.profile_or_sync(WALLET).await.unwrap();
        }

        let mut record = synced.clone();
        for _ in 0..50 {
            record = mirror.get_sbt_profile(WALLET).await.unwrap();
            if record.last_synced_at > synced.last_synced_at {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(record.last_synced_at, clock.now());
        assert_eq!(record.block_number, 10);

        // Fresh again: no further chain reads
        for _ in 0..50 {
            if mirror.refreshing.lock().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        mirror.profile_or_sync(WALLET).await.unwrap();
        assert_eq!(chain.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_equal_block_sync_is_stale_but_stamps_freshness() {
        let chain = Arc::new(StubChain::new(Some(state(60, 10)), 0));
        let (mirror, clock) = mirror_with(chain, false);
        mirror.sync_from_chain(WALLET).await.unwrap();

        clock.advance(Duration::seconds(30));
        let err = mirror.sync_from_chain(WALLET).await.unwrap_err();
        assert!(matches!(err, TrustError::StaleWrite { incoming: 10, applied: 10, .. }));

        let record = mirror.get_sbt_profile(WALLET).await.unwrap();
        assert_eq!(record.last_synced_at, clock.now());
    }

    #[tokio::test]
    async fn test_leaderboard_limit_bounds() {
        let chain = Arc::new(StubChain::new(Some(state(60, 10)), 0));
        let (mirror, _) = mirror_with(chain, false);
        mirror.sync_from_chain(WALLET).await.unwrap();

        for limit in [0, -3, 101] {
            let board = mirror.leaderboard(limit).await.unwrap();
            assert_eq!(board.len(), 1);
            assert_eq!(board[0].rank, 1);
        }
    }

    #[tokio::test]
    async fn test_check_status_reports_cache_flag() {
        let chain = Arc::new(StubChain::new(Some(state(60, 10)), 0));
        let (mirror, _) = mirror_with(chain, false);

        let status = mirror.check_sbt_status(WALLET).await.unwrap();
        assert!(status.has_sbt && status.is_verified);
        assert!(!status.cached);
    }
}
