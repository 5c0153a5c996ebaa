//! Time-bounded cache of merged histories keyed by `(address, chain_id)`.
//!
//! An entry always holds the full sorted record list of one refresh and is
//! replaced wholesale. Pages are slices of it. Concurrent misses for the same
//! key queue on a per-key lock and re-check the entry once they hold it, so at
//! most one upstream refresh per key is in flight.

use crate::fetch::fetch_all;
use config_manager::SystemConfig;
use explorer_client::TransactionSource;
use history_core::{sort_records, MergeEngine, NativeCurrency, TransactionRecord};
use retry_utils::RetryConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

type CacheKey = (String, u64);

#[derive(Debug)]
pub struct CacheEntry {
    /// Deduplicated, newest first
    pub records: Arc<Vec<TransactionRecord>>,
    pub fetched_at: Instant,
    /// Rows requested per category for this refresh
    pub fetch_window: usize,
    /// Every category came back short of the window: nothing older exists.
    pub exhausted: bool,
    /// At least one category failed during the refresh.
    pub degraded: bool,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn page(&self, offset: usize, limit: usize) -> Vec<TransactionRecord> {
        self.records.iter().skip(offset).take(limit).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub fetch_multiplier: usize,
    pub min_fetch_window: usize,
    pub max_fetch_window: usize,
    /// Rows per explorer request; larger windows are read over several pages
    pub page_size: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            fetch_multiplier: 3,
            min_fetch_window: 100,
            max_fetch_window: 10_000,
            page_size: 10_000,
        }
    }
}

impl From<&SystemConfig> for CachePolicy {
    fn from(config: &SystemConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.cache.ttl_seconds),
            fetch_multiplier: config.cache.fetch_multiplier,
            min_fetch_window: config.cache.min_fetch_window,
            max_fetch_window: config.cache.max_fetch_window,
            page_size: config.explorer.max_page_size as usize,
        }
    }
}

impl CachePolicy {
    /// Rows to request per category so that `offset + limit` merged records
    /// are likely to be available.
    pub fn fetch_window(&self, offset: usize, limit: usize) -> usize {
        offset
            .saturating_add(limit)
            .saturating_mul(self.fetch_multiplier)
            .max(self.min_fetch_window)
            .min(self.max_fetch_window)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        entry.age(now) < self.ttl
    }

    /// Whether `entry` can answer the page without going upstream.
    fn covers(&self, entry: &CacheEntry, offset: usize, limit: usize) -> bool {
        entry.exhausted
            || entry.records.len() >= offset.saturating_add(limit)
            // a refresh with the same window would not find anything new
            || entry.fetch_window >= self.fetch_window(offset, limit)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub entries: usize,
}

pub struct HistoryCache {
    source: Arc<dyn TransactionSource>,
    merge_engine: MergeEngine,
    policy: CachePolicy,
    retry: RetryConfig,
    natives: HashMap<u64, NativeCurrency>,
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
    refresh_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
}

impl HistoryCache {
    pub fn new(
        source: Arc<dyn TransactionSource>,
        merge_engine: MergeEngine,
        policy: CachePolicy,
        retry: RetryConfig,
        natives: HashMap<u64, NativeCurrency>,
    ) -> Self {
        Self {
            source,
            merge_engine,
            policy,
            retry,
            natives,
            entries: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    fn key(address: &str, chain_id: u64) -> CacheKey {
        (address.to_lowercase(), chain_id)
    }

    /// Records `offset..offset + limit` of the newest-first history, or an
    /// empty vector past the end. Never fails: upstream problems show up as
    /// missing rows.
    pub async fn get_page(
        &self,
        address: &str,
        chain_id: u64,
        limit: usize,
        offset: usize,
    ) -> Vec<TransactionRecord> {
        let key = Self::key(address, chain_id);
        let requested_at = Instant::now();

        if let Some(page) = self.lookup(&key, offset, limit, None).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for {} on chain {} (offset {}, limit {})", key.0, chain_id, offset, limit);
            return page;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let lock = self.refresh_lock(&key).await;
        let page = {
            let _guard = lock.lock().await;

            // Someone may have refreshed while we were queued
            match self.lookup(&key, offset, limit, Some(requested_at)).await {
                Some(page) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Served {} on chain {} from a concurrent refresh", key.0, chain_id);
                    page
                }
                None => self.refresh(&key, offset, limit).await.page(offset, limit),
            }
        };
        self.release_refresh_lock(&key, lock).await;

        page
    }

    /// Page from the current entry if it is fresh and covers the request.
    ///
    /// Degraded entries only serve callers that were already waiting when
    /// they were written.
    async fn lookup(
        &self,
        key: &CacheKey,
        offset: usize,
        limit: usize,
        waiting_since: Option<Instant>,
    ) -> Option<Vec<TransactionRecord>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if !self.policy.is_fresh(entry, Instant::now()) {
            return None;
        }
        if entry.degraded && !waiting_since.is_some_and(|since| entry.fetched_at > since) {
            return None;
        }
        if !self.policy.covers(entry, offset, limit) {
            return None;
        }

        Some(entry.page(offset, limit))
    }

    async fn refresh(&self, key: &CacheKey, offset: usize, limit: usize) -> Arc<CacheEntry> {
        let (address, chain_id) = (key.0.as_str(), key.1);
        let window = self.policy.fetch_window(offset, limit);
        let native = self.natives.get(&chain_id).cloned().unwrap_or_default();

        info!("🔄 Refreshing history for {} on chain {} (window {})", address, chain_id, window);

        let batch = fetch_all(
            self.source.as_ref(),
            address,
            chain_id,
            window,
            self.policy.page_size,
            &self.retry,
        )
        .await;
        let mut records = self
            .merge_engine
            .merge(
                &batch.external,
                &batch.internal,
                &batch.token_transfers,
                address,
                chain_id,
                &native,
            )
            .await;
        sort_records(&mut records);

        if batch.is_degraded() {
            warn!(
                "⚠️ History for {} on chain {} is incomplete ({} categories failed); it will be refetched on the next query",
                address,
                chain_id,
                batch.warnings.len()
            );
        }

        let entry = Arc::new(CacheEntry {
            records: Arc::new(records),
            fetched_at: Instant::now(),
            fetch_window: window,
            exhausted: batch.is_exhaustive(window),
            degraded: batch.is_degraded(),
        });

        self.entries.write().await.insert(key.clone(), Arc::clone(&entry));
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            "✅ Cached {} records for {} on chain {}{}",
            entry.records.len(),
            address,
            chain_id,
            if entry.exhausted { " (complete history)" } else { "" }
        );

        entry
    }

    async fn refresh_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop our handle and forget the lock once nobody else holds it.
    async fn release_refresh_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().await;
        drop(lock);
        if locks.get(key).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(key);
        }
    }

    /// Forget the entry for one wallet. Returns whether one existed.
    pub async fn invalidate(&self, address: &str, chain_id: u64) -> bool {
        let removed = self
            .entries
            .write()
            .await
            .remove(&Self::key(address, chain_id))
            .is_some();
        if removed {
            debug!("Invalidated cache entry for {} on chain {}", address, chain_id);
        }
        removed
    }

    /// Drop every entry older than the TTL and return how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.policy.is_fresh(entry, now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            entries: self.entries.read().await.len(),
        }
    }

    #[cfg(test)]
    async fn pending_refresh_locks(&self) -> usize {
        self.refresh_locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        external_only, fast_retry, sample_history, History, MockSource, NoRpc, SAFE,
    };
    use explorer_client::ExplorerCategory;
    use futures::future::join_all;
    use std::collections::HashSet;
    use token_resolver::TokenSymbolResolver;

    fn cache_with(source: Arc<MockSource>, policy: CachePolicy) -> HistoryCache {
        HistoryCache::new(
            source,
            MergeEngine::new(TokenSymbolResolver::new(NoRpc::new())),
            policy,
            fast_retry(),
            HashMap::new(),
        )
    }

    fn cache_for(history: History) -> (Arc<MockSource>, HistoryCache) {
        let source = Arc::new(MockSource::new(history));
        let cache = cache_with(source.clone(), CachePolicy::default());
        (source, cache)
    }

    fn hashes(records: &[TransactionRecord]) -> Vec<String> {
        records.iter().map(|r| r.tx_hash.clone()).collect()
    }

    #[test]
    fn test_fetch_window() {
        let policy = CachePolicy::default();
        assert_eq!(policy.fetch_window(0, 10), 100);
        assert_eq!(policy.fetch_window(0, 50), 150);
        assert_eq!(policy.fetch_window(100, 100), 600);
        assert_eq!(policy.fetch_window(5_000, 100), 10_000);
        assert_eq!(policy.fetch_window(usize::MAX, 100), 10_000);
    }

    #[tokio::test]
    async fn test_second_query_is_a_cache_hit() {
        let (source, cache) = cache_for(sample_history(12));

        let first = cache.get_page(SAFE, 1, 10, 0).await;
        let second = cache.get_page(SAFE, 1, 10, 0).await;

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
        assert_eq!(source.total_calls(), 3);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_pages_are_consistent_with_full_list() {
        let history = sample_history(25);
        let expected = history.distinct_hashes();
        let (source, cache) = cache_for(history);

        let mut paged = Vec::new();
        for offset in [0, 10, 20] {
            paged.extend(cache.get_page(SAFE, 1, 10, offset).await);
        }
        let full = cache.get_page(SAFE, 1, 25, 0).await;

        assert_eq!(full.len(), expected);
        assert_eq!(hashes(&paged), hashes(&full));
        assert_eq!(hashes(&paged).into_iter().collect::<HashSet<_>>().len(), expected);
        assert!(full.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(source.calls(ExplorerCategory::External), 1);
    }

    #[tokio::test]
    async fn test_ties_keep_order_across_refreshes() {
        let mut history = sample_history(10);
        for tx in history.external.iter_mut() {
            tx.timestamp = 1_700_000_000;
            tx.block_number = 19_000_000;
        }
        for tx in history.internal.iter_mut() {
            tx.timestamp = 1_700_000_000;
            tx.block_number = 19_000_000;
        }
        for tx in history.token_transfers.iter_mut() {
            tx.timestamp = 1_700_000_000;
            tx.block_number = 19_000_000;
        }
        let (_, cache) = cache_for(history);

        let before = cache.get_page(SAFE, 1, 10, 0).await;
        assert!(cache.invalidate(SAFE, 1).await);
        let after = cache.get_page(SAFE, 1, 10, 0).await;

        assert_eq!(hashes(&before), hashes(&after));
        let mut sorted = hashes(&before);
        sorted.sort();
        assert_eq!(hashes(&before), sorted);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let (source, cache) = cache_for(sample_history(7));

        assert!(cache.get_page(SAFE, 1, 5, 10).await.is_empty());
        assert!(cache.get_page(SAFE, 1, 5, 10).await.is_empty());
        assert_eq!(cache.get_page(SAFE, 1, 5, 5).await.len(), 2);

        // Whole history is known after the first refresh
        assert_eq!(source.calls(ExplorerCategory::External), 1);
    }

    #[tokio::test]
    async fn test_insufficient_coverage_refreshes_with_larger_window() {
        let (source, cache) = cache_for(external_only(300));

        let first = cache.get_page(SAFE, 1, 10, 0).await;
        assert_eq!(first.len(), 10);
        assert_eq!(source.calls(ExplorerCategory::External), 1);

        let deep = cache.get_page(SAFE, 1, 10, 150).await;
        assert_eq!(deep.len(), 10);
        assert_eq!(source.calls(ExplorerCategory::External), 2);

        let full = cache.get_page(SAFE, 1, 500, 0).await;
        assert_eq!(hashes(&deep), hashes(&full[150..160]));
        assert_eq!(hashes(&first), hashes(&full[..10]));

        // 240 externals fit the second window, so the tail is a hit
        let tail = cache.get_page(SAFE, 1, 20, 230).await;
        assert_eq!(tail.len(), 10);
        assert_eq!(source.calls(ExplorerCategory::External), 2);
    }

    #[tokio::test]
    async fn test_window_ceiling_is_not_refetched() {
        let source = Arc::new(MockSource::new(external_only(300)));
        let policy = CachePolicy {
            max_fetch_window: 100,
            ..CachePolicy::default()
        };
        let cache = cache_with(source.clone(), policy);

        assert_eq!(cache.get_page(SAFE, 1, 10, 0).await.len(), 10);
        assert!(cache.get_page(SAFE, 1, 10, 150).await.is_empty());
        assert_eq!(source.calls(ExplorerCategory::External), 1);
    }

    #[tokio::test]
    async fn test_deep_page_behind_small_explorer_pages() {
        let source = Arc::new(MockSource::new(external_only(300)).with_page_cap(50));
        let policy = CachePolicy {
            page_size: 50,
            ..CachePolicy::default()
        };
        let cache = cache_with(source.clone(), policy);

        let first = cache.get_page(SAFE, 1, 10, 0).await;
        assert_eq!(first.len(), 10);

        let deep = cache.get_page(SAFE, 1, 10, 60).await;
        assert_eq!(deep.len(), 10);

        let all = source.history().external;
        let expected: Vec<String> = all[60..70].iter().map(|t| t.hash.clone()).collect();
        assert_eq!(hashes(&deep), expected);

        // A wider window walks pages until the explorer runs dry
        let tail = cache.get_page(SAFE, 1, 100, 200).await;
        assert_eq!(tail.len(), 40);
        assert_eq!(source.calls(ExplorerCategory::External), 2 + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let (source, cache) = cache_for(sample_history(5));

        cache.get_page(SAFE, 1, 10, 0).await;
        tokio::time::advance(Duration::from_secs(299)).await;
        cache.get_page(SAFE, 1, 10, 0).await;
        assert_eq!(source.calls(ExplorerCategory::External), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.get_page(SAFE, 1, 10, 0).await;
        assert_eq!(source.calls(ExplorerCategory::External), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let (_, cache) = cache_for(sample_history(5));
        cache.get_page(SAFE, 1, 10, 0).await;
        cache.get_page(SAFE, 137, 10, 0).await;

        assert_eq!(cache.purge_expired().await, 0);
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.purge_expired().await, 2);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_refresh() {
        let source = Arc::new(MockSource::new(sample_history(20)).with_delay(Duration::from_millis(50)));
        let cache = cache_with(source.clone(), CachePolicy::default());

        let pages = join_all((0..5).map(|_| cache.get_page(SAFE, 1, 10, 0))).await;

        assert!(pages.iter().all(|page| page == &pages[0]));
        assert_eq!(pages[0].len(), 10);
        assert_eq!(source.calls(ExplorerCategory::External), 1);
        assert_eq!(source.calls(ExplorerCategory::Internal), 1);
        assert_eq!(source.calls(ExplorerCategory::TokenTransfer), 1);
        assert_eq!(cache.stats().await.refreshes, 1);
        assert_eq!(cache.pending_refresh_locks().await, 0);
    }

    #[tokio::test]
    async fn test_different_keys_refresh_independently() {
        let (source, cache) = cache_for(sample_history(5));

        cache.get_page(SAFE, 1, 10, 0).await;
        cache.get_page(SAFE, 137, 10, 0).await;
        cache.get_page(&SAFE.to_uppercase().replacen("0X", "0x", 1), 1, 10, 0).await;

        assert_eq!(source.calls(ExplorerCategory::External), 2);
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_degraded_refresh_is_not_reused() {
        let (source, cache) = cache_for(sample_history(10));
        source.fail_with_api_error(ExplorerCategory::Internal);

        let partial = cache.get_page(SAFE, 1, 20, 0).await;
        assert!(!partial.is_empty());
        assert!(partial.len() < 10);

        cache.get_page(SAFE, 1, 20, 0).await;
        assert_eq!(source.calls(ExplorerCategory::External), 2);

        source.clear_failures();
        let complete = cache.get_page(SAFE, 1, 20, 0).await;
        assert_eq!(complete.len(), 10);
        cache.get_page(SAFE, 1, 20, 0).await;
        assert_eq!(source.calls(ExplorerCategory::External), 3);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let (source, cache) = cache_for(sample_history(5));

        cache.get_page(SAFE, 1, 10, 0).await;
        assert!(cache.invalidate(SAFE, 1).await);
        assert!(!cache.invalidate(SAFE, 1).await);
        cache.get_page(SAFE, 1, 10, 0).await;

        assert_eq!(source.calls(ExplorerCategory::External), 2);
    }
}
