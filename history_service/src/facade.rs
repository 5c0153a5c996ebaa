use crate::cache::{CachePolicy, CacheStats, HistoryCache};
use config_manager::SystemConfig;
use explorer_client::{ExplorerClient, TransactionSource};
use history_core::{normalize_address, HistoryError, MergeEngine, NativeCurrency, Result, TransactionRecord};
use retry_utils::RetryConfig;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use token_resolver::{ContractReader, JsonRpcReader, TokenSymbolResolver};
use tracing::{debug, info};

/// Entry point for reading a Safe's transaction history.
///
/// Input is validated here so that nothing malformed ever reaches the
/// explorer or the cache.
pub struct TransactionHistoryService {
    cache: HistoryCache,
    supported_chains: BTreeSet<u64>,
    max_page_size: usize,
}

impl TransactionHistoryService {
    /// Wire the service against the configured explorers and RPC endpoints.
    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        let source = ExplorerClient::new(&config.explorer, &config.chains)
            .map_err(|e| HistoryError::Configuration(e.to_string()))?;
        let reader = JsonRpcReader::new(&config.rpc, &config.chains)
            .map_err(|e| HistoryError::Configuration(e.to_string()))?;

        Ok(Self::new(Arc::new(source), Arc::new(reader), config))
    }

    pub fn new(
        source: Arc<dyn TransactionSource>,
        reader: Arc<dyn ContractReader>,
        config: &SystemConfig,
    ) -> Self {
        let natives: HashMap<u64, NativeCurrency> = config
            .chains
            .iter()
            .map(|chain| {
                (
                    chain.chain_id,
                    NativeCurrency {
                        symbol: chain.native_symbol.clone(),
                        decimals: chain.native_decimals,
                    },
                )
            })
            .collect();

        let retry = RetryConfig {
            max_attempts: config.retry.max_attempts,
            rate_limit_delays_ms: config.retry.rate_limit_delays_ms.clone(),
            server_error_delays_ms: config.retry.server_error_delays_ms.clone(),
            timeout_delays_ms: config.retry.timeout_delays_ms.clone(),
        };

        let merge_engine = MergeEngine::new(TokenSymbolResolver::new(reader));
        let cache = HistoryCache::new(
            source,
            merge_engine,
            CachePolicy::from(config),
            retry,
            natives,
        );

        info!(
            "Transaction history service ready for chains {:?} (ttl {}s, max page {})",
            config.supported_chain_ids(),
            config.cache.ttl_seconds,
            config.cache.max_page_size
        );

        Self {
            cache,
            supported_chains: config.chains.iter().map(|chain| chain.chain_id).collect(),
            max_page_size: config.cache.max_page_size,
        }
    }

    fn validate(&self, address: &str, chain_id: u64) -> Result<String> {
        let address = normalize_address(address)?;
        if !self.supported_chains.contains(&chain_id) {
            return Err(HistoryError::UnsupportedChain { chain_id });
        }
        Ok(address)
    }

    /// Page `offset..offset + limit` of the wallet's history, newest first.
    ///
    /// `limit` must be between 1 and the configured maximum page size; an
    /// offset past the end yields an empty page.
    pub async fn get_transactions(
        &self,
        address: &str,
        chain_id: u64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let address = self.validate(address, chain_id)?;
        if limit == 0 || limit > self.max_page_size {
            return Err(HistoryError::InvalidLimit {
                limit,
                max: self.max_page_size,
            });
        }

        debug!(
            "Fetching transactions for {} on chain {} (limit {}, offset {})",
            address, chain_id, limit, offset
        );

        Ok(self.cache.get_page(&address, chain_id, limit, offset).await)
    }

    pub fn supported_chains(&self) -> Vec<u64> {
        self.supported_chains.iter().copied().collect()
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn invalidate(&self, address: &str, chain_id: u64) -> Result<bool> {
        let address = self.validate(address, chain_id)?;
        Ok(self.cache.invalidate(&address, chain_id).await)
    }

    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }
}
