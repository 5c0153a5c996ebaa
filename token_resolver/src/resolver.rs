use crate::abi::{decode_abi_string, decode_bytes32_string, decode_hex_payload, SYMBOL_SELECTOR};
use crate::rpc::ContractReader;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Symbol used when a token contract gives no usable answer
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

type CacheKey = (String, u64);

/// Resolves ERC-20 symbols, caching every outcome per `(token, chain)`.
///
/// Failed lookups are cached as [`UNKNOWN_SYMBOL`] too, so a contract that
/// reverts or returns junk is asked exactly once.
#[derive(Clone)]
pub struct TokenSymbolResolver {
    reader: Arc<dyn ContractReader>,
    cache: Arc<RwLock<HashMap<CacheKey, String>>>,
}

impl TokenSymbolResolver {
    pub fn new(reader: Arc<dyn ContractReader>) -> Self {
        Self {
            reader,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn key(token_address: &str, chain_id: u64) -> CacheKey {
        (token_address.to_lowercase(), chain_id)
    }

    /// Record a symbol the explorer already supplied.
    pub fn remember(&self, token_address: &str, chain_id: u64, symbol: &str) {
        if symbol.trim().is_empty() {
            return;
        }
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(Self::key(token_address, chain_id), symbol.trim().to_string());
        }
    }

    pub fn cached(&self, token_address: &str, chain_id: u64) -> Option<String> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&Self::key(token_address, chain_id)).cloned())
    }

    /// Resolve a token symbol, falling back to `eth_call symbol()`.
    /// Never fails: anything unusable becomes [`UNKNOWN_SYMBOL`].
    pub async fn resolve_symbol(&self, token_address: &str, chain_id: u64) -> String {
        if let Some(symbol) = self.cached(token_address, chain_id) {
            debug!("Token symbol cache hit for: {}", token_address);
            return symbol;
        }

        let symbol = self.fetch_symbol(token_address, chain_id).await;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(Self::key(token_address, chain_id), symbol.clone());
        }

        symbol
    }

    /// Resolve several tokens concurrently, one call per distinct address.
    pub async fn resolve_many<I>(&self, token_addresses: I, chain_id: u64) -> HashMap<String, String>
    where
        I: IntoIterator<Item = String>,
    {
        let distinct: BTreeSet<String> = token_addresses
            .into_iter()
            .map(|address| address.to_lowercase())
            .collect();

        if distinct.is_empty() {
            return HashMap::new();
        }

        debug!("Resolving {} token symbols on chain {}", distinct.len(), chain_id);

        let lookups = distinct.into_iter().map(|address| async move {
            let symbol = self.resolve_symbol(&address, chain_id).await;
            (address, symbol)
        });

        join_all(lookups).await.into_iter().collect()
    }

    async fn fetch_symbol(&self, token_address: &str, chain_id: u64) -> String {
        let raw = match self.reader.call(chain_id, token_address, SYMBOL_SELECTOR).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("symbol() call failed for {} on chain {}: {}", token_address, chain_id, e);
                return UNKNOWN_SYMBOL.to_string();
            }
        };

        let decoded = decode_hex_payload(&raw).and_then(|bytes| {
            decode_abi_string(&bytes).or_else(|| decode_bytes32_string(&bytes))
        });

        match decoded {
            Some(symbol) => {
                info!("Resolved symbol {} for token {}", symbol, token_address);
                symbol
            }
            None => {
                warn!(
                    "Undecodable symbol() response for {} on chain {}: {}",
                    token_address, chain_id, raw
                );
                UNKNOWN_SYMBOL.to_string()
            }
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
            debug!("Token symbol cache cleared");
        }
    }
}
