use async_trait::async_trait;
use explorer_client::{
    ExplorerCategory, ExplorerError, ExternalTransaction, InternalTransaction, TokenTransfer,
    TransactionSource,
};
use retry_utils::RetryConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use token_resolver::{ContractReader, RpcError};

pub const SAFE: &str = "0x5afe00000000000000000000000000000000beef";
pub const OWNER: &str = "0x00000000000000000000000000000000000000aa";
pub const PAYEE: &str = "0x00000000000000000000000000000000000000bb";
pub const TOKEN: &str = "0x00000000000000000000000000000000000000cc";

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        rate_limit_delays_ms: vec![1],
        server_error_delays_ms: vec![1],
        timeout_delays_ms: vec![1],
    }
}

#[derive(Debug, Clone, Default)]
pub struct History {
    pub external: Vec<ExternalTransaction>,
    pub internal: Vec<InternalTransaction>,
    pub token_transfers: Vec<TokenTransfer>,
}

impl History {
    /// Number of distinct hashes across all feeds
    pub fn distinct_hashes(&self) -> usize {
        let mut hashes: Vec<&str> = self
            .external
            .iter()
            .map(|t| t.hash.as_str())
            .chain(self.internal.iter().map(|t| t.hash.as_str()))
            .chain(self.token_transfers.iter().map(|t| t.hash.as_str()))
            .collect();
        hashes.sort();
        hashes.dedup();
        hashes.len()
    }
}

fn hash(n: usize) -> String {
    format!("0x{:064x}", n)
}

/// `n` Safe executions, newest first. Every third one also moved ETH
/// internally, every fourth one moved tokens, and every fifth hash exists
/// only as an internal or token row.
pub fn sample_history(n: usize) -> History {
    let mut history = History::default();
    for i in 0..n {
        let ts = 1_700_000_000 - (i as u64) * 60;
        let block = 19_000_000 - i as u64;
        let h = hash(i + 1);

        if i % 5 == 4 {
            if i % 2 == 0 {
                history.internal.push(InternalTransaction {
                    block_number: block,
                    timestamp: ts,
                    hash: h.clone(),
                    from: PAYEE.to_string(),
                    to: SAFE.to_string(),
                    value: "3".to_string(),
                    trace_id: "0".to_string(),
                    is_error: "0".to_string(),
                });
            } else {
                history.token_transfers.push(token_row(&h, ts, block, PAYEE, SAFE));
            }
            continue;
        }

        history.external.push(ExternalTransaction {
            block_number: block,
            timestamp: ts,
            hash: h.clone(),
            nonce: i as u64,
            from: OWNER.to_string(),
            to: SAFE.to_string(),
            value: "0".to_string(),
            input: "0x6a761202".to_string(),
            is_error: "0".to_string(),
            function_name: "execTransaction".to_string(),
        });

        if i % 3 == 0 {
            history.internal.push(InternalTransaction {
                block_number: block,
                timestamp: ts,
                hash: h.clone(),
                from: SAFE.to_string(),
                to: PAYEE.to_string(),
                value: "100".to_string(),
                trace_id: "0_1".to_string(),
                is_error: "0".to_string(),
            });
        }
        if i % 4 == 0 {
            history.token_transfers.push(token_row(&h, ts, block, SAFE, PAYEE));
        }
    }
    history
}

/// `sample_history(n)` without internal or token rows
pub fn external_only(n: usize) -> History {
    let mut history = sample_history(n);
    history.internal.clear();
    history.token_transfers.clear();
    history
}

fn token_row(hash: &str, ts: u64, block: u64, from: &str, to: &str) -> TokenTransfer {
    TokenTransfer {
        block_number: block,
        timestamp: ts,
        hash: hash.to_string(),
        nonce: 0,
        from: from.to_string(),
        to: to.to_string(),
        value: "20".to_string(),
        contract_address: TOKEN.to_string(),
        token_name: "USD Coin".to_string(),
        token_symbol: "USDC".to_string(),
        token_decimals: 6,
        log_index: Some(1),
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    RateLimit,
    Api,
}

/// In-memory explorer honouring `page`/`page_size`, with call counters and
/// scripted failures.
pub struct MockSource {
    history: Mutex<History>,
    calls: Mutex<HashMap<ExplorerCategory, usize>>,
    failures: Mutex<HashMap<ExplorerCategory, (Failure, usize)>>,
    failing_pages: Mutex<HashMap<ExplorerCategory, u32>>,
    delay: Option<Duration>,
    page_cap: Option<u32>,
}

impl MockSource {
    pub fn new(history: History) -> Self {
        Self {
            history: Mutex::new(history),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            failing_pages: Mutex::new(HashMap::new()),
            delay: None,
            page_cap: None,
        }
    }

    /// Serve at most `cap` rows per request whatever page size is asked for
    pub fn with_page_cap(mut self, cap: u32) -> Self {
        self.page_cap = Some(cap);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, category: ExplorerCategory) -> usize {
        self.calls.lock().unwrap().get(&category).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn rate_limit_next(&self, category: ExplorerCategory, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(category, (Failure::RateLimit, times));
    }

    pub fn fail_with_api_error(&self, category: ExplorerCategory) {
        self.failures
            .lock()
            .unwrap()
            .insert(category, (Failure::Api, usize::MAX));
    }

    /// Answer every request for `page` or later with an API error
    pub fn fail_from_page(&self, category: ExplorerCategory, page: u32) {
        self.failing_pages.lock().unwrap().insert(category, page);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
        self.failing_pages.lock().unwrap().clear();
    }

    pub fn history(&self) -> History {
        self.history.lock().unwrap().clone()
    }

    pub fn replace_history(&self, history: History) {
        *self.history.lock().unwrap() = history;
    }

    async fn enter(&self, category: ExplorerCategory, page: u32) -> Result<(), ExplorerError> {
        *self.calls.lock().unwrap().entry(category).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(first_failing) = self.failing_pages.lock().unwrap().get(&category) {
            if page >= *first_failing {
                return Err(ExplorerError::Api {
                    message: format!("NOTOK: page {} unavailable", page),
                });
            }
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some((failure, remaining)) = failures.get_mut(&category) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(match failure {
                    Failure::RateLimit => ExplorerError::RateLimited {
                        message: "Max rate limit reached".to_string(),
                    },
                    Failure::Api => ExplorerError::Api {
                        message: "NOTOK: Query Timeout occured".to_string(),
                    },
                });
            }
        }
        Ok(())
    }

    fn page_of<T: Clone>(&self, rows: &[T], page: u32, page_size: u32) -> Vec<T> {
        // Explorers cap `offset` silently
        let served = self.page_cap.map_or(page_size, |cap| page_size.min(cap));
        let start = (page.saturating_sub(1) as usize).saturating_mul(served as usize);
        rows.iter()
            .skip(start)
            .take(served as usize)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TransactionSource for MockSource {
    async fn external_transactions(
        &self,
        _address: &str,
        _chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ExternalTransaction>, ExplorerError> {
        self.enter(ExplorerCategory::External, page).await?;
        Ok(self.page_of(&self.history.lock().unwrap().external, page, page_size))
    }

    async fn internal_transactions(
        &self,
        _address: &str,
        _chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<InternalTransaction>, ExplorerError> {
        self.enter(ExplorerCategory::Internal, page).await?;
        Ok(self.page_of(&self.history.lock().unwrap().internal, page, page_size))
    }

    async fn token_transfers(
        &self,
        _address: &str,
        _chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TokenTransfer>, ExplorerError> {
        self.enter(ExplorerCategory::TokenTransfer, page).await?;
        Ok(self.page_of(&self.history.lock().unwrap().token_transfers, page, page_size))
    }
}

/// Contract reader for tests where every transfer is already labelled
pub struct NoRpc {
    pub calls: AtomicUsize,
}

impl NoRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContractReader for NoRpc {
    async fn call(&self, _chain_id: u64, _to: &str, _data: &str) -> Result<String, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RpcError::InvalidResponse("no rpc in tests".to_string()))
    }
}
