use crate::{
    error::ExplorerError,
    types::{ExplorerCategory, ExplorerResponse, ExternalTransaction, InternalTransaction, TokenTransfer},
};
use async_trait::async_trait;
use config_manager::{ChainConfig, ExplorerConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Paginated per-category account feeds for one `(address, chain)` pair.
///
/// `page` is 1-based. Rows come back newest first and already normalized
/// (lower-case hashes and addresses).
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn external_transactions(
        &self,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ExternalTransaction>, ExplorerError>;

    async fn internal_transactions(
        &self,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<InternalTransaction>, ExplorerError>;

    async fn token_transfers(
        &self,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TokenTransfer>, ExplorerError>;
}

/// Etherscan-family explorer client
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    api_key: String,
    max_page_size: u32,
    endpoints: HashMap<u64, String>,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig, chains: &[ChainConfig]) -> Result<Self, ExplorerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let endpoints = chains
            .iter()
            .map(|chain| (chain.chain_id, chain.explorer_url.clone()))
            .collect();

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            max_page_size: config.max_page_size,
            endpoints,
        })
    }

    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.endpoints.contains_key(&chain_id)
    }

    /// Fetch one page of raw rows for a category.
    pub async fn fetch(
        &self,
        category: ExplorerCategory,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<serde_json::Value>, ExplorerError> {
        let base_url = self
            .endpoints
            .get(&chain_id)
            .ok_or(ExplorerError::UnsupportedChain { chain_id })?;

        if page_size > self.max_page_size {
            warn!(
                "⚠️ Requested page size {} exceeds explorer maximum {}, page will be capped",
                page_size, self.max_page_size
            );
        }
        let page_size = page_size.clamp(1, self.max_page_size);

        debug!(
            "📡 Explorer request: action={} chain={} address={} page={} offset={}",
            category.action(),
            chain_id,
            address,
            page,
            page_size
        );

        let start_time = std::time::Instant::now();
        let response = self
            .client
            .get(base_url)
            .query(&[
                ("module", "account"),
                ("action", category.action()),
                ("address", address),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", "desc"),
                ("apikey", self.api_key.as_str()),
            ])
            .query(&[("page", page), ("offset", page_size)])
            .send()
            .await?;

        let status = response.status();
        debug!(
            "📨 {} response: {} in {}ms",
            category.action(),
            status,
            start_time.elapsed().as_millis()
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Explorer HTTP error - Status: {}, Body: {}", status, body);

            return Err(match status.as_u16() {
                429 => ExplorerError::RateLimited { message: body },
                code => ExplorerError::Status { status: code, body },
            });
        }

        let response_text = response.text().await?;
        let envelope: ExplorerResponse = serde_json::from_str(&response_text).map_err(|e| {
            let sample: String = response_text.chars().take(500).collect();
            error!("❌ Failed to parse explorer response: {} (sample: {})", e, sample);
            ExplorerError::Parse {
                message: format!("JSON parse error: {}", e),
            }
        })?;

        let rows = Self::classify(envelope)?;
        info!(
            "✅ {} rows from {} for {} on chain {}",
            rows.len(),
            category.action(),
            address,
            chain_id
        );
        Ok(rows)
    }

    /// Split an explorer envelope into rows, an empty result, or an error.
    /// A `status:"0"` body can mean "nothing found" or a real failure; only
    /// the message tells them apart.
    pub fn classify(envelope: ExplorerResponse) -> Result<Vec<serde_json::Value>, ExplorerError> {
        if envelope.status == "1" {
            return match envelope.result {
                serde_json::Value::Array(rows) => Ok(rows),
                other => Err(ExplorerError::Parse {
                    message: format!("expected result array, got {}", other),
                }),
            };
        }

        let detail = match &envelope.result {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(rows) if rows.is_empty() => String::new(),
            other => other.to_string(),
        };
        let combined = format!("{} {}", envelope.message, detail).to_lowercase();

        if combined.contains("rate limit") || combined.contains("too many") {
            warn!("⚠️ Explorer rate limited: {}", detail);
            return Err(ExplorerError::RateLimited { message: detail });
        }

        if combined.contains("no transactions found")
            || combined.contains("no records found")
            || matches!(&envelope.result, serde_json::Value::Array(rows) if rows.is_empty())
        {
            return Ok(Vec::new());
        }

        Err(ExplorerError::Api {
            message: if detail.is_empty() {
                envelope.message
            } else {
                format!("{}: {}", envelope.message, detail)
            },
        })
    }

    async fn fetch_typed<T: DeserializeOwned>(
        &self,
        category: ExplorerCategory,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<T>, ExplorerError> {
        let rows = self.fetch(category, address, chain_id, page, page_size).await?;
        let total = rows.len();

        // Rows that do not parse are dropped, the rest of the page is kept
        let parsed: Vec<T> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<T>(row.clone()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    let hash = row.get("hash").and_then(|h| h.as_str()).unwrap_or("?");
                    warn!("⚠️ Skipping malformed {} row {}: {}", category.action(), hash, e);
                    None
                }
            })
            .collect();

        if parsed.len() < total {
            warn!(
                "⚠️ Dropped {} of {} {} rows for {} on chain {}",
                total - parsed.len(),
                total,
                category.action(),
                address,
                chain_id
            );
        }
        Ok(parsed)
    }
}

#[async_trait]
impl TransactionSource for ExplorerClient {
    async fn external_transactions(
        &self,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ExternalTransaction>, ExplorerError> {
        let rows: Vec<ExternalTransaction> = self
            .fetch_typed(ExplorerCategory::External, address, chain_id, page, page_size)
            .await?;
        Ok(rows.into_iter().map(ExternalTransaction::normalize).collect())
    }

    async fn internal_transactions(
        &self,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<InternalTransaction>, ExplorerError> {
        let rows: Vec<InternalTransaction> = self
            .fetch_typed(ExplorerCategory::Internal, address, chain_id, page, page_size)
            .await?;
        Ok(rows.into_iter().map(InternalTransaction::normalize).collect())
    }

    async fn token_transfers(
        &self,
        address: &str,
        chain_id: u64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TokenTransfer>, ExplorerError> {
        let rows: Vec<TokenTransfer> = self
            .fetch_typed(ExplorerCategory::TokenTransfer, address, chain_id, page, page_size)
            .await?;
        Ok(rows.into_iter().map(TokenTransfer::normalize).collect())
    }
}
