use explorer_client::{
    ExplorerCategory, ExplorerError, ExternalTransaction, InternalTransaction, TokenTransfer,
    TransactionSource,
};
use retry_utils::{retry_with_backoff, RetryConfig};
use std::future::Future;
use tracing::{debug, info, warn};

/// A category that could not be fetched; its rows are treated as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryWarning {
    pub category: ExplorerCategory,
    pub message: String,
    pub rate_limited: bool,
    pub attempts: u32,
}

/// Rows of all three feeds from one refresh
#[derive(Debug, Default)]
pub struct CategoryBatch {
    pub external: Vec<ExternalTransaction>,
    pub internal: Vec<InternalTransaction>,
    pub token_transfers: Vec<TokenTransfer>,
    pub warnings: Vec<CategoryWarning>,
}

impl CategoryBatch {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// True when every feed ended on a short page before filling `window`,
    /// i.e. nothing older exists upstream.
    pub fn is_exhaustive(&self, window: usize) -> bool {
        !self.is_degraded()
            && self.external.len() < window
            && self.internal.len() < window
            && self.token_transfers.len() < window
    }
}

/// Read the newest `window` rows of one category as consecutive pages of
/// `page_size`, retrying each page on its own.
///
/// A page that fails after retries ends the walk: rows already read are kept
/// and the category is reported through a warning.
async fn fetch_category<T, F, Fut>(
    category: ExplorerCategory,
    mut fetch_page: F,
    window: usize,
    page_size: usize,
    retry: &RetryConfig,
) -> (Vec<T>, Option<CategoryWarning>)
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ExplorerError>>,
{
    let page_size = page_size.clamp(1, window.max(1));
    let request_size = u32::try_from(page_size).unwrap_or(u32::MAX);
    let mut rows: Vec<T> = Vec::new();
    let mut page: u32 = 1;

    loop {
        let result = retry_with_backoff(
            || fetch_page(page, request_size),
            retry,
            ExplorerError::retry_class,
        )
        .await;

        match result {
            Ok(batch) => {
                let short = batch.len() < page_size;
                rows.extend(batch);
                if short || rows.len() >= window {
                    break;
                }
                debug!("{} page {} full, reading page {}", category, page, page + 1);
                page += 1;
            }
            Err(exhausted) => {
                warn!(
                    "⚠️ {} fetch failed on page {} ({} rows kept), continuing without the rest: {}",
                    category,
                    page,
                    rows.len(),
                    exhausted
                );
                let warning = CategoryWarning {
                    category,
                    message: exhausted.error.to_string(),
                    rate_limited: exhausted.error.is_rate_limited(),
                    attempts: exhausted.attempts,
                };
                return (rows, Some(warning));
            }
        }
    }

    rows.truncate(window);
    (rows, None)
}

/// Fetch the newest `window` rows of every category concurrently, `page_size`
/// rows per explorer request.
///
/// Never fails: a category that errors out (after retries for rate limits,
/// timeouts and 5xx) contributes what it read so far and a warning.
pub async fn fetch_all(
    source: &dyn TransactionSource,
    address: &str,
    chain_id: u64,
    window: usize,
    page_size: usize,
    retry: &RetryConfig,
) -> CategoryBatch {
    let (external, internal, token_transfers) = tokio::join!(
        fetch_category(
            ExplorerCategory::External,
            |page, size| source.external_transactions(address, chain_id, page, size),
            window,
            page_size,
            retry,
        ),
        fetch_category(
            ExplorerCategory::Internal,
            |page, size| source.internal_transactions(address, chain_id, page, size),
            window,
            page_size,
            retry,
        ),
        fetch_category(
            ExplorerCategory::TokenTransfer,
            |page, size| source.token_transfers(address, chain_id, page, size),
            window,
            page_size,
            retry,
        ),
    );

    let warnings: Vec<CategoryWarning> = [external.1, internal.1, token_transfers.1]
        .into_iter()
        .flatten()
        .collect();

    info!(
        "📊 Fetched {} external, {} internal, {} token rows for {} on chain {} (window {}, {} failed)",
        external.0.len(),
        internal.0.len(),
        token_transfers.0.len(),
        address,
        chain_id,
        window,
        warnings.len()
    );

    CategoryBatch {
        external: external.0,
        internal: internal.0,
        token_transfers: token_transfers.0,
        warnings,
    }
}
