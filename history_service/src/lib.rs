pub mod cache;
pub mod facade;
pub mod fetch;

#[cfg(test)]
mod test_support;

pub use cache::{CacheEntry, CachePolicy, CacheStats, HistoryCache};
pub use facade::TransactionHistoryService;
pub use fetch::{fetch_all, CategoryBatch, CategoryWarning};
pub use history_core::{HistoryError, StateChange, TokenInfo, TransactionRecord};
