pub mod merge;

pub use merge::{merge_records, MergeEngine};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Token address used for the chain's native currency in state changes
pub const NATIVE_TOKEN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Invalid wallet address: {address}")]
    InvalidAddress { address: String },
    #[error("Unsupported chain id: {chain_id}")]
    UnsupportedChain { chain_id: u64 },
    #[error("Invalid page size: {limit} (must be between 1 and {max})")]
    InvalidLimit { limit: usize, max: usize },
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// One logical transaction affecting the tracked wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Lower-case transaction hash, unique within a result set
    pub tx_hash: String,

    /// Block timestamp, seconds since epoch
    pub timestamp: u64,

    pub block_number: u64,

    pub nonce: u64,

    pub to: String,

    pub from: String,

    /// Calldata of the top-level call, `0x` when unknown
    pub data: String,

    /// Safe operation type (0 = CALL)
    pub operation: u8,

    /// Native value of the transaction; `"0"` for token-only records
    pub value: String,

    /// Always true: history only contains settled chain events
    pub is_executed: bool,

    pub method: String,

    /// Present only when the record was created from a token transfer
    pub token_info: Option<TokenInfo>,

    /// Balance effects on the tracked wallet, in merge order
    pub state_changes: Vec<StateChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateChangeKind {
    /// Value of a top-level transaction
    Native,
    /// Value moved by contract execution
    Internal,
    /// ERC-20 `Transfer`
    Token,
}

/// One balance-affecting effect of a transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub kind: StateChangeKind,
    /// [`NATIVE_TOKEN_ADDRESS`] for native currency
    pub token_address: String,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub from: String,
    pub to: String,
    /// Raw integer amount in base units
    pub value: String,
}

impl StateChange {
    pub fn is_native(&self) -> bool {
        self.token_address == NATIVE_TOKEN_ADDRESS
    }
}

/// Native currency of the chain being merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub symbol: String,
    pub decimals: u8,
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self {
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// Classification labels shown by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodLabel {
    OutgoingTransaction,
    IncomingTransaction,
    InternalOutgoing,
    InternalIncoming,
    TokenOutgoing,
    TokenIncoming,
}

impl MethodLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodLabel::OutgoingTransaction => "Outgoing Transaction",
            MethodLabel::IncomingTransaction => "Incoming Transaction",
            MethodLabel::InternalOutgoing => "Internal Outgoing",
            MethodLabel::InternalIncoming => "Internal Incoming",
            MethodLabel::TokenOutgoing => "Token Outgoing",
            MethodLabel::TokenIncoming => "Token Incoming",
        }
    }
}

impl fmt::Display for MethodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate an EVM address (`0x` + 40 hex chars) and return its canonical
/// lower-case form.
pub fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let valid = trimmed.len() == 42
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());

    if !valid {
        return Err(HistoryError::InvalidAddress {
            address: address.to_string(),
        });
    }

    Ok(format!("0x{}", trimmed[2..].to_lowercase()))
}

/// Sort newest first. Ties fall back to block number, then hash, so that
/// slicing the same set always yields the same pages.
pub fn sort_records(records: &mut [TransactionRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.block_number.cmp(&a.block_number))
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
    });
}
