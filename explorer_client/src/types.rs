use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The three account feeds an Etherscan-style explorer exposes per address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorerCategory {
    External,
    Internal,
    TokenTransfer,
}

impl ExplorerCategory {
    /// Value of the `action` query parameter
    pub fn action(&self) -> &'static str {
        match self {
            ExplorerCategory::External => "txlist",
            ExplorerCategory::Internal => "txlistinternal",
            ExplorerCategory::TokenTransfer => "tokentx",
        }
    }
}

impl fmt::Display for ExplorerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Envelope every explorer account endpoint answers with. `result` is an
/// array on success and a message string on most errors.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// `txlist` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransaction {
    #[serde(deserialize_with = "de_u64")]
    pub block_number: u64,
    #[serde(rename = "timeStamp", deserialize_with = "de_u64")]
    pub timestamp: u64,
    pub hash: String,
    #[serde(default, deserialize_with = "de_u64")]
    pub nonce: u64,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default = "zero")]
    pub value: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default)]
    pub function_name: String,
}

/// `txlistinternal` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransaction {
    #[serde(deserialize_with = "de_u64")]
    pub block_number: u64,
    #[serde(rename = "timeStamp", deserialize_with = "de_u64")]
    pub timestamp: u64,
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default = "zero")]
    pub value: String,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub is_error: String,
}

/// `tokentx` row (ERC-20 `Transfer` event)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(deserialize_with = "de_u64")]
    pub block_number: u64,
    #[serde(rename = "timeStamp", deserialize_with = "de_u64")]
    pub timestamp: u64,
    pub hash: String,
    #[serde(default, deserialize_with = "de_u64")]
    pub nonce: u64,
    pub from: String,
    pub to: String,
    #[serde(default = "zero")]
    pub value: String,
    pub contract_address: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_symbol: String,
    #[serde(rename = "tokenDecimal", default, deserialize_with = "de_u8")]
    pub token_decimals: u8,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub log_index: Option<u64>,
}

fn zero() -> String {
    "0".to_string()
}

impl ExternalTransaction {
    /// Lower-case every hex field so hash and address comparisons are exact.
    pub fn normalize(mut self) -> Self {
        self.hash = self.hash.to_lowercase();
        self.from = self.from.to_lowercase();
        self.to = self.to.to_lowercase();
        if self.value.is_empty() {
            self.value = zero();
        }
        self
    }

    pub fn failed(&self) -> bool {
        self.is_error == "1"
    }
}

impl InternalTransaction {
    pub fn normalize(mut self) -> Self {
        self.hash = self.hash.to_lowercase();
        self.from = self.from.to_lowercase();
        self.to = self.to.to_lowercase();
        if self.value.is_empty() {
            self.value = zero();
        }
        self
    }
}

impl TokenTransfer {
    pub fn normalize(mut self) -> Self {
        self.hash = self.hash.to_lowercase();
        self.from = self.from.to_lowercase();
        self.to = self.to.to_lowercase();
        self.contract_address = self.contract_address.to_lowercase();
        self.token_symbol = self.token_symbol.trim().to_string();
        if self.value.is_empty() {
            self.value = zero();
        }
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn parse_number(raw: NumberOrString) -> Result<Option<u64>, String> {
    match raw {
        NumberOrString::Number(n) => Ok(Some(n)),
        NumberOrString::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).map(Some),
                None => s.parse::<u64>().map(Some),
            }
            .map_err(|e| format!("invalid integer '{}': {}", s, e))
        }
    }
}

/// Explorers encode integers as decimal strings; accept bare numbers and
/// `0x` hex as well.
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = NumberOrString::deserialize(deserializer)?;
    parse_number(raw)
        .map(|n| n.unwrap_or(0))
        .map_err(serde::de::Error::custom)
}

fn de_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<NumberOrString>::deserialize(deserializer)?;
    match raw {
        Some(raw) => parse_number(raw).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn de_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = de_u64(deserializer)?;
    u8::try_from(value).map_err(serde::de::Error::custom)
}
