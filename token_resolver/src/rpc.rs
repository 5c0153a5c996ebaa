use async_trait::async_trait;
use config_manager::{ChainConfig, RpcConfig};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
    #[error("No RPC endpoint configured for chain {0}")]
    UnsupportedChain(u64),
}

/// Read-only contract calls (`eth_call` at `latest`).
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Returns the raw `0x`-prefixed hex result.
    async fn call(&self, chain_id: u64, to: &str, data: &str) -> Result<String, RpcError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTP, one endpoint per chain
#[derive(Debug)]
pub struct JsonRpcReader {
    client: Client,
    endpoints: HashMap<u64, String>,
    next_id: AtomicU64,
}

impl JsonRpcReader {
    pub fn new(config: &RpcConfig, chains: &[ChainConfig]) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let endpoints = chains
            .iter()
            .filter(|chain| !chain.rpc_url.is_empty())
            .map(|chain| (chain.chain_id, chain.rpc_url.clone()))
            .collect();

        Ok(Self {
            client,
            endpoints,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl ContractReader for JsonRpcReader {
    async fn call(&self, chain_id: u64, to: &str, data: &str) -> Result<String, RpcError> {
        let url = self
            .endpoints
            .get(&chain_id)
            .ok_or(RpcError::UnsupportedChain(chain_id))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_call",
            "params": [{ "to": to, "data": data }, "latest"],
        });

        debug!("eth_call {} on chain {} ({})", data, chain_id, to);

        let response: JsonRpcResponse = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        match response.result {
            Some(serde_json::Value::String(hex)) => Ok(hex),
            Some(other) => Err(RpcError::InvalidResponse(format!(
                "expected hex string, got {}",
                other
            ))),
            None => Err(RpcError::InvalidResponse("missing result".to_string())),
        }
    }
}
