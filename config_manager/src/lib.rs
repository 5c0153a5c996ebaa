use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Block explorer API settings shared by every chain
    pub explorer: ExplorerConfig,

    /// JSON-RPC settings used for token symbol lookups
    pub rpc: RpcConfig,

    /// Chains the engine is allowed to query
    pub chains: Vec<ChainConfig>,

    /// History cache tuning
    pub cache: CacheConfig,

    /// Backoff applied to rate-limited or flaky explorer calls
    pub retry: RetrySettings,

    /// API server configuration
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Explorer API key (Etherscan-family keys work across their chains)
    pub api_key: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Largest `offset` the explorer accepts for a single page
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Request timeout in seconds for `eth_call`
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    /// Explorer API endpoint, e.g. `https://api.etherscan.io/api`
    pub explorer_url: String,
    /// JSON-RPC endpoint for read-only contract calls
    pub rpc_url: String,
    pub native_symbol: String,
    pub native_decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which a cached history is refreshed
    pub ttl_seconds: u64,

    /// Rows fetched per category = (offset + limit) * multiplier
    pub fetch_multiplier: usize,

    /// Lower bound for the per-category fetch window
    pub min_fetch_window: usize,

    /// Upper bound for the per-category fetch window
    pub max_fetch_window: usize,

    /// Largest page a caller may request
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub rate_limit_delays_ms: Vec<u64>,
    pub server_error_delays_ms: Vec<u64>,
    pub timeout_delays_ms: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API server host
    pub host: String,

    /// API server port
    pub port: u16,
}

fn chain(
    chain_id: u64,
    name: &str,
    explorer_url: &str,
    rpc_url: &str,
    native_symbol: &str,
) -> ChainConfig {
    ChainConfig {
        chain_id,
        name: name.to_string(),
        explorer_url: explorer_url.to_string(),
        rpc_url: rpc_url.to_string(),
        native_symbol: native_symbol.to_string(),
        native_decimals: 18,
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            explorer: ExplorerConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                request_timeout_seconds: 20,
                max_page_size: 10_000,
            },
            rpc: RpcConfig {
                request_timeout_seconds: 10,
            },
            chains: vec![
                chain(1, "ethereum", "https://api.etherscan.io/api", "https://eth.llamarpc.com", "ETH"),
                chain(
                    11155111,
                    "sepolia",
                    "https://api-sepolia.etherscan.io/api",
                    "https://rpc.sepolia.org",
                    "ETH",
                ),
                chain(10, "optimism", "https://api-optimistic.etherscan.io/api", "https://mainnet.optimism.io", "ETH"),
                chain(56, "bsc", "https://api.bscscan.com/api", "https://bsc-dataseed.binance.org", "BNB"),
                chain(100, "gnosis", "https://api.gnosisscan.io/api", "https://rpc.gnosischain.com", "XDAI"),
                chain(137, "polygon", "https://api.polygonscan.com/api", "https://polygon-rpc.com", "POL"),
                chain(8453, "base", "https://api.basescan.org/api", "https://mainnet.base.org", "ETH"),
                chain(42161, "arbitrum", "https://api.arbiscan.io/api", "https://arb1.arbitrum.io/rpc", "ETH"),
            ],
            cache: CacheConfig {
                ttl_seconds: 300,
                fetch_multiplier: 3,
                min_fetch_window: 100,
                max_fetch_window: 10_000,
                max_page_size: 100,
            },
            retry: RetrySettings {
                max_attempts: 3,
                rate_limit_delays_ms: vec![500, 1000, 2000],
                server_error_delays_ms: vec![300, 600, 1200],
                timeout_delays_ms: vec![500, 1000],
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
        }
    }
}

impl ExplorerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Explorer request timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_page_size == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Explorer max page size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        if self.fetch_multiplier == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Fetch multiplier must be at least 1".to_string(),
            ));
        }

        if self.min_fetch_window == 0 || self.min_fetch_window > self.max_fetch_window {
            return Err(ConfigurationError::InvalidValue(format!(
                "Fetch window bounds are inconsistent: min={} max={}",
                self.min_fetch_window, self.max_fetch_window
            )));
        }

        if self.max_page_size == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Max page size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("SAFE_HISTORY")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let system_config: SystemConfig = config_builder.build()?.try_deserialize()?;

        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.explorer.validate()?;
        self.cache.validate()?;

        // Windows are read as consecutive pages of this size, and the last
        // page must not run past the explorer's `page * offset` ceiling
        let page_size = self.explorer.max_page_size as usize;
        if page_size < self.cache.max_fetch_window && self.cache.max_fetch_window % page_size != 0 {
            return Err(ConfigurationError::InvalidValue(format!(
                "explorer.max_page_size ({}) must divide cache.max_fetch_window ({})",
                page_size, self.cache.max_fetch_window
            )));
        }

        if self.rpc.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "RPC request timeout must be greater than 0".to_string(),
            ));
        }

        if self.chains.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "At least one chain must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Duplicate chain id in configuration: {}",
                    chain.chain_id
                )));
            }
            if chain.explorer_url.is_empty() {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Chain {} has no explorer_url",
                    chain.chain_id
                )));
            }
        }

        if self.api.port == 0 {
            return Err(ConfigurationError::InvalidValue(
                "API port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up a configured chain
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn supported_chain_ids(&self) -> Vec<u64> {
        self.chains.iter().map(|c| c.chain_id).collect()
    }
}
