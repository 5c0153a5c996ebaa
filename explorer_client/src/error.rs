use retry_utils::RetryableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("No explorer configured for chain {chain_id}")]
    UnsupportedChain { chain_id: u64 },
}

impl ExplorerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExplorerError::RateLimited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExplorerError::Http(e) if e.is_timeout())
    }

    /// How the category fetch loop should treat this failure.
    pub fn retry_class(&self) -> RetryableError {
        match self {
            ExplorerError::RateLimited { .. } => RetryableError::RateLimit,
            ExplorerError::Status { status, .. } if *status >= 500 => RetryableError::ServerError,
            ExplorerError::Http(e) if e.is_timeout() => RetryableError::Timeout,
            ExplorerError::Http(e) if e.is_connect() => RetryableError::ServerError,
            _ => RetryableError::Other,
        }
    }
}
