use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Classification of errors for retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableError {
    /// Explorer throttling (HTTP 429 or a rate-limit body) - longest delays
    RateLimit,
    /// 5xx from the upstream
    ServerError,
    /// Request timed out
    Timeout,
    /// Anything else - fail immediately
    Other,
}

impl RetryableError {
    pub fn is_retryable(self) -> bool {
        self != RetryableError::Other
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including initial attempt)
    pub max_attempts: u32,
    pub rate_limit_delays_ms: Vec<u64>,
    pub server_error_delays_ms: Vec<u64>,
    pub timeout_delays_ms: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_delays_ms: vec![500, 1000, 2000],
            server_error_delays_ms: vec![300, 600, 1200],
            timeout_delays_ms: vec![500, 1000],
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            rate_limit_delays_ms: Vec::new(),
            server_error_delays_ms: Vec::new(),
            timeout_delays_ms: Vec::new(),
        }
    }

    /// Delay before retry number `attempt` (0-indexed). Past the end of the
    /// configured schedule the last delay is reused.
    pub fn delay_for(&self, attempt: u32, error_type: RetryableError) -> Option<Duration> {
        let delays = match error_type {
            RetryableError::RateLimit => &self.rate_limit_delays_ms,
            RetryableError::ServerError => &self.server_error_delays_ms,
            RetryableError::Timeout => &self.timeout_delays_ms,
            RetryableError::Other => return None,
        };

        delays
            .get(attempt as usize)
            .or_else(|| delays.last())
            .map(|&delay_ms| Duration::from_millis(delay_ms))
    }
}

/// The final error of a retried operation together with how many times it ran.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub error: E,
    pub attempts: u32,
    pub last_class: RetryableError,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

/// Run `operation` until it succeeds, the error is classified as
/// non-retryable, or `config.max_attempts` retries have been spent.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    classify_error: impl Fn(&E) -> RetryableError,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("✅ Operation succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        let error_type = classify_error(&error);
        let exhausted = |error| RetryExhausted {
            error,
            attempts: attempt + 1,
            last_class: error_type,
        };

        if !error_type.is_retryable() || attempt >= config.max_attempts {
            return Err(exhausted(error));
        }

        let Some(delay) = config.delay_for(attempt, error_type) else {
            return Err(exhausted(error));
        };

        warn!(
            "⚠️ Attempt {}/{} failed ({:?}): {} - retrying in {}ms",
            attempt + 1,
            config.max_attempts + 1,
            error_type,
            error,
            delay.as_millis()
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
