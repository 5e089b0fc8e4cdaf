//! Request retry with jitter.
//!
//! Two independent budgets:
//! - `RATE_LIMIT_REACHED` replies wait for the advertised `retryIn` window
//! - transport timeouts wait `delay_ms` plus up to one second of jitter

use std::time::Duration;

use rand::Rng;
use tracing::{info_span, warn, Instrument};

use crate::error::{TransloaditError, TransloaditResult};
use crate::metrics::record_retry;

/// Upper bound of the random component added to every retry delay.
const MAX_JITTER_MS: u64 = 1000;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after a `RATE_LIMIT_REACHED` reply.
    pub rate_limit_attempts: u32,
    /// Extra attempts after a transport timeout or connect failure.
    pub request_exception_attempts: u32,
    /// Fixed delay before a transport retry (in milliseconds).
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 3,
            request_exception_attempts: 0,
            delay_ms: 0,
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rate_limit_attempts: std::env::var("TRANSLOADIT_RETRY_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_attempts),
            request_exception_attempts: std::env::var("TRANSLOADIT_RETRY_REQUEST_EXCEPTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_exception_attempts),
            delay_ms: std::env::var("TRANSLOADIT_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.delay_ms),
        }
    }
}

/// Execute an async request with retry.
///
/// Retries on:
/// - `RateLimited`, up to `rate_limit_attempts` times
/// - network timeouts and connect errors, up to `request_exception_attempts` times
///
/// Everything else is returned on first failure.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    op: F,
) -> TransloaditResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = TransloaditResult<T>>,
{
    let mut rate_limit_retries = 0u32;
    let mut transport_retries = 0u32;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let span = info_span!("transloadit_request", operation = %operation, attempt);

        let err = match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = match &err {
            TransloaditError::RateLimited { retry_in_secs }
                if rate_limit_retries < config.rate_limit_attempts =>
            {
                rate_limit_retries += 1;
                calculate_delay(retry_in_secs.saturating_mul(1000))
            }
            TransloaditError::Network(_)
                if err.is_retryable() && transport_retries < config.request_exception_attempts =>
            {
                transport_retries += 1;
                calculate_delay(config.delay_ms)
            }
            _ => return Err(err),
        };

        warn!(
            operation = %operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Request failed, retrying: {}",
            err
        );
        record_retry(operation);

        tokio::time::sleep(delay).await;
    }
}

/// Base delay plus a random 0..1000 ms component.
fn calculate_delay(base_ms: u64) -> Duration {
    let jitter = rand::rng().random_range(0..MAX_JITTER_MS);
    Duration::from_millis(base_ms.saturating_add(jitter))
}
