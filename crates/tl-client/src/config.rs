//! Client configuration.

use std::time::Duration;

use crate::error::{TransloaditError, TransloaditResult};
use crate::retry::RetryConfig;

/// Default API host.
pub const DEFAULT_HOST_URL: &str = "https://api2.transloadit.com";

/// Default lifetime of a request signature (5 minutes).
pub const DEFAULT_SIGNATURE_TTL_SECS: u64 = 5 * 60;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Auth key
    pub key: String,
    /// Auth secret; requests are unsigned when absent and no provider is set
    pub secret: Option<String>,
    /// API host, without trailing slash
    pub host_url: String,
    /// How long a signed request stays valid
    pub signature_ttl: Duration,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Consecutive SSE connection failures tolerated before reporting an error
    pub sse_max_reconnects: u32,
}

impl ClientConfig {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: Some(secret.into()),
            host_url: DEFAULT_HOST_URL.to_string(),
            signature_ttl: Duration::from_secs(DEFAULT_SIGNATURE_TTL_SECS),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            sse_max_reconnects: 5,
        }
    }

    pub fn with_host(mut self, host_url: impl Into<String>) -> Self {
        self.host_url = host_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_signature_ttl(mut self, ttl: Duration) -> Self {
        self.signature_ttl = ttl;
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> TransloaditResult<Self> {
        let key = std::env::var("TRANSLOADIT_KEY")
            .map_err(|_| TransloaditError::local("TRANSLOADIT_KEY must be set"))?;

        if key.is_empty() {
            return Err(TransloaditError::local("TRANSLOADIT_KEY cannot be empty"));
        }

        let secret = std::env::var("TRANSLOADIT_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Self {
            key,
            secret,
            host_url: std::env::var("TRANSLOADIT_HOST")
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_HOST_URL.to_string()),
            signature_ttl: Duration::from_secs(
                std::env::var("TRANSLOADIT_SIGNATURE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SIGNATURE_TTL_SECS),
            ),
            timeout: Duration::from_secs(
                std::env::var("TRANSLOADIT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::from_env(),
            sse_max_reconnects: std::env::var("TRANSLOADIT_SSE_MAX_RECONNECTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        })
    }
}
