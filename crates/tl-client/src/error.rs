//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type TransloaditResult<T> = Result<T, TransloaditError>;

/// Errors that can occur while talking to the API.
#[derive(Debug, Error)]
pub enum TransloaditError {
    /// Something failed locally, before or around an HTTP call.
    #[error("Local operation failed: {0}")]
    LocalOperation(String),

    /// The API accepted the request but reported a failure.
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("API returned {status}: {error}{}", message.as_deref().map(|m| format!(" ({})", m)).unwrap_or_default())]
    Api {
        status: u16,
        error: String,
        message: Option<String>,
    },

    #[error("Rate limited, retry in {retry_in_secs}s")]
    RateLimited { retry_in_secs: u64 },

    /// A status refresh produced no assembly response.
    #[error("Empty assembly response: {0}")]
    EmptyResponse(String),

    #[error("Invalid assembly id: {0}")]
    InvalidAssemblyId(String),

    #[error("Upload failed: {0}")]
    Tus(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl TransloaditError {
    pub fn local(msg: impl Into<String>) -> Self {
        Self::LocalOperation(msg.into())
    }

    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn tus(msg: impl Into<String>) -> Self {
        Self::Tus(msg.into())
    }

    pub fn empty_response(msg: impl Into<String>) -> Self {
        Self::EmptyResponse(msg.into())
    }

    /// Transport failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransloaditError::Network(e) => e.is_timeout() || e.is_connect(),
            TransloaditError::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Errors raised without the API having rejected anything.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            TransloaditError::LocalOperation(_)
                | TransloaditError::Signature(_)
                | TransloaditError::InvalidAssemblyId(_)
                | TransloaditError::Io(_)
                | TransloaditError::Url(_)
        )
    }
}
