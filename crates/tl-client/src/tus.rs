//! Minimal tus 1.0.0 client.
//!
//! Supports the creation extension (`POST` with `Upload-Length`), offset
//! lookup (`HEAD`) and chunked `PATCH` uploads. Upload URLs are remembered
//! in a [`UrlStore`] keyed by fingerprint so interrupted uploads resume from
//! the server's offset instead of starting over.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{TransloaditError, TransloaditResult};

pub const TUS_VERSION: &str = "1.0.0";

/// Default size of a single `PATCH` request body (2 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Persists upload URLs between attempts.
pub trait UrlStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<String>;
    fn set(&self, fingerprint: &str, url: &str);
    fn remove(&self, fingerprint: &str);
}

/// Process-local [`UrlStore`].
#[derive(Debug, Default)]
pub struct MemoryUrlStore {
    urls: Mutex<HashMap<String, String>>,
}

impl MemoryUrlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UrlStore for MemoryUrlStore {
    fn get(&self, fingerprint: &str) -> Option<String> {
        self.urls.lock().ok()?.get(fingerprint).cloned()
    }

    fn set(&self, fingerprint: &str, url: &str) {
        if let Ok(mut urls) = self.urls.lock() {
            urls.insert(fingerprint.to_string(), url.to_string());
        }
    }

    fn remove(&self, fingerprint: &str) {
        if let Ok(mut urls) = self.urls.lock() {
            urls.remove(fingerprint);
        }
    }
}

/// Encode `Upload-Metadata`: comma separated `key base64(value)` pairs.
pub fn encode_metadata(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{} {}", key, STANDARD.encode(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// tus protocol operations against one creation endpoint.
#[derive(Debug, Clone)]
pub struct TusClient {
    http: Client,
    endpoint: Url,
}

impl TusClient {
    pub fn new(http: Client, endpoint: &str) -> TransloaditResult<Self> {
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create an upload of `size` bytes and return its URL.
    pub async fn create_upload(&self, size: u64, metadata: &[(&str, &str)]) -> TransloaditResult<Url> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Length", size.to_string())
            .header("Upload-Metadata", encode_metadata(metadata))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransloaditError::tus(format!(
                "unexpected status code ({}) while creating upload",
                status.as_u16()
            )));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransloaditError::tus("missing upload URL in creation response"))?;

        let url = self.endpoint.join(location)?;
        debug!(upload_url = %url, size, "Created tus upload");
        Ok(url)
    }

    /// Current offset of an existing upload.
    pub async fn get_offset(&self, upload_url: &Url) -> TransloaditResult<u64> {
        let response = self
            .http
            .request(Method::HEAD, upload_url.clone())
            .header("Tus-Resumable", TUS_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(TransloaditError::tus(format!("upload {} no longer exists", upload_url)));
        }
        if !status.is_success() {
            return Err(TransloaditError::tus(format!(
                "unexpected status code ({}) while resuming upload",
                status.as_u16()
            )));
        }

        upload_offset(response.headers())
    }

    /// Send one chunk at `offset`; returns the new offset reported by the server.
    pub async fn patch_chunk(&self, upload_url: &Url, offset: u64, chunk: Vec<u8>) -> TransloaditResult<u64> {
        let response = self
            .http
            .patch(upload_url.clone())
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Offset", offset.to_string())
            .header(CONTENT_TYPE, "application/offset+octet-stream")
            .body(chunk)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransloaditError::tus(format!(
                "unexpected status code ({}) while uploading chunk",
                status.as_u16()
            )));
        }

        upload_offset(response.headers())
    }
}

fn upload_offset(headers: &HeaderMap) -> TransloaditResult<u64> {
    headers
        .get("Upload-Offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| TransloaditError::tus("missing or invalid Upload-Offset header"))
}
