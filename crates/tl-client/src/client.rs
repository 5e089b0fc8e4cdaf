//! The API client.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::{Map, Value};
use tl_models::{AssemblyResponse, ListResponse, Response};
use tracing::debug;

use crate::assembly::Assembly;
use crate::config::ClientConfig;
use crate::error::{TransloaditError, TransloaditResult};
use crate::request::Request;
use crate::signature::{smart_cdn_url, SignatureProvider, DEFAULT_SMART_CDN_EXPIRY};
use crate::template::Template;

/// Entry point for all API operations.
///
/// Cheap to clone: clones share the HTTP connection pool.
#[derive(Clone)]
pub struct Transloadit {
    pub(crate) http: Client,
    pub(crate) config: ClientConfig,
    pub(crate) signature_provider: Option<Arc<dyn SignatureProvider>>,
    pub(crate) should_sign_request: bool,
}

impl fmt::Debug for Transloadit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transloadit")
            .field("key", &self.config.key)
            .field("host_url", &self.config.host_url)
            .field("signature_provider", &self.signature_provider.is_some())
            .field("should_sign_request", &self.should_sign_request)
            .finish()
    }
}

impl Transloadit {
    /// Client for the default host with request signing enabled.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(key, secret))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("tl-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            http,
            should_sign_request: config.secret.is_some(),
            config,
            signature_provider: None,
        }
    }

    /// Client without a secret; signatures come from `provider`.
    pub fn with_signature_provider(
        key: impl Into<String>,
        provider: impl SignatureProvider + 'static,
    ) -> Self {
        let mut config = ClientConfig::new(key, String::new());
        config.secret = None;

        let mut client = Self::with_config(config);
        client.set_signature_provider(Arc::new(provider));
        client
    }

    /// Client configured from `TRANSLOADIT_*` environment variables.
    pub fn from_env() -> TransloaditResult<Self> {
        Ok(Self::with_config(ClientConfig::from_env()?))
    }

    pub fn with_host(mut self, host_url: impl Into<String>) -> Self {
        self.config = self.config.with_host(host_url);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn host_url(&self) -> &str {
        &self.config.host_url
    }

    /// Value of the `Transloadit-Client` header.
    pub(crate) fn version_info(&self) -> String {
        format!("rust-sdk:{}", env!("CARGO_PKG_VERSION"))
    }

    /// Turn request signing on or off.
    ///
    /// Enabling requires a secret or a signature provider.
    pub fn set_request_signing(&mut self, enabled: bool) -> TransloaditResult<()> {
        if enabled && self.config.secret.is_none() && self.signature_provider.is_none() {
            return Err(TransloaditError::local(
                "Cannot enable request signing without a secret or signature provider.",
            ));
        }
        self.should_sign_request = enabled;
        Ok(())
    }

    pub fn is_request_signing(&self) -> bool {
        self.should_sign_request
    }

    /// Sign requests with `provider` instead of the local secret.
    pub fn set_signature_provider(&mut self, provider: Arc<dyn SignatureProvider>) {
        self.signature_provider = Some(provider);
        self.should_sign_request = true;
    }

    pub fn clear_signature_provider(&mut self) {
        self.signature_provider = None;
        self.should_sign_request = self.config.secret.is_some();
    }

    /// Retries after a `RATE_LIMIT_REACHED` reply (default 3).
    pub fn set_retry_attempts_rate_limit(&mut self, attempts: u32) {
        self.config.retry.rate_limit_attempts = attempts;
    }

    /// Retries after a transport timeout (default 0).
    pub fn set_retry_attempts_request_exception(&mut self, attempts: u32) {
        self.config.retry.request_exception_attempts = attempts;
    }

    /// Base delay before a transport retry, in milliseconds (default 0).
    pub fn set_retry_delay(&mut self, delay_ms: u64) {
        self.config.retry.delay_ms = delay_ms;
    }

    pub fn new_assembly(&self) -> Assembly {
        Assembly::new(self.clone())
    }

    pub async fn get_assembly(&self, id: &str) -> TransloaditResult<AssemblyResponse> {
        let response = Request::new(self)
            .get(&format!("/assemblies/{}", id), &Map::new())
            .await?;
        Ok(response.into())
    }

    /// Fetch an assembly's status from its (ssl) url.
    pub async fn get_assembly_by_url(&self, url: &str) -> TransloaditResult<AssemblyResponse> {
        let response = Request::new(self).get(url, &Map::new()).await?;
        Ok(response.into())
    }

    pub async fn cancel_assembly(&self, url: &str) -> TransloaditResult<AssemblyResponse> {
        debug!(url = %url, "Cancelling assembly");
        let response = Request::new(self).delete(url, &Map::new()).await?;
        Ok(response.into())
    }

    /// List assemblies; `options` may carry `page`, `pagesize`, `type`, ...
    pub async fn list_assemblies(&self, options: &Map<String, Value>) -> TransloaditResult<ListResponse> {
        let response = Request::new(self).get("/assemblies", options).await?;
        Ok(response.into())
    }

    pub fn new_template(&self, name: impl Into<String>) -> Template {
        Template::new(self.clone(), name)
    }

    pub async fn get_template(&self, id: &str) -> TransloaditResult<Response> {
        Request::new(self)
            .get(&format!("/templates/{}", id), &Map::new())
            .await
    }

    pub async fn update_template(&self, id: &str, options: &Map<String, Value>) -> TransloaditResult<Response> {
        Request::new(self)
            .put(&format!("/templates/{}", id), options)
            .await
    }

    pub async fn delete_template(&self, id: &str) -> TransloaditResult<Response> {
        Request::new(self)
            .delete(&format!("/templates/{}", id), &Map::new())
            .await
    }

    pub async fn list_templates(&self, options: &Map<String, Value>) -> TransloaditResult<ListResponse> {
        let response = Request::new(self).get("/templates", options).await?;
        Ok(response.into())
    }

    /// Monthly bill, e.g. `get_bill(3, 2024)` fetches `/bill/2024-03`.
    pub async fn get_bill(&self, month: u32, year: i32) -> TransloaditResult<Response> {
        if !(1..=12).contains(&month) {
            return Err(TransloaditError::local(format!("Invalid month: {}", month)));
        }
        Request::new(self)
            .get(&format!("/bill/{}-{:02}", year, month), &Map::new())
            .await
    }

    /// Signed Smart CDN URL, valid for `expires_in` (default one hour).
    pub fn signed_smart_cdn_url(
        &self,
        workspace: &str,
        template: &str,
        input: &str,
        url_params: &BTreeMap<String, String>,
        expires_in: Option<Duration>,
    ) -> TransloaditResult<String> {
        let secret = self
            .config
            .secret
            .as_deref()
            .ok_or_else(|| TransloaditError::local("Smart CDN URLs require a secret"))?;

        let expires_in = expires_in.unwrap_or(DEFAULT_SMART_CDN_EXPIRY);
        let expires_at_ms = Utc::now().timestamp_millis() + expires_in.as_millis() as i64;

        smart_cdn_url(
            &self.config.key,
            secret,
            workspace,
            template,
            input,
            url_params,
            expires_at_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_defaults() {
        let client = Transloadit::new("key", "secret");
        assert!(client.is_request_signing());
        assert_eq!(client.host_url(), "https://api2.transloadit.com");
    }

    #[test]
    fn test_enable_signing_without_secret_fails() {
        let mut config = ClientConfig::new("key", "secret");
        config.secret = None;
        let mut client = Transloadit::with_config(config);

        assert!(!client.is_request_signing());
        assert!(client.set_request_signing(true).is_err());
        assert!(client.set_request_signing(false).is_ok());
    }

    #[test]
    fn test_provider_enables_signing() {
        let client = Transloadit::with_signature_provider(
            "key",
            |_: &str| -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
                Ok("sha384:abc".to_string())
            },
        );
        assert!(client.is_request_signing());
        assert!(client.config().secret.is_none());
    }

    #[test]
    fn test_retry_setters() {
        let mut client = Transloadit::new("key", "secret");
        client.set_retry_attempts_rate_limit(5);
        client.set_retry_attempts_request_exception(2);
        client.set_retry_delay(150);

        let retry = &client.config().retry;
        assert_eq!(retry.rate_limit_attempts, 5);
        assert_eq!(retry.request_exception_attempts, 2);
        assert_eq!(retry.delay_ms, 150);
    }

    #[test]
    fn test_smart_cdn_url_shape() {
        let client = Transloadit::new("foo_key", "foo_secret");
        let url = client
            .signed_smart_cdn_url("ws", "tpl", "in.jpg", &BTreeMap::new(), None)
            .unwrap();
        assert!(url.starts_with("https://ws.tlcdn.com/tpl/in.jpg?auth_key=foo_key&exp="));
        assert!(url.contains("&sig=sha256:"));
    }

    #[test]
    fn test_smart_cdn_requires_secret() {
        let client = Transloadit::with_signature_provider(
            "key",
            |_: &str| -> Result<String, Box<dyn std::error::Error + Send + Sync>> { Ok(String::new()) },
        );
        assert!(client
            .signed_smart_cdn_url("ws", "tpl", "in", &BTreeMap::new(), None)
            .is_err());
    }

    #[tokio::test]
    async fn test_get_bill_rejects_invalid_month() {
        let client = Transloadit::new("key", "secret");
        assert!(client.get_bill(13, 2024).await.is_err());
    }
}
