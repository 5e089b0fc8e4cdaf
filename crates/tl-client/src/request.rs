//! Signed HTTP requests against the API.
//!
//! GET requests carry the payload in the query string; POST, PUT and DELETE
//! send it as form fields. POSTs with files are sent as multipart forms.

use std::time::Instant;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{Map, Value};
use tl_models::Response;
use tracing::debug;

use crate::client::Transloadit;
use crate::error::{TransloaditError, TransloaditResult};
use crate::metrics::record_request;
use crate::retry::with_retry;
use crate::signature::{build_params, sign_params, sign_with_provider, Payload};
use crate::upload::UploadFile;

/// Fallback wait when a rate-limit reply carries no `info.retryIn`.
const DEFAULT_RATE_LIMIT_RETRY_SECS: u64 = 60;

/// One logical API call, re-signed on every attempt.
pub(crate) struct Request<'a> {
    client: &'a Transloadit,
}

impl<'a> Request<'a> {
    pub(crate) fn new(client: &'a Transloadit) -> Self {
        Self { client }
    }

    pub(crate) async fn get(&self, url: &str, data: &Map<String, Value>) -> TransloaditResult<Response> {
        self.send(Method::GET, url, data, &[], &[]).await
    }

    pub(crate) async fn post(
        &self,
        url: &str,
        data: &Map<String, Value>,
        extra: &[(String, String)],
        files: &[UploadFile],
    ) -> TransloaditResult<Response> {
        self.send(Method::POST, url, data, extra, files).await
    }

    pub(crate) async fn put(&self, url: &str, data: &Map<String, Value>) -> TransloaditResult<Response> {
        self.send(Method::PUT, url, data, &[], &[]).await
    }

    pub(crate) async fn delete(&self, url: &str, data: &Map<String, Value>) -> TransloaditResult<Response> {
        self.send(Method::DELETE, url, data, &[], &[]).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        data: &Map<String, Value>,
        extra: &[(String, String)],
        files: &[UploadFile],
    ) -> TransloaditResult<Response> {
        let full_url = self.full_url(url);
        let operation = format!("{} {}", method, operation_path(url));

        with_retry(&self.client.config.retry, &operation, || {
            self.attempt(method.clone(), &full_url, &operation, data, extra, files)
        })
        .await
    }

    async fn attempt(
        &self,
        method: Method,
        full_url: &str,
        operation: &str,
        data: &Map<String, Value>,
        extra: &[(String, String)],
        files: &[UploadFile],
    ) -> TransloaditResult<Response> {
        let mut fields = self.to_payload(data)?.to_pairs();
        fields.extend(extra.iter().cloned());

        let mut builder = self
            .client
            .http
            .request(method.clone(), full_url)
            .header("Transloadit-Client", self.client.version_info());

        builder = if method == Method::GET {
            builder.query(&fields)
        } else if files.is_empty() {
            builder.form(&fields)
        } else {
            builder.multipart(multipart_form(fields, files).await?)
        };

        debug!(method = %method, url = %full_url, files = files.len(), "Sending API request");

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        record_request(operation, status, started.elapsed().as_secs_f64() * 1000.0);

        check_response(Response::from_text(status, &text)?)
    }

    /// Relative paths are resolved against the host; absolute URLs pass through.
    pub(crate) fn full_url(&self, url: &str) -> String {
        if url.starts_with("https://") || url.starts_with("http://") {
            url.to_string()
        } else {
            format!("{}{}", self.client.config.host_url, url)
        }
    }

    /// Sign `data` into the `params`/`signature` pair.
    pub(crate) fn to_payload(&self, data: &Map<String, Value>) -> TransloaditResult<Payload> {
        let config = &self.client.config;
        let params = build_params(data, &config.key, Utc::now(), config.signature_ttl);
        let params = serde_json::to_string(&params)?;

        let signature = if !self.client.should_sign_request {
            None
        } else if let Some(provider) = &self.client.signature_provider {
            Some(sign_with_provider(provider.as_ref(), &params)?)
        } else if let Some(secret) = &config.secret {
            Some(sign_params(secret, &params)?)
        } else {
            None
        };

        Ok(Payload { params, signature })
    }
}

/// Map error replies onto errors; everything else is returned as is.
fn check_response(response: Response) -> TransloaditResult<Response> {
    if response.error_code() == Some("RATE_LIMIT_REACHED") {
        let retry_in_secs = response
            .json()
            .pointer("/info/retryIn")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_RATE_LIMIT_RETRY_SECS);
        return Err(TransloaditError::RateLimited { retry_in_secs });
    }

    if response.status() >= 400 {
        return Err(TransloaditError::Api {
            status: response.status(),
            error: response.error_code().unwrap_or("HTTP_ERROR").to_string(),
            message: response.get_str("message").map(str::to_string),
        });
    }

    Ok(response)
}

async fn multipart_form(fields: Vec<(String, String)>, files: &[UploadFile]) -> TransloaditResult<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let bytes = file.source.read_all().await?;
        let part = Part::bytes(bytes).file_name(file.file_name());
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

/// Path used as a metric label; ids and hosts are dropped to bound cardinality.
fn operation_path(url: &str) -> &'static str {
    if url.contains("/assemblies") {
        "assemblies"
    } else if url.contains("/templates") {
        "templates"
    } else if url.contains("/bill") {
        "bill"
    } else {
        "other"
    }
}
