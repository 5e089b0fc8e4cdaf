//! Request and Smart CDN signing.
//!
//! Every API call carries a `params` JSON document with an `auth` block and,
//! when signing is enabled, a `signature` of that exact document:
//! `sha384:` followed by the hex HMAC-SHA384 of the params under the secret.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::{Sha256, Sha384};

use crate::error::{TransloaditError, TransloaditResult};

type HmacSha384 = Hmac<Sha384>;
type HmacSha256 = Hmac<Sha256>;

/// Signs params documents on behalf of the client.
///
/// Implementations return the complete signature string including the
/// algorithm prefix (e.g. `sha384:...`). Useful when the secret lives in a
/// separate signing service.
pub trait SignatureProvider: Send + Sync {
    fn generate_signature(
        &self,
        params_json: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> SignatureProvider for F
where
    F: Fn(&str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> + Send + Sync,
{
    fn generate_signature(
        &self,
        params_json: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self(params_json)
    }
}

/// Signed form of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub params: String,
    pub signature: Option<String>,
}

impl Payload {
    /// Key/value pairs as sent in a query string or form body.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("params".to_string(), self.params.clone())];
        if let Some(signature) = &self.signature {
            pairs.push(("signature".to_string(), signature.clone()));
        }
        pairs
    }
}

/// Format of the `auth.expires` field.
pub fn format_expires(at: DateTime<Utc>) -> String {
    at.format("%Y/%m/%d %H:%M:%S+00:00").to_string()
}

/// Build the `params` document: caller data plus `auth` and `nonce`.
pub fn build_params(data: &Map<String, Value>, key: &str, now: DateTime<Utc>, ttl: Duration) -> Map<String, Value> {
    let expires = now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
    let mut params = data.clone();
    params.insert(
        "auth".to_string(),
        json!({ "key": key, "expires": format_expires(expires) }),
    );
    params.insert(
        "nonce".to_string(),
        Value::String(uuid::Uuid::new_v4().simple().to_string()),
    );
    params
}

/// `sha384:` + hex HMAC of the params document.
pub fn sign_params(secret: &str, params_json: &str) -> TransloaditResult<String> {
    let mut mac = HmacSha384::new_from_slice(secret.as_bytes())
        .map_err(|e| TransloaditError::Signature(format!("Invalid HMAC key: {}", e)))?;
    mac.update(params_json.as_bytes());
    Ok(format!("sha384:{}", to_hex(&mac.finalize().into_bytes())))
}

/// Produce the signature with a provider, wrapping its failures.
pub fn sign_with_provider(
    provider: &dyn SignatureProvider,
    params_json: &str,
) -> TransloaditResult<String> {
    provider.generate_signature(params_json).map_err(|e| {
        tracing::warn!(error = %e, "Signature provider failed");
        TransloaditError::local("Failed to generate signature using provider.")
    })
}

/// Default lifetime of a Smart CDN URL (1 hour).
pub const DEFAULT_SMART_CDN_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Build a signed Smart CDN URL.
///
/// The query is sorted by key and includes `auth_key` and `exp` (expiry as
/// Unix milliseconds). The signed string is `workspace/template/input?query`.
pub fn smart_cdn_url(
    key: &str,
    secret: &str,
    workspace: &str,
    template: &str,
    input: &str,
    url_params: &BTreeMap<String, String>,
    expires_at_ms: i64,
) -> TransloaditResult<String> {
    let workspace_slug = urlencoding::encode(workspace);
    let template_slug = urlencoding::encode(template);
    let input_field = urlencoding::encode(input);

    let mut params = url_params.clone();
    params.insert("auth_key".to_string(), key.to_string());
    params.insert("exp".to_string(), expires_at_ms.to_string());

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let string_to_sign = format!("{}/{}/{}?{}", workspace_slug, template_slug, input_field, query);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TransloaditError::Signature(format!("Failed to create signature: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    let signature = to_hex(&mac.finalize().into_bytes());

    Ok(format!(
        "https://{}.tlcdn.com/{}/{}?{}&sig=sha256:{}",
        workspace_slug, template_slug, input_field, query, signature
    ))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sign_params_known_vector() {
        let signature = sign_params("secret", r#"{"a":1}"#).unwrap();
        assert_eq!(
            signature,
            "sha384:29123e3a0378b334f11ff95d2d5af390b6e3563b1ff7d2fc362df61ecf0d245a9d7f95986a4cdf81b4ee64e5be7a6c91"
        );
    }

    #[test]
    fn test_format_expires() {
        let at = Utc.with_ymd_and_hms(2017, 11, 21, 1, 1, 20).unwrap();
        assert_eq!(format_expires(at), "2017/11/21 01:01:20+00:00");
    }

    #[test]
    fn test_build_params_adds_auth_and_nonce() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut data = Map::new();
        data.insert("template_id".to_string(), json!("123"));

        let params = build_params(&data, "KEY", now, Duration::from_secs(300));
        assert_eq!(params["template_id"], json!("123"));
        assert_eq!(params["auth"]["key"], json!("KEY"));
        assert_eq!(params["auth"]["expires"], json!("2024/01/01 00:05:00+00:00"));
        assert_eq!(params["nonce"].as_str().map(str::len), Some(32));
    }

    #[test]
    fn test_provider_failure_is_wrapped() {
        let provider = |_: &str| -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("backend unavailable".into())
        };
        let err = sign_with_provider(&provider, "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Local operation failed: Failed to generate signature using provider."
        );
    }

    #[test]
    fn test_smart_cdn_url() {
        let mut params = BTreeMap::new();
        params.insert("foo".to_string(), "bar".to_string());
        params.insert("aaa".to_string(), "42".to_string());

        let url = smart_cdn_url(
            "foo_key",
            "foo_secret",
            "foo_workspace",
            "foo_template",
            "foo/input",
            &params,
            1732550672867,
        )
        .unwrap();

        assert_eq!(
            url,
            "https://foo_workspace.tlcdn.com/foo_template/foo%2Finput?aaa=42&auth_key=foo_key\
             &exp=1732550672867&foo=bar\
             &sig=sha256:32d557632b0b6277e2678a13d16b8d585163e3efa5b29db7eb35f3efed9928aa"
        );
    }
}
