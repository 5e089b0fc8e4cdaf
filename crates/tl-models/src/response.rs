//! Generic API responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON response from the API together with its HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    status: u16,
    body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Parse a raw response body. An empty body becomes an empty object.
    pub fn from_text(status: u16, text: &str) -> Result<Self, serde_json::Error> {
        let body = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(text)?
        };
        Ok(Self::new(status, body))
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// JSON body.
    pub fn json(&self) -> &Value {
        &self.body
    }

    pub fn into_json(self) -> Value {
        self.body
    }

    /// String field of the top-level object.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// The `ok` code reported by the API, e.g. `TEMPLATE_FOUND`.
    pub fn ok_code(&self) -> Option<&str> {
        self.get_str("ok")
    }

    /// The `error` code reported by the API, e.g. `RATE_LIMIT_REACHED`.
    pub fn error_code(&self) -> Option<&str> {
        self.get_str("error")
    }
}

/// A paginated list of assemblies or templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponse {
    inner: Response,
}

impl ListResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    /// Items on the current page.
    pub fn items(&self) -> &[Value] {
        self.inner
            .json()
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of items reported by the API.
    pub fn size(&self) -> u64 {
        self.inner
            .json()
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub fn response(&self) -> &Response {
        &self.inner
    }
}

impl From<Response> for ListResponse {
    fn from(inner: Response) -> Self {
        Self::new(inner)
    }
}
