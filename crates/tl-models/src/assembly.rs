//! Assembly status and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::Response;

/// Assembly state, as reported in the `ok` field of a status response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssemblyStatus {
    /// Waiting for uploads
    Uploading,
    /// Uploads done, steps running
    Executing,
    /// All steps done
    Completed,
    /// Canceled by the owner
    Canceled,
    /// Aborted by the service
    Aborted,
    /// Any other code (e.g. `ASSEMBLY_REPLAYING`)
    Other(String),
}

impl AssemblyStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AssemblyStatus::Uploading => "ASSEMBLY_UPLOADING",
            AssemblyStatus::Executing => "ASSEMBLY_EXECUTING",
            AssemblyStatus::Completed => "ASSEMBLY_COMPLETED",
            AssemblyStatus::Canceled => "ASSEMBLY_CANCELED",
            AssemblyStatus::Aborted => "REQUEST_ABORTED",
            AssemblyStatus::Other(code) => code,
        }
    }

    /// Terminal states: no further status changes are expected.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            AssemblyStatus::Completed | AssemblyStatus::Canceled | AssemblyStatus::Aborted
        )
    }
}

impl From<String> for AssemblyStatus {
    fn from(code: String) -> Self {
        match code.as_str() {
            "ASSEMBLY_UPLOADING" => AssemblyStatus::Uploading,
            "ASSEMBLY_EXECUTING" => AssemblyStatus::Executing,
            "ASSEMBLY_COMPLETED" => AssemblyStatus::Completed,
            "ASSEMBLY_CANCELED" => AssemblyStatus::Canceled,
            "REQUEST_ABORTED" => AssemblyStatus::Aborted,
            _ => AssemblyStatus::Other(code),
        }
    }
}

impl From<&str> for AssemblyStatus {
    fn from(code: &str) -> Self {
        AssemblyStatus::from(code.to_string())
    }
}

impl From<AssemblyStatus> for String {
    fn from(status: AssemblyStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file produced by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub basename: String,
    pub ext: String,
    pub ssl_url: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub original_id: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

impl ResultFile {
    /// `basename.ext`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.basename, self.ext)
    }
}

/// Response describing a single assembly.
///
/// Assemblies created for resumable uploads report their id under `id` and
/// their status URL under `status_endpoint` in some API versions; both
/// shapes are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyResponse {
    inner: Response,
}

impl AssemblyResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn response(&self) -> &Response {
        &self.inner
    }

    pub fn json(&self) -> &Value {
        self.inner.json()
    }

    pub fn http_status(&self) -> u16 {
        self.inner.status()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.inner.get_str(key)
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("assembly_id").or_else(|| self.str_field("id"))
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("assembly_url")
            .or_else(|| self.str_field("status_endpoint"))
    }

    pub fn ssl_url(&self) -> Option<&str> {
        self.str_field("assembly_ssl_url")
            .or_else(|| self.str_field("status_endpoint"))
    }

    /// tus endpoint for resumable uploads.
    pub fn tus_url(&self) -> Option<&str> {
        self.str_field("tus_url")
    }

    /// Server-sent events endpoint.
    pub fn update_stream_url(&self) -> Option<&str> {
        self.str_field("update_stream_url")
    }

    pub fn status(&self) -> Option<AssemblyStatus> {
        self.inner.ok_code().map(AssemblyStatus::from)
    }

    pub fn error(&self) -> Option<&str> {
        self.inner.error_code()
    }

    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// Raw results of one step.
    pub fn step_result(&self, step: &str) -> Option<&Vec<Value>> {
        self.json()
            .get("results")
            .and_then(|results| results.get(step))
            .and_then(Value::as_array)
    }

    /// Typed results of one step. Entries that do not carry the result file
    /// fields are skipped.
    pub fn result_files(&self, step: &str) -> Vec<ResultFile> {
        self.step_result(step)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn status_is(&self, status: AssemblyStatus) -> bool {
        self.status().as_ref() == Some(&status)
    }

    pub fn is_completed(&self) -> bool {
        self.status_is(AssemblyStatus::Completed)
    }

    pub fn is_aborted(&self) -> bool {
        self.status_is(AssemblyStatus::Aborted)
    }

    pub fn is_canceled(&self) -> bool {
        self.status_is(AssemblyStatus::Canceled)
    }

    pub fn is_executing(&self) -> bool {
        self.status_is(AssemblyStatus::Executing)
    }

    pub fn is_uploading(&self) -> bool {
        self.status_is(AssemblyStatus::Uploading)
    }

    pub fn is_finished(&self) -> bool {
        self.status().map(|s| s.is_finished()).unwrap_or(false)
    }
}

impl From<Response> for AssemblyResponse {
    fn from(inner: Response) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed() -> AssemblyResponse {
        AssemblyResponse::new(Response::new(
            200,
            json!({
                "ok": "ASSEMBLY_COMPLETED",
                "assembly_id": "76fe5df1c93a0a530f3e583805cf98b4",
                "assembly_url": "http://api2.jane.transloadit.com/assemblies/76fe5df1c93a0a530f3e583805cf98b4",
                "assembly_ssl_url": "https://api2.jane.transloadit.com/assemblies/76fe5df1c93a0a530f3e583805cf98b4",
                "results": {
                    "resize": [
                        {"basename": "lol_cat", "ext": "png", "ssl_url": "https://tmp/lol_cat.png", "size": 1024},
                        {"basename": "mona_lisa", "ext": "png", "ssl_url": "https://tmp/mona_lisa.png"},
                        {"unexpected": true}
                    ]
                }
            }),
        ))
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(AssemblyStatus::from("ASSEMBLY_COMPLETED"), AssemblyStatus::Completed);
        assert_eq!(
            AssemblyStatus::from("ASSEMBLY_REPLAYING"),
            AssemblyStatus::Other("ASSEMBLY_REPLAYING".to_string())
        );
        assert!(AssemblyStatus::Aborted.is_finished());
        assert!(!AssemblyStatus::Executing.is_finished());
        assert_eq!(AssemblyStatus::Aborted.to_string(), "REQUEST_ABORTED");
    }

    #[test]
    fn test_accessors() {
        let response = completed();
        assert_eq!(response.id(), Some("76fe5df1c93a0a530f3e583805cf98b4"));
        assert_eq!(
            response.ssl_url(),
            Some("https://api2.jane.transloadit.com/assemblies/76fe5df1c93a0a530f3e583805cf98b4")
        );
        assert!(response.is_completed());
        assert!(response.is_finished());
        assert!(!response.has_error());
    }

    #[test]
    fn test_tus_shape() {
        let response = AssemblyResponse::new(Response::new(
            200,
            json!({"id": "abc", "status_endpoint": "https://api2/assemblies/abc", "ok": "ASSEMBLY_UPLOADING"}),
        ));
        assert_eq!(response.id(), Some("abc"));
        assert_eq!(response.ssl_url(), Some("https://api2/assemblies/abc"));
        assert!(response.is_uploading());
        assert!(!response.is_finished());
    }

    #[test]
    fn test_result_files_skip_malformed() {
        let files = completed().result_files("resize");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name(), "lol_cat.png");
        assert_eq!(files[0].size, Some(1024));
        assert!(completed().result_files("missing").is_empty());
    }
}
