//! Assembly lifecycle callbacks.

use serde_json::Value;
use tl_models::AssemblyResponse;

use crate::error::TransloaditError;

/// Receives assembly and upload events.
///
/// Every method has an empty default so implementors only override what they
/// care about. Callbacks run on the client's tokio tasks and must not block.
pub trait AssemblyListener: Send + Sync {
    /// The assembly reached a finished state; `response` is its final status.
    fn on_assembly_finished(&self, _response: &AssemblyResponse) {}

    /// Uploading, the event stream or the final status refresh failed.
    fn on_error(&self, _error: &TransloaditError) {}

    fn on_metadata_extracted(&self) {}

    /// All inputs of the assembly have been received.
    fn on_assembly_upload_finished(&self) {}

    /// One input was received; `upload` describes it.
    fn on_file_upload_finished(&self, _upload: &Value) {}

    fn on_file_upload_paused(&self, _name: &str) {}

    fn on_file_upload_resumed(&self, _name: &str) {}

    /// Cumulative bytes sent across all uploads of the assembly.
    fn on_file_upload_progress(&self, _uploaded_bytes: u64, _total_bytes: u64) {}

    /// Per-input execution progress.
    fn on_assembly_progress(&self, _progress: &Value) {}

    /// A step produced a result: `[step_name, result]`.
    fn on_assembly_result_finished(&self, _result: &Value) {}
}
