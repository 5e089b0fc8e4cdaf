//! Structured logging for assembly operations.
//!
//! Log lines and spans carry the assembly id and the operation so one
//! assembly can be followed across its upload and event tasks.

use tl_models::AssemblyResponse;
use tracing::{error, info, Span};

/// Id logged before the service has assigned one.
const UNASSIGNED: &str = "unassigned";

/// Logger bound to one assembly and operation.
#[derive(Debug, Clone)]
pub struct AssemblyLogger {
    assembly_id: String,
    operation: &'static str,
}

impl AssemblyLogger {
    pub fn new(assembly_id: Option<&str>, operation: &'static str) -> Self {
        Self {
            assembly_id: assembly_id.unwrap_or(UNASSIGNED).to_string(),
            operation,
        }
    }

    /// Logger for the assembly a response describes.
    pub fn for_response(response: &AssemblyResponse, operation: &'static str) -> Self {
        Self::new(response.id(), operation)
    }

    pub fn log_start(&self, message: &str) {
        info!(assembly_id = %self.assembly_id, operation = self.operation, "Assembly {}: {}", self.operation, message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(assembly_id = %self.assembly_id, operation = self.operation, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(assembly_id = %self.assembly_id, operation = self.operation, "Assembly {} failed: {}", self.operation, message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(assembly_id = %self.assembly_id, operation = self.operation, "Assembly finished: {}", message);
    }

    /// Span for instrumenting a spawned task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("assembly", assembly_id = %self.assembly_id, operation = self.operation)
    }
}
