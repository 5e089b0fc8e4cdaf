//! Listener that reports assembly events as console lines.

use std::io::Write;
use std::sync::Mutex;

use serde_json::Value;
use tl_client::{AssemblyListener, AssemblyResponse, ResultFile, TransloaditError};

/// Writes one line per event to `out`.
pub struct ConsoleListener<W> {
    step: String,
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleListener<W> {
    /// Report results of `step` when the assembly finishes.
    pub fn new(step: impl Into<String>, out: W) -> Self {
        Self {
            step: step.into(),
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn line(&self, text: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", text) {
            tracing::warn!(error = %e, "Failed to write listener output");
        }
    }
}

pub fn result_line(file: &ResultFile) -> String {
    format!("{}: {}", file.file_name(), file.ssl_url)
}

pub fn progress_line(uploaded: u64, total: u64) -> String {
    format!("Uploaded {}/{} bytes", uploaded, total)
}

impl<W: Write + Send> AssemblyListener for ConsoleListener<W> {
    fn on_assembly_finished(&self, response: &AssemblyResponse) {
        self.line("Download Results");
        for file in response.result_files(&self.step) {
            self.line(&result_line(&file));
        }
    }

    fn on_error(&self, error: &TransloaditError) {
        self.line("Assembly failed!");
        self.line(&error.to_string());
    }

    fn on_metadata_extracted(&self) {
        self.line("Metadata extracted");
    }

    fn on_assembly_upload_finished(&self) {
        self.line("Assembly uploaded, executing ...");
    }

    fn on_file_upload_finished(&self, upload: &Value) {
        let name = upload.get("name").and_then(Value::as_str).unwrap_or("unknown");
        self.line(&format!("File {} has been uploaded successfully", name));
    }

    fn on_file_upload_paused(&self, name: &str) {
        self.line(&format!("{} paused", name));
    }

    fn on_file_upload_resumed(&self, name: &str) {
        self.line(&format!("{} resumed", name));
    }

    fn on_file_upload_progress(&self, uploaded_bytes: u64, total_bytes: u64) {
        self.line(&progress_line(uploaded_bytes, total_bytes));
    }

    fn on_assembly_progress(&self, progress: &Value) {
        self.line(&format!("Assembly progress: {}", progress));
    }

    fn on_assembly_result_finished(&self, result: &Value) {
        let step = result.get(0).and_then(Value::as_str).unwrap_or("unknown");
        let file = result.get(1);
        let field = |key: &str| {
            file.and_then(|f| f.get(key))
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string()
        };
        self.line(&format!(
            "Step Result available: StepName: {} File: {}.{}",
            step,
            field("basename"),
            field("ext")
        ));
    }
}
