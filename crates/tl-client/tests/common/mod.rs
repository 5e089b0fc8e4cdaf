//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use tl_client::{AssemblyListener, AssemblyResponse, Transloadit, TransloaditError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ASSEMBLY_ID: &str = "0123456789abcdef0123456789abcdef";

pub fn client(server: &MockServer) -> Transloadit {
    Transloadit::new("test_key", "test_secret").with_host(server.uri())
}

pub fn assembly_path() -> String {
    format!("/assemblies/{}", ASSEMBLY_ID)
}

pub fn ssl_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), assembly_path())
}

pub fn stream_path() -> String {
    format!("/ws/{}", ASSEMBLY_ID)
}

/// Body of a freshly created assembly with all follow-up URLs on `server`.
pub fn created_body(server: &MockServer, ok: &str) -> Value {
    json!({
        "ok": ok,
        "assembly_id": ASSEMBLY_ID,
        "assembly_ssl_url": ssl_url(server),
        "tus_url": format!("{}/resumable/files/", server.uri()),
        "update_stream_url": format!("{}{}", server.uri(), stream_path()),
    })
}

pub fn completed_body(server: &MockServer) -> Value {
    json!({
        "ok": "ASSEMBLY_COMPLETED",
        "assembly_id": ASSEMBLY_ID,
        "assembly_ssl_url": ssl_url(server),
        "results": {
            "resize": [
                {"basename": "lol_cat", "ext": "png", "ssl_url": "https://tmp.example/lol_cat.png"}
            ]
        }
    })
}

pub async fn mount_status(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(assembly_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_event_stream(server: &MockServer, events: &str) {
    Mock::given(method("GET"))
        .and(path(stream_path()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(events.as_bytes().to_vec(), "text/event-stream"))
        .mount(server)
        .await;
}

/// Listener that records every callback as a line.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    /// Poll until an event starting with `prefix` arrives.
    pub async fn wait_for(&self, prefix: &str) {
        for _ in 0..500 {
            if self.count(prefix) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {:?} event, got {:?}", prefix, self.events());
    }
}

impl AssemblyListener for Recorder {
    fn on_assembly_finished(&self, response: &AssemblyResponse) {
        self.push(format!("finished:{}", response.status().map(|s| s.to_string()).unwrap_or_default()));
    }

    fn on_error(&self, error: &TransloaditError) {
        self.push(format!("error:{}", error));
    }

    fn on_metadata_extracted(&self) {
        self.push("metadata".to_string());
    }

    fn on_assembly_upload_finished(&self) {
        self.push("upload_finished".to_string());
    }

    fn on_file_upload_finished(&self, upload: &Value) {
        self.push(format!("file_finished:{}", upload["name"].as_str().unwrap_or_default()));
    }

    fn on_file_upload_paused(&self, name: &str) {
        self.push(format!("paused:{}", name));
    }

    fn on_file_upload_resumed(&self, name: &str) {
        self.push(format!("resumed:{}", name));
    }

    fn on_file_upload_progress(&self, uploaded_bytes: u64, total_bytes: u64) {
        self.push(format!("progress:{}/{}", uploaded_bytes, total_bytes));
    }

    fn on_assembly_progress(&self, progress: &Value) {
        self.push(format!("assembly_progress:{}", progress));
    }

    fn on_assembly_result_finished(&self, result: &Value) {
        self.push(format!("result:{}", result[0].as_str().unwrap_or_default()));
    }
}
