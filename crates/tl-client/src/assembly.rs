//! Assembly builder and execution.
//!
//! An assembly collects inputs, steps and options, then `save` creates it
//! on the service. Resumable saves upload inputs through tus in background
//! tasks; a listener receives live events from the assembly's update stream.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tl_models::{AssemblyResponse, Steps};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use crate::client::Transloadit;
use crate::error::{TransloaditError, TransloaditResult};
use crate::listener::AssemblyListener;
use crate::logging::AssemblyLogger;
use crate::request::Request;
use crate::sse::run_event_stream;
use crate::tus::{MemoryUrlStore, TusClient, UrlStore, DEFAULT_CHUNK_SIZE};
use crate::upload::{UploadControls, UploadFile, UploadSource, Uploader};

/// Interval between status polls while waiting without a listener.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Field name given to inputs added without one.
const DEFAULT_FIELD_NAME: &str = "file";

const DEFAULT_MAX_PARALLEL_UPLOADS: usize = 2;

const ABORT_MESSAGE: &str = "Uploads aborted";

/// An assembly under construction.
pub struct Assembly {
    client: Transloadit,
    files: Vec<UploadFile>,
    steps: Steps,
    options: Map<String, Value>,
    listener: Option<Arc<dyn AssemblyListener>>,
    should_wait: bool,
    assembly_id: Option<String>,
    upload_chunk_size: usize,
    max_parallel_uploads: usize,
    url_store: Arc<dyn UrlStore>,
    controls: UploadControls,
    upload_task: Option<JoinHandle<TransloaditResult<()>>>,
    event_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembly")
            .field("assembly_id", &self.assembly_id)
            .field("files", &self.files)
            .field("steps", &self.steps)
            .field("options", &self.options)
            .field("listener", &self.listener.is_some())
            .field("should_wait", &self.should_wait)
            .finish()
    }
}

impl Assembly {
    pub fn new(client: Transloadit) -> Self {
        Self {
            client,
            files: Vec::new(),
            steps: Steps::new(),
            options: Map::new(),
            listener: None,
            should_wait: false,
            assembly_id: Some(generate_assembly_id()),
            upload_chunk_size: DEFAULT_CHUNK_SIZE,
            max_parallel_uploads: DEFAULT_MAX_PARALLEL_UPLOADS,
            url_store: Arc::new(MemoryUrlStore::new()),
            controls: UploadControls::default(),
            upload_task: None,
            event_task: None,
        }
    }

    /// Add a local file under `name`, replacing any input with that name.
    pub fn add_file(&mut self, path: impl AsRef<Path>, name: impl Into<String>) {
        self.insert_file(name.into(), UploadSource::Path(path.as_ref().to_path_buf()));
    }

    /// Add a local file under a generated field name, which is returned.
    pub fn add_file_auto(&mut self, path: impl AsRef<Path>) -> String {
        let name = self.unique_field_name(DEFAULT_FIELD_NAME);
        self.add_file(path, name.clone());
        name
    }

    /// Add in-memory content under `name`, replacing any input with that name.
    pub fn add_bytes(&mut self, bytes: impl Into<Vec<u8>>, name: impl Into<String>) {
        self.insert_file(name.into(), UploadSource::Bytes(Arc::new(bytes.into())));
    }

    pub fn add_bytes_auto(&mut self, bytes: impl Into<Vec<u8>>) -> String {
        let name = self.unique_field_name(DEFAULT_FIELD_NAME);
        self.add_bytes(bytes, name.clone());
        name
    }

    /// Remove the input with the given field name. Returns whether one existed.
    pub fn remove_file(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.field != name);
        self.files.len() != before
    }

    pub fn number_of_files(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    fn insert_file(&mut self, field: String, source: UploadSource) {
        match self.files.iter_mut().find(|f| f.field == field) {
            Some(existing) => existing.source = source,
            None => self.files.push(UploadFile::new(field, source)),
        }
    }

    /// `base`, or `base_1`, `base_2`, ... if taken.
    fn unique_field_name(&self, base: &str) -> String {
        let taken = |name: &str| self.files.iter().any(|f| f.field == name);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|name| !taken(name))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn add_step(&mut self, name: impl Into<String>, robot: impl Into<String>, options: Map<String, Value>) {
        self.steps.add(name, robot, options);
    }

    pub fn remove_step(&mut self, name: &str) {
        self.steps.remove(name);
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    /// Set a top-level assembly option such as `template_id` or `notify_url`.
    pub fn add_option(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn add_options(&mut self, options: Map<String, Value>) {
        self.options.extend(options);
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Receive events for this assembly. Also makes `save` wait for completion.
    pub fn set_listener(&mut self, listener: Arc<dyn AssemblyListener>) {
        self.listener = Some(listener);
        self.should_wait = true;
    }

    pub fn listener(&self) -> Option<&Arc<dyn AssemblyListener>> {
        self.listener.as_ref()
    }

    pub fn set_wait_for_completion(&mut self, wait: bool) {
        self.should_wait = wait;
    }

    /// Bytes per tus `PATCH`; 0 restores the default of 2 MiB.
    pub fn set_upload_chunk_size(&mut self, size: usize) {
        self.upload_chunk_size = if size == 0 { DEFAULT_CHUNK_SIZE } else { size };
    }

    pub fn upload_chunk_size(&self) -> usize {
        self.upload_chunk_size
    }

    pub fn set_max_parallel_uploads(&mut self, max: usize) {
        self.max_parallel_uploads = max.max(1);
    }

    pub fn set_url_store(&mut self, store: Arc<dyn UrlStore>) {
        self.url_store = store;
    }

    /// Client-side generated id, if it has not been wiped.
    pub fn assembly_id(&self) -> Option<&str> {
        self.assembly_id.as_deref()
    }

    /// Use a specific assembly id; must be 32 hex characters.
    pub fn set_assembly_id(&mut self, id: &str) -> TransloaditResult<()> {
        let id = id.to_ascii_lowercase();
        if id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit()) {
            self.assembly_id = Some(id);
            Ok(())
        } else {
            Err(TransloaditError::InvalidAssemblyId(format!(
                "{:?} doesn't match the expected pattern of \"[a-f0-9]{{32}}\"",
                id
            )))
        }
    }

    /// Let the service assign the id.
    pub fn wipe_assembly_id(&mut self) {
        self.assembly_id = None;
    }

    fn upload_url(&self) -> String {
        match &self.assembly_id {
            Some(id) => format!("/assemblies/{}", id),
            None => "/assemblies".to_string(),
        }
    }

    fn waits_with_events(&self) -> bool {
        self.should_wait && self.listener.is_some()
    }

    /// Create the assembly.
    ///
    /// With `resumable` and at least one input, the assembly is created first
    /// and inputs are uploaded through tus in the background. Otherwise the
    /// inputs are sent in the creation request itself.
    ///
    /// When waiting without a listener, returns the finished status.
    pub async fn save(&mut self, resumable: bool) -> TransloaditResult<AssemblyResponse> {
        let logger = AssemblyLogger::new(self.assembly_id.as_deref(), "save");
        logger.log_start(&format!(
            "{} input(s), {} step(s), resumable={}",
            self.files.len(),
            self.steps.len(),
            resumable
        ));

        let mut data = self.options.clone();
        if !self.steps.is_empty() {
            data.insert("steps".to_string(), Value::Object(self.steps.to_map()));
        }
        let url = self.upload_url();

        let response = if resumable && !self.files.is_empty() {
            let extra = [(
                "tus_num_expected_upload_files".to_string(),
                self.files.len().to_string(),
            )];
            let response: AssemblyResponse = Request::new(&self.client)
                .post(&url, &data, &extra, &[])
                .await?
                .into();

            if let Some(error) = response.error() {
                logger.log_error(error);
                return Err(TransloaditError::request(format!(
                    "Request to Assembly failed: {}",
                    error
                )));
            }

            if self.waits_with_events() {
                self.start_event_stream(&response)?;
            }
            if let Err(e) = self.start_uploads(&response, &logger) {
                if let Some(events) = self.event_task.take() {
                    events.abort();
                }
                logger.log_error(&e.to_string());
                return Err(e);
            }
            response
        } else {
            let response: AssemblyResponse = Request::new(&self.client)
                .post(&url, &data, &[], &self.files)
                .await?
                .into();

            if self.waits_with_events() && !response.is_finished() {
                self.start_event_stream(&response)?;
            }
            response
        };

        if self.should_wait && self.listener.is_none() {
            if let Some(task) = self.upload_task.take() {
                join_uploads(task).await?;
            }
            let finished = self.poll_until_finished(response).await?;
            logger.log_completion(&format!("status {}", status_label(&finished)));
            return Ok(finished);
        }

        logger.log_progress(&format!("created, status {}", status_label(&response)));
        Ok(response)
    }

    fn start_event_stream(&mut self, response: &AssemblyResponse) -> TransloaditResult<()> {
        let Some(listener) = self.listener.clone() else {
            return Ok(());
        };
        let stream_url = response
            .update_stream_url()
            .ok_or_else(|| TransloaditError::request("Assembly response has no update_stream_url"))?
            .to_string();
        let ssl_url = response
            .ssl_url()
            .ok_or_else(|| TransloaditError::request("Assembly response has no assembly_ssl_url"))?
            .to_string();

        let span = AssemblyLogger::for_response(response, "events").create_span();
        self.event_task = Some(tokio::spawn(
            run_event_stream(self.client.clone(), stream_url, ssl_url, listener).instrument(span),
        ));
        Ok(())
    }

    fn start_uploads(&mut self, response: &AssemblyResponse, logger: &AssemblyLogger) -> TransloaditResult<()> {
        let tus_url = response
            .tus_url()
            .ok_or_else(|| TransloaditError::request("Assembly response has no tus_url"))?;
        let assembly_url = response
            .ssl_url()
            .ok_or_else(|| TransloaditError::request("Assembly response has no assembly_ssl_url"))?;

        let mut uploader = Uploader::new(
            TusClient::new(self.client.http.clone(), tus_url)?,
            Arc::clone(&self.url_store),
            assembly_url,
        );
        uploader.chunk_size = self.upload_chunk_size;
        uploader.max_parallel = self.max_parallel_uploads;
        uploader.listener = self.listener.clone();
        uploader.controls = self.controls.clone();

        let files = self.files.clone();
        let listener = self.listener.clone();
        let task_logger = AssemblyLogger::for_response(response, "upload");
        let span = task_logger.create_span();

        debug!(tus_url = %tus_url, files = files.len(), "Scheduling tus uploads");
        logger.log_progress("uploading inputs");

        self.upload_task = Some(tokio::spawn(
            async move {
                let result = Arc::new(uploader).run(files).await;
                if let Err(e) = &result {
                    task_logger.log_error(&e.to_string());
                    if !is_abort(e) {
                        if let Some(listener) = &listener {
                            listener.on_error(e);
                        }
                    }
                }
                result
            }
            .instrument(span),
        ));
        Ok(())
    }

    async fn poll_until_finished(&self, mut response: AssemblyResponse) -> TransloaditResult<AssemblyResponse> {
        loop {
            if let Some(error) = response.error() {
                return Err(TransloaditError::request(format!("Assembly failed: {}", error)));
            }
            if response.is_finished() {
                return Ok(response);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            let url = response
                .ssl_url()
                .ok_or_else(|| TransloaditError::request("Assembly response has no assembly_ssl_url"))?
                .to_string();
            response = self.client.get_assembly_by_url(&url).await?;
            debug!(url = %url, status = %status_label(&response), "Polled assembly status");
        }
    }

    /// Pause running uploads before their next chunk.
    pub fn pause_uploads(&self) {
        self.controls.pause();
    }

    /// Resume paused uploads from the server's offsets.
    pub fn resume_uploads(&self) {
        self.controls.resume();
    }

    /// Stop all uploads. The first call reports the abort to the listener.
    pub fn abort_uploads(&mut self) {
        if !self.controls.abort() {
            return;
        }
        if let Some(task) = &self.upload_task {
            task.abort();
        }
        if let Some(listener) = &self.listener {
            listener.on_error(&TransloaditError::local(ABORT_MESSAGE));
        }
    }

    /// Wait for background uploads and the event stream to finish.
    ///
    /// An upload failure stops listening for events and is returned.
    pub async fn wait(&mut self) -> TransloaditResult<()> {
        if let Some(task) = self.upload_task.take() {
            if let Err(e) = join_uploads(task).await {
                if let Some(events) = self.event_task.take() {
                    events.abort();
                }
                return Err(e);
            }
        }

        if let Some(events) = self.event_task.take() {
            events
                .await
                .map_err(|e| TransloaditError::local(format!("Event stream task failed: {}", e)))?;
        }
        Ok(())
    }
}

async fn join_uploads(task: JoinHandle<TransloaditResult<()>>) -> TransloaditResult<()> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(TransloaditError::local(ABORT_MESSAGE)),
        Err(e) => Err(TransloaditError::local(format!("Upload task failed: {}", e))),
    }
}

fn is_abort(error: &TransloaditError) -> bool {
    matches!(error, TransloaditError::LocalOperation(msg) if msg == ABORT_MESSAGE)
}

fn status_label(response: &AssemblyResponse) -> String {
    response
        .status()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn generate_assembly_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
