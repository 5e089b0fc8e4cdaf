//! Assembly inputs and the resumable upload coordinator.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{TransloaditError, TransloaditResult};
use crate::listener::AssemblyListener;
use crate::metrics::record_uploaded_bytes;
use crate::tus::{TusClient, UrlStore, DEFAULT_CHUNK_SIZE};

/// Where the bytes of an input come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

impl UploadSource {
    pub async fn size(&self) -> TransloaditResult<u64> {
        match self {
            UploadSource::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            UploadSource::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    pub async fn read_all(&self) -> TransloaditResult<Vec<u8>> {
        match self {
            UploadSource::Path(path) => Ok(tokio::fs::read(path).await?),
            UploadSource::Bytes(bytes) => Ok(bytes.as_ref().clone()),
        }
    }

    /// Up to `len` bytes starting at `offset`.
    pub async fn read_chunk(&self, offset: u64, len: usize) -> TransloaditResult<Vec<u8>> {
        match self {
            UploadSource::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = Vec::with_capacity(len);
                file.take(len as u64).read_to_end(&mut buf).await?;
                Ok(buf)
            }
            UploadSource::Bytes(bytes) => {
                let start = (offset as usize).min(bytes.len());
                let end = start.saturating_add(len).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
        }
    }
}

/// A named assembly input.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub field: String,
    pub source: UploadSource,
}

impl UploadFile {
    pub fn new(field: impl Into<String>, source: UploadSource) -> Self {
        Self {
            field: field.into(),
            source,
        }
    }

    /// File name sent to the service. In-memory inputs use their field name.
    pub fn file_name(&self) -> String {
        match &self.source {
            UploadSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.field.clone()),
            UploadSource::Bytes(_) => self.field.clone(),
        }
    }

    /// Key under which the upload URL is remembered.
    pub fn fingerprint(&self, size: u64, assembly_url: &str) -> String {
        match &self.source {
            UploadSource::Path(path) => format!("{}-{}", path.display(), size),
            UploadSource::Bytes(_) => format!("{}-{}-{}", self.field, size, assembly_url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadState {
    Running,
    Paused,
    Aborted,
}

/// Shared pause/resume/abort switch for all uploads of an assembly.
#[derive(Debug, Clone)]
pub(crate) struct UploadControls {
    state: Arc<watch::Sender<UploadState>>,
}

impl Default for UploadControls {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(UploadState::Running);
        Self { state: Arc::new(tx) }
    }
}

impl UploadControls {
    pub(crate) fn pause(&self) {
        self.state.send_if_modified(|state| {
            if *state == UploadState::Running {
                *state = UploadState::Paused;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn resume(&self) {
        self.state.send_if_modified(|state| {
            if *state == UploadState::Paused {
                *state = UploadState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Returns `false` if already aborted.
    pub(crate) fn abort(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == UploadState::Aborted {
                false
            } else {
                *state = UploadState::Aborted;
                true
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }
}

fn aborted() -> TransloaditError {
    TransloaditError::local("Uploads aborted")
}

/// Uploads all inputs of one assembly through tus.
pub(crate) struct Uploader {
    pub(crate) tus: TusClient,
    pub(crate) store: Arc<dyn UrlStore>,
    pub(crate) assembly_url: String,
    pub(crate) chunk_size: usize,
    pub(crate) max_parallel: usize,
    pub(crate) listener: Option<Arc<dyn AssemblyListener>>,
    pub(crate) controls: UploadControls,
    uploaded: AtomicU64,
    total: AtomicU64,
}

impl Uploader {
    pub(crate) fn new(tus: TusClient, store: Arc<dyn UrlStore>, assembly_url: impl Into<String>) -> Self {
        Self {
            tus,
            store,
            assembly_url: assembly_url.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parallel: 2,
            listener: None,
            controls: UploadControls::default(),
            uploaded: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Upload every file, at most `max_parallel` at a time.
    ///
    /// The first failure aborts the remaining uploads and is returned.
    pub(crate) async fn run(self: Arc<Self>, files: Vec<UploadFile>) -> TransloaditResult<()> {
        let mut sized = Vec::with_capacity(files.len());
        for file in files {
            let size = file.source.size().await?;
            sized.push((file, size));
        }
        let total: u64 = sized.iter().map(|(_, size)| size).sum();
        self.total.store(total, Ordering::SeqCst);

        info!(
            assembly_url = %self.assembly_url,
            files = sized.len(),
            total_bytes = total,
            "Starting uploads"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel.max(1)));
        let mut uploads = JoinSet::new();

        for (file, size) in sized {
            let uploader = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            uploads.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| TransloaditError::local("Upload queue closed"))?;
                uploader.upload_one(&file, size).await
            });
        }

        while let Some(joined) = uploads.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(TransloaditError::local(format!("Upload task failed: {}", e))));
            if let Err(e) = result {
                warn!(assembly_url = %self.assembly_url, error = %e, "Upload failed, aborting remaining uploads");
                self.controls.abort();
                uploads.abort_all();
                return Err(e);
            }
        }

        info!(assembly_url = %self.assembly_url, "All uploads finished");
        Ok(())
    }

    async fn upload_one(&self, file: &UploadFile, size: u64) -> TransloaditResult<()> {
        let name = format!("Upload - {}", file.file_name());
        let mut state = self.controls.subscribe();
        if *state.borrow_and_update() == UploadState::Aborted {
            return Err(aborted());
        }

        let fingerprint = file.fingerprint(size, &self.assembly_url);
        let (upload_url, mut offset) = self.open_upload(file, size, &fingerprint).await?;
        self.add_progress(offset);

        debug!(upload = %name, upload_url = %upload_url, offset, size, "Uploading");

        while offset < size {
            if self.checkpoint(&mut state, &name).await? {
                let server_offset = self.tus.get_offset(&upload_url).await?;
                self.adjust_progress(offset, server_offset);
                offset = server_offset;
                self.notify(|l| l.on_file_upload_resumed(&name));
                continue;
            }

            let chunk = file.source.read_chunk(offset, self.chunk_size).await?;
            if chunk.is_empty() {
                return Err(TransloaditError::tus(format!(
                    "{} ended at {} of {} bytes",
                    name, offset, size
                )));
            }

            let new_offset = self.tus.patch_chunk(&upload_url, offset, chunk).await?;
            if new_offset <= offset {
                return Err(TransloaditError::tus(format!(
                    "server did not advance offset for {} (at {})",
                    name, offset
                )));
            }

            record_uploaded_bytes(new_offset - offset);
            self.adjust_progress(offset, new_offset);
            offset = new_offset;
        }

        self.store.remove(&fingerprint);
        debug!(upload = %name, "Upload finished");
        Ok(())
    }

    /// Resume a remembered upload or create a new one.
    async fn open_upload(&self, file: &UploadFile, size: u64, fingerprint: &str) -> TransloaditResult<(Url, u64)> {
        if let Some(stored) = self.store.get(fingerprint) {
            match Url::parse(&stored) {
                Ok(url) => match self.tus.get_offset(&url).await {
                    Ok(offset) => return Ok((url, offset)),
                    Err(e) => debug!(upload_url = %stored, error = %e, "Stored upload not resumable"),
                },
                Err(e) => debug!(upload_url = %stored, error = %e, "Stored upload URL invalid"),
            }
            self.store.remove(fingerprint);
        }

        let file_name = file.file_name();
        let metadata = [
            ("filename", file_name.as_str()),
            ("assembly_url", self.assembly_url.as_str()),
            ("fieldname", file.field.as_str()),
        ];
        let url = self.tus.create_upload(size, &metadata).await?;
        self.store.set(fingerprint, url.as_str());
        Ok((url, 0))
    }

    /// Returns `Ok(true)` once a pause has been lifted.
    async fn checkpoint(&self, state: &mut watch::Receiver<UploadState>, name: &str) -> TransloaditResult<bool> {
        match *state.borrow_and_update() {
            UploadState::Running => return Ok(false),
            UploadState::Aborted => return Err(aborted()),
            UploadState::Paused => {}
        }

        info!(upload = %name, "Upload paused");
        self.notify(|l| l.on_file_upload_paused(name));

        let next = state
            .wait_for(|s| *s != UploadState::Paused)
            .await
            .map(|s| *s)
            .map_err(|_| aborted())?;

        match next {
            UploadState::Aborted => Err(aborted()),
            _ => {
                info!(upload = %name, "Upload resumed");
                Ok(true)
            }
        }
    }

    fn add_progress(&self, bytes: u64) {
        if bytes > 0 {
            self.adjust_progress(0, bytes);
        }
    }

    /// Move progress from `from` to `to` and report the cumulative total.
    fn adjust_progress(&self, from: u64, to: u64) {
        let uploaded = if to >= from {
            self.uploaded.fetch_add(to - from, Ordering::SeqCst) + (to - from)
        } else {
            self.uploaded.fetch_sub(from - to, Ordering::SeqCst) - (from - to)
        };
        let total = self.total.load(Ordering::SeqCst);
        self.notify(|l| l.on_file_upload_progress(uploaded, total));
    }

    fn notify(&self, f: impl FnOnce(&dyn AssemblyListener)) {
        if let Some(listener) = &self.listener {
            f(listener.as_ref());
        }
    }
}
