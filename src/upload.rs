//! Upload orchestration: one batch, one transmission, one terminal outcome.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use url::Url;

use crate::batch::{remove_at, validate_batch, BatchFile, FileBatch, UploadOptions, ValidationError};
use crate::client::{ApiClient, ApiError};
use crate::session::SessionState;

/// Files are streamed in slices this large so the transport hands back
/// exact byte counts as the body goes out.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Please select at least one file to upload.")]
    EmptyBatch,
    #[error("An upload is already in progress.")]
    TransmissionInFlight,
    #[error("Upload error occurred.")]
    Transport,
    #[error("Upload failed. Please try again.")]
    ServerRejected,
    #[error("Upload result discarded after reset.")]
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Validating,
    Transmitting,
    Succeeded,
    Failed,
}

/// Outcome of a successful transmission. Superseded by the next one.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub short_link: Url,
    pub short_code: String,
}

/// Reports cumulative body progress as integer percentages over a watch
/// channel. `None` means no progress is known yet; a total of zero keeps it
/// that way rather than fabricating values.
pub struct ProgressCounter {
    sent: AtomicU64,
    total: u64,
    tx: watch::Sender<Option<u8>>,
}

impl ProgressCounter {
    pub fn new(total: u64, tx: watch::Sender<Option<u8>>) -> Self {
        Self {
            sent: AtomicU64::new(0),
            total,
            tx,
        }
    }

    /// Record `bytes` more of the body as sent. Percentages are
    /// non-decreasing because the underlying count only grows.
    pub fn record(&self, bytes: u64) {
        let sent = self.sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if self.total == 0 {
            return;
        }
        let percent = ((sent as f64 / self.total as f64) * 100.0).round() as u64;
        let _ = self.tx.send(Some(percent.min(100) as u8));
    }
}

struct Inner {
    phase: UploadPhase,
    generation: u64,
    batch: FileBatch,
    options: UploadOptions,
    last_result: Option<UploadResult>,
}

/// Drives a single upload transaction at a time.
///
/// State machine: `Idle -> Validating -> Transmitting -> {Succeeded,
/// Failed}`. At most one transmission is in flight; the guard is enforced
/// here, not left to callers. A transmission that outlives a `reset()` has
/// its result discarded rather than applied to state that moved on.
pub struct UploadOrchestrator {
    client: ApiClient,
    session: Arc<SessionState>,
    inner: Mutex<Inner>,
    progress: watch::Sender<Option<u8>>,
}

impl UploadOrchestrator {
    pub fn new(client: ApiClient, session: Arc<SessionState>) -> Self {
        let (progress, _) = watch::channel(None);
        Self {
            client,
            session,
            inner: Mutex::new(Inner {
                phase: UploadPhase::Idle,
                generation: 0,
                batch: FileBatch::new(),
                options: UploadOptions::default(),
                last_result: None,
            }),
            progress,
        }
    }

    /// Add files to the owned batch. Rejected while a transmission is in
    /// flight -- the batch is frozen for the duration.
    pub async fn add_files(&self, incoming: Vec<BatchFile>) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().await;
        if inner.phase == UploadPhase::Transmitting {
            return Err(UploadError::TransmissionInFlight);
        }
        inner.batch = validate_batch(&inner.batch, incoming)?;
        Ok(())
    }

    /// Remove the file at `index` from the owned batch.
    pub async fn remove_file(&self, index: usize) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().await;
        if inner.phase == UploadPhase::Transmitting {
            return Err(UploadError::TransmissionInFlight);
        }
        inner.batch = remove_at(&inner.batch, index)?;
        Ok(())
    }

    pub async fn set_options(&self, options: UploadOptions) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().await;
        if inner.phase == UploadPhase::Transmitting {
            return Err(UploadError::TransmissionInFlight);
        }
        inner.options = options;
        Ok(())
    }

    pub async fn batch(&self) -> FileBatch {
        self.inner.lock().await.batch.clone()
    }

    pub async fn phase(&self) -> UploadPhase {
        self.inner.lock().await.phase
    }

    pub async fn last_result(&self) -> Option<UploadResult> {
        self.inner.lock().await.last_result.clone()
    }

    /// Subscribe to progress for the current transmission. Values are
    /// non-decreasing percentages; `None` until the first byte count of a
    /// transmission arrives.
    pub fn progress_updates(&self) -> watch::Receiver<Option<u8>> {
        self.progress.subscribe()
    }

    /// Manual reset path: returns to `Idle` and invalidates any in-flight
    /// transmission so a hung request can never lock out a new attempt.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        inner.phase = UploadPhase::Idle;
        let _ = self.progress.send(None);
    }

    /// Transmit the current batch with the current options.
    ///
    /// On success the owned batch and options are reset so a subsequent
    /// upload starts clean. On failure they are retained and the caller
    /// decides whether to re-initiate with the same batch.
    pub async fn upload(&self) -> Result<UploadResult, UploadError> {
        let (generation, batch, options) = {
            let mut inner = self.inner.lock().await;
            if inner.phase == UploadPhase::Transmitting {
                return Err(UploadError::TransmissionInFlight);
            }

            // Re-run the batch rules against the frozen snapshot; stale
            // state must fail here, before any network traffic.
            inner.phase = UploadPhase::Validating;
            if inner.batch.is_empty() {
                inner.phase = UploadPhase::Failed;
                return Err(UploadError::EmptyBatch);
            }
            if let Err(e) = inner.batch.check_limits() {
                inner.phase = UploadPhase::Failed;
                return Err(UploadError::Validation(e));
            }

            inner.generation += 1;
            inner.phase = UploadPhase::Transmitting;
            let _ = self.progress.send(None);
            (inner.generation, inner.batch.clone(), inner.options.clone())
        };

        let outcome = self.transmit(&batch, &options).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::debug!("discarding upload result from a superseded transmission");
            return Err(UploadError::Superseded);
        }

        match outcome {
            Ok(result) => {
                tracing::debug!(short_code = %result.short_code, "upload succeeded");
                inner.phase = UploadPhase::Succeeded;
                inner.batch = FileBatch::new();
                inner.options = UploadOptions::default();
                inner.last_result = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                inner.phase = UploadPhase::Failed;
                Err(e)
            }
        }
    }

    async fn transmit(
        &self,
        batch: &FileBatch,
        options: &UploadOptions,
    ) -> Result<UploadResult, UploadError> {
        // A dead or unreadable token never blocks the upload itself.
        let bearer = match self.session.current_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "token store unavailable, uploading anonymously");
                None
            }
        };

        let form = build_form(batch, options, &self.progress).map_err(|e| {
            tracing::debug!(error = %e, "failed to assemble multipart body");
            UploadError::Transport
        })?;

        let response = self
            .client
            .send_upload(form, bearer.as_deref())
            .await
            .map_err(|e| match e {
                ApiError::Transport(_) => UploadError::Transport,
                _ => UploadError::ServerRejected,
            })?;

        let short_link =
            Url::parse(&response.short_link).map_err(|_| UploadError::ServerRejected)?;
        let short_code = short_link
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .ok_or(UploadError::ServerRejected)?;

        Ok(UploadResult {
            short_link,
            short_code,
        })
    }
}

/// Assemble the multipart body: every file under the repeated `files`
/// field, the expiry in hours, and the password field only when one is set.
fn build_form(
    batch: &FileBatch,
    options: &UploadOptions,
    progress: &watch::Sender<Option<u8>>,
) -> Result<Form, reqwest::Error> {
    let counter = Arc::new(ProgressCounter::new(batch.total_size(), progress.clone()));

    let mut form = Form::new();
    for file in batch.files() {
        form = form.part("files", progress_part(file, Arc::clone(&counter))?);
    }

    form = form.text("expiryHours", options.expiry.as_hours().to_string());
    if let Some(password) = options.password() {
        form = form.text("password", password.to_string());
    }

    Ok(form)
}

/// Stream one file's content in fixed-size slices, feeding the shared
/// counter as each slice is handed to the transport.
fn progress_part(file: &BatchFile, counter: Arc<ProgressCounter>) -> Result<Part, reqwest::Error> {
    let content = file.content.clone();
    let len = content.len();

    let chunks: Vec<Result<Bytes, Infallible>> = (0..len)
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|offset| Ok(content.slice(offset..len.min(offset + UPLOAD_CHUNK_BYTES))))
        .collect();

    let stream = futures_util::stream::iter(chunks).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            counter.record(bytes.len() as u64);
        }
        chunk
    });

    Part::stream_with_length(Body::wrap_stream(stream), file.byte_size)
        .file_name(file.name.clone())
        .mime_str(&file.mime_type)
}
