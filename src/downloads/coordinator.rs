//! Download coordinator
//!
//! Owns a [`DownloadQueue`] and pulls items from it under a concurrency
//! ceiling. Each pulled item is fetched, checked against the content-type
//! allow-list and streamed to `<download root>/<id>.<ext>` on its own tokio
//! task.
//!
//! # Scheduling
//!
//! Work is only pulled in `try_schedule`; [`DownloadCoordinator::enqueue`]
//! and every finishing worker call it. An atomic flag makes
//! sure only one caller runs the pull loop at a time, and worker slots are
//! reserved with an atomic check-and-increment so the ceiling holds even
//! while a previous scheduler pass is still unwinding. The queue mutex is
//! only held for state transitions, never across a fetch or a disk write.

use super::content_type::{extension_for, is_allowed, normalize_content_type, sanitize_file_stem};
use super::queue::{AttemptOutcome, DownloadQueue, DownloadRequest, EnqueueOutcome, FailedRecord, QueueStats};
use crate::config::DownloadConfig;
use crate::crawler::{document_headers, ByteStream, FetchClient};
use crate::events::{EventReporter, EventSink};
use crate::{HarvestError, Result, TransportError};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Runtime settings for a [`DownloadCoordinator`]
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Maximum number of documents in flight
    pub max_concurrent: usize,

    /// Directory documents are written to; created if missing
    pub download_root: PathBuf,

    /// Normalized `type/subtype` values accepted for documents
    pub allowed_content_types: Vec<String>,

    /// Attempts per document before it is recorded as failed
    pub max_retries: u32,

    /// Per-request timeout
    pub timeout: Duration,

    /// Largest accepted document, in bytes
    pub max_file_size: u64,

    /// Headers sent with every document request
    pub headers: HeaderMap,
}

impl DownloadSettings {
    /// Settings for a run writing into `output_location`
    pub fn from_config(config: &DownloadConfig, output_location: &Path) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1) as usize,
            download_root: output_location.join(&config.directory),
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|value| value.trim().to_ascii_lowercase())
                .collect(),
            max_retries: config.max_retries,
            timeout: Duration::from_millis(config.timeout_ms),
            max_file_size: config.max_file_size,
            headers: document_headers(),
        }
    }
}

struct Inner {
    queue: Mutex<DownloadQueue>,
    active: AtomicUsize,
    scheduling: AtomicBool,
    settings: DownloadSettings,
    client: Arc<dyn FetchClient>,
    reporter: EventReporter,
}

/// Bounded, retrying document downloader
///
/// Cloning is cheap; clones share the same queue and workers.
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

impl DownloadCoordinator {
    /// Creates a coordinator and its download root
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Io` if the download root cannot be created.
    pub fn configure(
        settings: DownloadSettings,
        client: Arc<dyn FetchClient>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&settings.download_root)?;

        tracing::debug!(
            "Download coordinator ready: root={}, max_concurrent={}, max_retries={}",
            settings.download_root.display(),
            settings.max_concurrent,
            settings.max_retries
        );

        Ok(Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(DownloadQueue::new(settings.max_retries)),
                active: AtomicUsize::new(0),
                scheduling: AtomicBool::new(false),
                settings,
                client,
                reporter: EventReporter::new(sink),
            }),
        })
    }

    /// Queues documents and starts as many as the ceiling allows
    ///
    /// Requests whose id is already tracked are dropped with a `warn` event.
    pub fn enqueue(&self, requests: Vec<DownloadRequest>) {
        let mut duplicates = Vec::new();
        {
            let mut queue = self.inner.lock_queue();
            for request in requests {
                let id = request.id.clone();
                if let EnqueueOutcome::Duplicate(state) = queue.enqueue(request) {
                    duplicates.push(format!("Skipping duplicate download {} (already {})", id, state));
                }
            }
        }

        for message in duplicates {
            tracing::warn!("{}", message);
            self.inner.reporter.warn(message);
        }

        Inner::try_schedule(&self.inner);
    }

    /// True while any document is queued or being downloaded
    pub fn is_busy(&self) -> bool {
        self.inner.active.load(Ordering::Acquire) > 0
            || self.inner.lock_queue().has_outstanding_work()
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock_queue().stats()
    }

    /// Documents whose retry budget is exhausted, oldest failure first
    pub fn failed_downloads(&self) -> Vec<FailedRecord> {
        self.inner.lock_queue().failed_items()
    }

    /// Number of worker slots currently taken
    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, DownloadQueue> {
        // Transitions never panic while holding the lock
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves a worker slot if the ceiling allows it
    fn reserve_slot(&self) -> bool {
        let max = self.settings.max_concurrent;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < max).then_some(active + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Dequeues the next item and marks it processing
    fn claim_next(&self) -> Option<DownloadRequest> {
        let mut queue = self.lock_queue();

        while let Some(request) = queue.dequeue_next() {
            match queue.mark_processing(&request.id) {
                Ok(()) => return Some(request),
                Err(e) => {
                    tracing::error!("Queue rejected {}: {}", request.id, e);
                    self.reporter.error(HarvestError::from(e).to_string());
                }
            }
        }

        None
    }

    fn has_pending_work(&self) -> bool {
        self.active.load(Ordering::Acquire) < self.settings.max_concurrent
            && self.lock_queue().queue_length() > 0
    }

    fn try_schedule(inner: &Arc<Self>) {
        loop {
            if inner
                .scheduling
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The running pass re-checks after clearing the flag
                return;
            }

            while inner.reserve_slot() {
                let Some(request) = inner.claim_next() else {
                    inner.release_slot();
                    break;
                };

                let worker = Arc::clone(inner);
                tokio::spawn(async move {
                    Inner::run_worker(worker, request).await;
                });
            }

            inner.scheduling.store(false, Ordering::Release);

            // Work may have arrived while the flag was held
            if !inner.has_pending_work() {
                return;
            }
        }
    }

    async fn run_worker(inner: Arc<Self>, request: DownloadRequest) {
        tracing::debug!("Downloading {} from {}", request.id, request.url);

        let result = inner.download(&request).await;

        match result {
            Ok(path) => {
                let completed = inner.lock_queue().mark_completed(&request.id);
                if let Err(e) = completed {
                    tracing::error!("Queue rejected completion of {}: {}", request.id, e);
                    inner.reporter.error(HarvestError::from(e).to_string());
                }
                tracing::info!("Downloaded {} to {}", request.id, path.display());
            }
            Err(e) => {
                let message = e.to_string();
                let outcome =
                    inner
                        .lock_queue()
                        .mark_failed_attempt(&request.id, &request.url, &message);

                match outcome {
                    Ok(AttemptOutcome::Requeued { attempts }) => {
                        tracing::warn!(
                            "Download of {} failed (attempt {} of {}), requeued: {}",
                            request.id,
                            attempts,
                            inner.settings.max_retries,
                            message
                        );
                    }
                    Ok(AttemptOutcome::Exhausted(record)) => {
                        tracing::error!(
                            "Giving up on {} after {} attempts: {}",
                            record.id,
                            record.retries,
                            record.error
                        );
                        inner.reporter.warn(format!(
                            "Failed to download {} after {} attempts: {}",
                            record.id, record.retries, record.error
                        ));
                    }
                    Err(queue_error) => {
                        tracing::error!(
                            "Queue rejected failure of {}: {}",
                            request.id,
                            queue_error
                        );
                        inner.reporter.error(HarvestError::from(queue_error).to_string());
                    }
                }
            }
        }

        tracing::debug!("downloadComplete: {}", request.id);
        inner.release_slot();
        Inner::try_schedule(&inner);
    }

    /// Fetches one document and writes it to disk
    async fn download(&self, request: &DownloadRequest) -> Result<PathBuf> {
        let response = self
            .client
            .get(
                &request.url,
                Some(&self.settings.headers),
                Some(self.settings.timeout),
            )
            .await?;

        if !(200..400).contains(&response.status) {
            return Err(TransportError::Status {
                url: request.url.clone(),
                status: response.status,
            }
            .into());
        }

        let content_type = normalize_content_type(response.content_type());
        if !is_allowed(&self.settings.allowed_content_types, &content_type) {
            return Err(HarvestError::ContentType {
                url: request.url.clone(),
                content_type,
            });
        }

        let file_name = format!(
            "{}.{}",
            sanitize_file_stem(&request.id),
            extension_for(&content_type)
        );
        let path = self.settings.download_root.join(file_name);

        match self.write_body(response.body, &path, &request.url).await {
            Ok(bytes) => {
                tracing::trace!("Wrote {} bytes to {}", bytes, path.display());
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_error) = tokio::fs::remove_file(&path).await {
                    if remove_error.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            "Could not remove partial file {}: {}",
                            path.display(),
                            remove_error
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Streams the body to `path`, enforcing the size limit
    async fn write_body(&self, mut body: ByteStream, path: &Path, url: &str) -> Result<u64> {
        let limit = self.settings.max_file_size;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;

            if written > limit {
                return Err(HarvestError::Capacity {
                    url: url.to_string(),
                    limit,
                });
            }

            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}
