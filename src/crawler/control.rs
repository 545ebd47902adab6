//! Run control surface
//!
//! A [`Controller`] owns a single run slot. Starting a run while the slot is
//! taken is refused; the slot frees itself when the run's task ends, however
//! it ends.

use super::orchestrator::{ArchiveFilters, CrawlOrchestrator, CrawlReport, CrawlRequest};
use crate::events::EventReporter;
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// The run currently holding the slot
#[derive(Debug)]
struct RunInfo {
    id: u64,
    base_url: String,
    started_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<RunInfo>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<RunInfo>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees the slot when dropped
struct SlotRelease {
    slot: Slot,
    id: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().map(|run| run.id) == Some(self.id) {
            *slot = None;
        }
        tracing::debug!("Run {} released its slot", self.id);
    }
}

/// Handle to a started run
pub struct RunTicket {
    id: u64,
    handle: JoinHandle<Result<CrawlReport>>,
    reporter: EventReporter,
}

impl RunTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the run and returns its report
    ///
    /// A run task that panicked is reported as `HarvestError::Join`, with
    /// the usual `error` and `complete` events.
    pub async fn wait(self) -> Result<CrawlReport> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                let error = HarvestError::Join(e.to_string());
                tracing::error!("Run {} aborted: {}", self.id, error);
                self.reporter.error(error.to_string());
                self.reporter.complete();
                Err(error)
            }
        }
    }
}

/// Single-slot run controller
#[derive(Clone)]
pub struct Controller {
    orchestrator: Arc<CrawlOrchestrator>,
    slot: Slot,
    next_id: Arc<AtomicU64>,
}

impl Controller {
    pub fn new(orchestrator: CrawlOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            slot: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Starts a run on the tokio runtime
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::AlreadyRunning`, after emitting an `error`
    /// event, if a run holds the slot.
    pub fn start(&self, request: CrawlRequest) -> Result<RunTicket> {
        let reporter = self.orchestrator.reporter().clone();

        let id = {
            let mut slot = lock_slot(&self.slot);
            if let Some(current) = slot.as_ref() {
                tracing::warn!(
                    "Refusing to start {}: run {} on {} is still going (started {})",
                    request.base_url,
                    current.id,
                    current.base_url,
                    current.started_at.to_rfc3339()
                );
                reporter.error(HarvestError::AlreadyRunning.to_string());
                return Err(HarvestError::AlreadyRunning);
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *slot = Some(RunInfo {
                id,
                base_url: request.base_url.clone(),
                started_at: Utc::now(),
            });
            id
        };

        tracing::info!(
            "Starting run {}: {} ({} mode)",
            id,
            request.base_url,
            request.mode
        );

        let release = SlotRelease {
            slot: self.slot.clone(),
            id,
        };
        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move {
            let _release = release;
            orchestrator.run(&request).await
        });

        Ok(RunTicket {
            id,
            handle,
            reporter,
        })
    }

    pub fn is_running(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Archive years and page count of a listing
    pub async fn fetch_filters(&self, source_url: &str) -> Result<ArchiveFilters> {
        self.orchestrator.fetch_filters(source_url).await
    }
}
