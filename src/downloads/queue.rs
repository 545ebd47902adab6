//! Download queue state machine
//!
//! Every item lives in a single map keyed by id and carries an explicit
//! [`ItemState`] tag. The FIFO holds the ids of queued items in the order
//! they become eligible; a failed attempt with budget left goes back to the
//! tail. Statistics are derived by counting tags, so the buckets can never
//! drift apart.
//!
//! The queue does no I/O and no locking of its own; the
//! [`DownloadCoordinator`](super::DownloadCoordinator) wraps it in a mutex.

use crate::state::ItemState;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

/// Errors raised by queue transitions
///
/// These indicate a caller bug, not a download failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Unknown download item: {0}")]
    UnknownItem(String),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ItemState,
        to: ItemState,
    },

    #[error("Item {0} must be dequeued before it is marked processing")]
    NotDequeued(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A document to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Caller-assigned identifier, also the file stem on disk
    pub id: String,
    pub url: String,
}

impl DownloadRequest {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Point-in-time counts per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} queued, {} processing, {} completed, {} failed (Total: {})",
            self.queued, self.processing, self.completed, self.failed, self.total
        )
    }
}

/// An item whose retry budget is exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    pub id: String,
    pub url: String,
    /// The last error message
    pub error: String,
    /// Attempts made, equal to the queue's retry budget
    pub retries: u32,
}

/// Outcome of [`DownloadQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// An item with this id is already tracked; the request was dropped
    Duplicate(ItemState),
}

/// Outcome of [`DownloadQueue::mark_failed_attempt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Budget remains; the item is back at the tail of the FIFO
    Requeued { attempts: u32 },
    /// Budget exhausted; the item is terminal
    Exhausted(FailedRecord),
}

#[derive(Debug, Clone)]
struct TrackedItem {
    url: String,
    state: ItemState,
    retry_count: u32,
    last_error: Option<String>,
    /// Set by `dequeue_next`, cleared when the item re-enters the FIFO
    claimed: bool,
    /// Order in which items became terminal failures
    failed_seq: Option<u64>,
}

/// FIFO download queue with tail retries
#[derive(Debug)]
pub struct DownloadQueue {
    items: HashMap<String, TrackedItem>,
    fifo: VecDeque<String>,
    max_retries: u32,
    next_failed_seq: u64,
}

impl DownloadQueue {
    /// Creates a queue that allows `max_retries` attempts per item (at least one)
    pub fn new(max_retries: u32) -> Self {
        Self {
            items: HashMap::new(),
            fifo: VecDeque::new(),
            max_retries: max_retries.max(1),
            next_failed_seq: 0,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Appends an item to the back of the FIFO
    ///
    /// Ids are unique for the lifetime of the queue: a request whose id is
    /// already tracked, in any state, is dropped and reported as a duplicate.
    pub fn enqueue(&mut self, request: DownloadRequest) -> EnqueueOutcome {
        if let Some(existing) = self.items.get(&request.id) {
            return EnqueueOutcome::Duplicate(existing.state);
        }

        self.fifo.push_back(request.id.clone());
        self.items.insert(
            request.id,
            TrackedItem {
                url: request.url,
                state: ItemState::Queued,
                retry_count: 0,
                last_error: None,
                claimed: false,
                failed_seq: None,
            },
        );

        EnqueueOutcome::Queued
    }

    /// Pops the oldest queued item, if any
    pub fn dequeue_next(&mut self) -> Option<DownloadRequest> {
        while let Some(id) = self.fifo.pop_front() {
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };

            if item.state == ItemState::Queued && !item.claimed {
                item.claimed = true;
                return Some(DownloadRequest {
                    id,
                    url: item.url.clone(),
                });
            }
        }

        None
    }

    /// Moves a just-dequeued item to `Processing`
    pub fn mark_processing(&mut self, id: &str) -> QueueResult<()> {
        let item = self.get_mut(id)?;
        check_transition(id, item.state, ItemState::Processing)?;

        if !item.claimed {
            return Err(QueueError::NotDequeued(id.to_string()));
        }

        item.state = ItemState::Processing;
        Ok(())
    }

    /// Moves a processing item to `Completed`
    pub fn mark_completed(&mut self, id: &str) -> QueueResult<()> {
        let item = self.get_mut(id)?;
        check_transition(id, item.state, ItemState::Completed)?;

        item.state = ItemState::Completed;
        item.claimed = false;
        Ok(())
    }

    /// Records a failed attempt for a processing item
    ///
    /// The item goes back to the tail of the FIFO while attempts remain,
    /// otherwise it becomes a terminal failure.
    pub fn mark_failed_attempt(
        &mut self,
        id: &str,
        url: &str,
        error: &str,
    ) -> QueueResult<AttemptOutcome> {
        let max_retries = self.max_retries;
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
        check_transition(id, item.state, ItemState::Failed)?;

        item.retry_count += 1;
        item.last_error = Some(error.to_string());
        item.url = url.to_string();
        item.claimed = false;

        if item.retry_count < max_retries {
            item.state = ItemState::Queued;
            let attempts = item.retry_count;
            self.fifo.push_back(id.to_string());
            return Ok(AttemptOutcome::Requeued { attempts });
        }

        item.state = ItemState::Failed;
        item.failed_seq = Some(self.next_failed_seq);
        self.next_failed_seq += 1;

        Ok(AttemptOutcome::Exhausted(FailedRecord {
            id: id.to_string(),
            url: url.to_string(),
            error: error.to_string(),
            retries: item.retry_count,
        }))
    }

    /// Counts items per state
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();

        for item in self.items.values() {
            match item.state {
                ItemState::Queued => stats.queued += 1,
                ItemState::Processing => stats.processing += 1,
                ItemState::Completed => stats.completed += 1,
                ItemState::Failed => stats.failed += 1,
            }
        }

        stats.total = stats.queued + stats.processing + stats.completed + stats.failed;
        stats
    }

    /// Terminal failures in the order they happened
    pub fn failed_items(&self) -> Vec<FailedRecord> {
        let mut failed: Vec<(u64, FailedRecord)> = self
            .items
            .iter()
            .filter(|(_, item)| item.state == ItemState::Failed)
            .map(|(id, item)| {
                (
                    item.failed_seq.unwrap_or(u64::MAX),
                    FailedRecord {
                        id: id.clone(),
                        url: item.url.clone(),
                        error: item.last_error.clone().unwrap_or_default(),
                        retries: item.retry_count,
                    },
                )
            })
            .collect();

        failed.sort_by_key(|(seq, _)| *seq);
        failed.into_iter().map(|(_, record)| record).collect()
    }

    /// Number of items waiting in the FIFO
    pub fn queue_length(&self) -> usize {
        self.fifo.len()
    }

    /// True while any item is queued or processing
    pub fn has_outstanding_work(&self) -> bool {
        self.items.values().any(|item| item.state.is_active())
    }

    pub fn item_state(&self, id: &str) -> Option<ItemState> {
        self.items.get(id).map(|item| item.state)
    }

    pub fn retry_count(&self, id: &str) -> Option<u32> {
        self.items.get(id).map(|item| item.retry_count)
    }

    fn get_mut(&mut self, id: &str) -> QueueResult<&mut TrackedItem> {
        self.items
            .get_mut(id)
            .ok_or_else(|| QueueError::UnknownItem(id.to_string()))
    }
}

fn check_transition(id: &str, from: ItemState, to: ItemState) -> QueueResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}
