//! Document downloads
//!
//! # Components
//!
//! - `DownloadQueue`: per-item lifecycle with FIFO tail retries
//! - `DownloadCoordinator`: bounded worker pool pulling from the queue
//! - `content_type`: allow-list checks, extensions and file stems

pub mod content_type;
mod coordinator;
mod queue;

pub use coordinator::{DownloadCoordinator, DownloadSettings};
pub use queue::{
    AttemptOutcome, DownloadQueue, DownloadRequest, EnqueueOutcome, FailedRecord, QueueError,
    QueueResult, QueueStats,
};
