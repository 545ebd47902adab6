/// Download item state definitions
///
/// This module defines the lifecycle of a single document in the download queue.
use std::fmt;

/// Represents the current state of a download item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    // ===== Active States =====
    /// Waiting in the FIFO for a free download slot
    Queued,

    /// A worker is fetching and writing the document
    Processing,

    // ===== Terminal States =====
    /// The document was written to disk
    Completed,

    /// The retry budget is exhausted
    Failed,
}

impl ItemState {
    /// Returns true if this is a terminal state (no further transitions occur)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the item still counts as outstanding work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// `Processing -> Queued` is the retry path.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Queued)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Returns the lowercase name used in logs and events
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns all possible item states
    pub fn all_states() -> Vec<Self> {
        vec![Self::Queued, Self::Processing, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
