use std::fmt;

/// Phase of a crawl run
///
/// A run walks `Idle -> FetchingPage -> ExtractingItems -> FetchingItems ->
/// EnqueuingDocuments -> Paginating` once per page, then `Draining -> Complete`.
/// Any phase may move to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    Idle,
    FetchingPage,
    ExtractingItems,
    FetchingItems,
    EnqueuingDocuments,
    Paginating,
    Draining,
    Complete,
    Error,
}

impl CrawlPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Returns true if `next` may follow this phase
    pub fn can_transition_to(&self, next: Self) -> bool {
        use CrawlPhase::*;

        if next == Error {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Idle, FetchingPage)
                | (FetchingPage, ExtractingItems)
                | (ExtractingItems, FetchingItems)
                | (FetchingItems, EnqueuingDocuments)
                | (EnqueuingDocuments, Paginating)
                | (Paginating, FetchingPage)
                | (Paginating, Draining)
                // A listing page that could not be fetched is skipped
                | (FetchingPage, Paginating)
                | (Draining, Complete)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingPage => "fetching_page",
            Self::ExtractingItems => "extracting_items",
            Self::FetchingItems => "fetching_items",
            Self::EnqueuingDocuments => "enqueuing_documents",
            Self::Paginating => "paginating",
            Self::Draining => "draining",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
