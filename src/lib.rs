//! Sumi-Harvest: a polite listing harvester
//!
//! This crate walks a paginated listing site, extracts a structured record from
//! every detail page it links to, and downloads the documents those records
//! reference through a bounded, retrying download queue. Progress is reported
//! through an injected event sink.

pub mod config;
pub mod crawler;
pub mod downloads;
pub mod events;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unsupported document type: {content_type} ({url})")]
    ContentType { url: String, content_type: String },

    #[error("Extraction error for {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("File size exceeded maximum allowed size of {limit} bytes ({url})")]
    Capacity { url: String, limit: u64 },

    #[error("Queue state error: {0}")]
    State(#[from] downloads::QueueError),

    #[error("Already running a task")]
    AlreadyRunning,

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Run task failed: {0}")]
    Join(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
}

/// Errors raised by a [`crawler::FetchClient`]
///
/// The variants separate failures worth retrying (timeouts, refused
/// connections, 5xx and 429 responses) from permanent ones.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Body stream error for {url}: {message}")]
    Body { url: String, message: String },

    #[error("Request error for {url}: {message}")]
    Request { url: String, message: String },
}

impl TransportError {
    /// Returns true for network classes the transport retries
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Body { .. } => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Request { .. } => false,
        }
    }
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Controller, CrawlMode, CrawlOrchestrator, CrawlReport, PageRange};
pub use downloads::{DownloadCoordinator, DownloadQueue, FailedRecord, QueueStats};
pub use events::{EventKind, EventPayload, EventSink};
pub use state::{CrawlPhase, ItemState};
