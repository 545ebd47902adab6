//! Record writer traits and errors
//!
//! The orchestrator appends each page's records to a [`RecordWriter`] and
//! closes it once the run ends. Writers are created per run by a
//! [`RecordWriterFactory`], which decides where the output lives.

use crate::crawler::CrawlRecord;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writer already closed")]
    Closed,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Sink for extracted records
///
/// Calling [`append`](RecordWriter::append) several times before
/// [`close`](RecordWriter::close) is allowed; records accumulate in order.
pub trait RecordWriter: Send {
    /// Appends a batch of records
    fn append(&mut self, records: &[CrawlRecord]) -> OutputResult<()>;

    /// Flushes and releases the underlying resource
    ///
    /// Closing twice is a no-op.
    fn close(&mut self) -> OutputResult<()>;
}

/// Creates the writer for one run
pub trait RecordWriterFactory: Send + Sync {
    /// Opens a writer for the listing `title` under `output_location`
    fn create(&self, output_location: &Path, title: &str)
        -> OutputResult<Box<dyn RecordWriter>>;
}
