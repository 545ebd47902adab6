//! Output module for records and run summaries
//!
//! This module handles:
//! - Writing extracted records (CSV by default)
//! - Printing run reports and archive filters

mod csv_writer;
pub mod stats;
mod traits;

pub use csv_writer::{CsvRecordWriter, CsvWriterFactory, CSV_HEADERS};
pub use stats::{download_success_rate, print_filters, print_report};
pub use traits::{OutputError, OutputResult, RecordWriter, RecordWriterFactory};
