//! CSV record output
//!
//! One file per run, named after the listing title, with a header row
//! followed by one row per record.

use super::traits::{OutputError, OutputResult, RecordWriter, RecordWriterFactory};
use crate::crawler::CrawlRecord;
use crate::downloads::content_type::sanitize_file_stem;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Column names, in row order
pub const CSV_HEADERS: [&str; 11] = [
    "title",
    "start_period",
    "end_period",
    "incentive",
    "end_date",
    "source",
    "campaign_type",
    "prizes",
    "mechanics",
    "document_url",
    "item_url",
];

/// Writes records to a CSV file
pub struct CsvRecordWriter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows: usize,
}

impl CsvRecordWriter {
    /// Creates (or truncates) `path` and writes the header row
    pub fn create(path: impl Into<PathBuf>) -> OutputResult<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADERS)?;

        tracing::debug!("Writing records to {}", path.display());

        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far
    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl RecordWriter for CsvRecordWriter {
    fn append(&mut self, records: &[CrawlRecord]) -> OutputResult<()> {
        let writer = self.writer.as_mut().ok_or(OutputError::Closed)?;

        for record in records {
            writer.write_record([
                record.title.as_str(),
                record.start_period.as_str(),
                record.end_period.as_str(),
                record.incentive.as_str(),
                record.end_date.as_str(),
                record.source.as_str(),
                record.campaign_type.as_str(),
                record.prizes.as_str(),
                record.mechanics.as_str(),
                record.document_url.as_deref().unwrap_or_default(),
                record.item_url.as_str(),
            ])?;
        }
        writer.flush()?;

        self.rows += records.len();
        Ok(())
    }

    fn close(&mut self) -> OutputResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            tracing::info!("Wrote {} records to {}", self.rows, self.path.display());
        }
        Ok(())
    }
}

/// Opens `<output location>/<listing title>.csv`
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvWriterFactory;

impl CsvWriterFactory {
    /// Path of the CSV file for a listing title
    pub fn path_for(output_location: &Path, title: &str) -> PathBuf {
        let stem = if title.trim().is_empty() {
            "records".to_string()
        } else {
            sanitize_file_stem(title)
        };
        output_location.join(format!("{}.csv", stem))
    }
}

impl RecordWriterFactory for CsvWriterFactory {
    fn create(
        &self,
        output_location: &Path,
        title: &str,
    ) -> OutputResult<Box<dyn RecordWriter>> {
        std::fs::create_dir_all(output_location)?;
        let writer = CsvRecordWriter::create(Self::path_for(output_location, title))?;
        Ok(Box::new(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(title: &str, document_url: Option<&str>) -> CrawlRecord {
        CrawlRecord {
            title: title.to_string(),
            start_period: "Mai 2024".to_string(),
            end_period: "Iunie 2024".to_string(),
            incentive: "Voucher".to_string(),
            end_date: "30.06.2024".to_string(),
            source: "https://brand.example".to_string(),
            campaign_type: "Online".to_string(),
            prizes: "Voucher".to_string(),
            mechanics: "Inscrie bonul, apoi asteapta".to_string(),
            document_url: document_url.map(str::to_string),
            item_url: "https://example.com/concurs/1.html".to_string(),
        }
    }

    #[test]
    fn test_repeated_appends_accumulate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = CsvRecordWriter::create(&path).unwrap();

        writer.append(&[record("First", Some("https://example.com/a.pdf"))]).unwrap();
        writer.append(&[record("Second", None)]).unwrap();
        writer.close().unwrap();
        assert_eq!(writer.rows(), 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), CSV_HEADERS.len());
        assert_eq!(&headers[0], "title");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "First");
        assert_eq!(&rows[0][9], "https://example.com/a.pdf");
        assert_eq!(&rows[1][9], "");
        assert_eq!(&rows[1][8], "Inscrie bonul, apoi asteapta");
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let mut writer = CsvRecordWriter::create(dir.path().join("out.csv")).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        let err = writer.append(&[record("Late", None)]).unwrap_err();
        assert!(matches!(err, OutputError::Closed));
    }

    #[test]
    fn test_factory_names_file_after_title() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("nested");

        let mut writer = CsvWriterFactory.create(&location, "Concursuri/terminate").unwrap();
        writer.close().unwrap();

        assert!(location.join("Concursuri_terminate.csv").exists());
        assert_eq!(
            CsvWriterFactory::path_for(&location, "  "),
            location.join("records.csv")
        );
    }
}
