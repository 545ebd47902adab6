//! Crawl orchestration
//!
//! A run discovers the listing's page count, walks the requested page range
//! one page at a time, fetches every item on a page concurrently, writes the
//! page's records and hands their documents to a [`DownloadCoordinator`].
//! Once the range is exhausted, or the run stops early, it waits for the
//! downloads to drain.
//!
//! Failures are isolated where possible:
//! - An item that cannot be fetched or parsed is reported and skipped
//! - A listing page that cannot be fetched is reported and skipped
//! - Document failures are handled by the coordinator's retry budget
//!
//! Only a missing page count, a bad base URL or an output failure ends the
//! run early.

use crate::config::{Config, CrawlerConfig, DownloadConfig};
use crate::crawler::fetcher::FetchClient;
use crate::crawler::parser::{CrawlRecord, Extractor, SelectorExtractor, YearArchive};
use crate::downloads::content_type::sanitize_file_stem;
use crate::downloads::{DownloadCoordinator, DownloadRequest, DownloadSettings, FailedRecord, QueueStats};
use crate::events::{EventPayload, EventReporter, EventSink};
use crate::output::{CsvWriterFactory, RecordWriter, RecordWriterFactory};
use crate::state::CrawlPhase;
use crate::{HarvestError, Result};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Which pages of the listing to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlMode {
    /// The caller's page range
    #[default]
    All,
    /// Every page, from 1 to the discovered page count
    Archived,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CrawlMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown crawl mode '{}'", other)),
        }
    }
}

/// Inclusive, 1-based page range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Pages to visit for `mode`, given the discovered page count
    ///
    /// A range whose start is past its end is empty.
    pub fn pages(&self, mode: CrawlMode, total_pages: u32) -> RangeInclusive<u32> {
        match mode {
            CrawlMode::All => self.start..=self.end,
            CrawlMode::Archived => 1..=total_pages,
        }
    }
}

impl Default for PageRange {
    fn default() -> Self {
        Self { start: 1, end: 1 }
    }
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// Listing root; page `n` lives at `<base_url>/<n>`
    pub base_url: String,
    pub mode: CrawlMode,
    pub range: PageRange,
    /// Directory for the record file and the document folder
    pub output_location: PathBuf,
}

/// Outcome of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Listing title
    pub title: String,

    /// Listing pages fetched and processed
    pub pages_visited: u32,

    /// Listing pages that could not be fetched
    pub pages_skipped: u32,

    pub records_written: usize,

    /// Items that could not be fetched or parsed
    pub items_failed: usize,

    pub documents_enqueued: usize,

    /// Final download counts
    pub downloads: QueueStats,

    pub failed_downloads: Vec<FailedRecord>,
}

/// The archive filter query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFilters {
    pub years: Vec<YearArchive>,
    pub max_pages: Option<u32>,
}

/// Walks a listing, writes records and downloads their documents
pub struct CrawlOrchestrator {
    client: Arc<dyn FetchClient>,
    extractor: Arc<dyn Extractor>,
    writers: Arc<dyn RecordWriterFactory>,
    reporter: EventReporter,
    crawler: CrawlerConfig,
    downloads: DownloadConfig,
}

impl CrawlOrchestrator {
    /// Creates an orchestrator with the selector extractor and CSV output
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Config` if a configured selector does not parse.
    pub fn new(
        config: &Config,
        client: Arc<dyn FetchClient>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let extractor = SelectorExtractor::new(&config.selectors)?;

        Ok(Self {
            client,
            extractor: Arc::new(extractor),
            writers: Arc::new(CsvWriterFactory),
            reporter: EventReporter::new(sink),
            crawler: config.crawler.clone(),
            downloads: config.downloads.clone(),
        })
    }

    /// Replaces the record output
    pub fn with_writer_factory(mut self, writers: Arc<dyn RecordWriterFactory>) -> Self {
        self.writers = writers;
        self
    }

    pub fn reporter(&self) -> &EventReporter {
        &self.reporter
    }

    /// Runs a crawl to completion
    ///
    /// Always ends with a `complete` event, and only once no document is
    /// queued or downloading. A run that stops early emits an `error` event
    /// first and returns the error.
    pub async fn run(&self, request: &CrawlRequest) -> Result<CrawlReport> {
        let mut phase = PhaseTracker::new();

        match self.execute(request, &mut phase).await {
            Ok(report) => {
                phase.advance(CrawlPhase::Complete);
                self.reporter.complete();
                Ok(report)
            }
            Err(e) => {
                phase.advance(CrawlPhase::Error);
                tracing::error!("Crawl of {} failed: {}", request.base_url, e);
                self.reporter.error(e.to_string());
                self.reporter.complete();
                Err(e)
            }
        }
    }

    /// Fetches the listing root and reads its archive filters
    pub async fn fetch_filters(&self, source_url: &str) -> Result<ArchiveFilters> {
        Url::parse(source_url)?;
        let html = self.fetch_text(source_url).await?;

        Ok(ArchiveFilters {
            years: self.extractor.archive(&html),
            max_pages: self.extractor.listing_summary(&html).max_pages,
        })
    }

    async fn execute(&self, request: &CrawlRequest, phase: &mut PhaseTracker) -> Result<CrawlReport> {
        Url::parse(&request.base_url)?;

        phase.advance(CrawlPhase::FetchingPage);
        let root = self.fetch_text(&request.base_url).await?;
        let summary = self.extractor.listing_summary(&root);

        let total_pages = summary.max_pages.ok_or_else(|| HarvestError::Extraction {
            url: request.base_url.clone(),
            message: "could not read the page count".to_string(),
        })?;

        self.reporter
            .count(format!("Found {} pages on {}", total_pages, summary.title));

        let pages: Vec<u32> = request.range.pages(request.mode, total_pages).collect();
        tracing::info!(
            "Starting {} crawl of {}: {} pages ({} in range)",
            request.mode,
            summary.title,
            total_pages,
            pages.len()
        );

        let mut writer = self
            .writers
            .create(&request.output_location, &summary.title)?;
        let coordinator = DownloadCoordinator::configure(
            DownloadSettings::from_config(&self.downloads, &request.output_location),
            self.client.clone(),
            self.reporter.sink(),
        )?;

        let mut report = CrawlReport {
            title: summary.title.clone(),
            ..CrawlReport::default()
        };

        phase.advance(CrawlPhase::Paginating);

        let walked = self
            .walk_pages(request, &pages, phase, writer.as_mut(), &coordinator, &mut report)
            .await;

        if let Err(e) = walked {
            // Documents already handed off still land in the output directory
            tracing::warn!(
                "Crawl stopped early, waiting for downloads: {}",
                coordinator.stats()
            );
            self.drain(&coordinator).await;
            if let Err(close_err) = writer.close() {
                tracing::warn!("Could not close record output: {}", close_err);
            }
            return Err(e);
        }

        phase.advance(CrawlPhase::Draining);
        self.drain(&coordinator).await;

        writer.close()?;

        report.downloads = coordinator.stats();
        report.failed_downloads = coordinator.failed_downloads();

        tracing::info!(
            "Finished {}: {} records, downloads {}",
            report.title,
            report.records_written,
            report.downloads
        );

        Ok(report)
    }

    async fn walk_pages(
        &self,
        request: &CrawlRequest,
        pages: &[u32],
        phase: &mut PhaseTracker,
        writer: &mut dyn RecordWriter,
        coordinator: &DownloadCoordinator,
        report: &mut CrawlReport,
    ) -> Result<()> {
        for (index, page) in pages.iter().enumerate() {
            phase.advance(CrawlPhase::FetchingPage);
            self.crawl_page(request, *page, phase, writer, coordinator, report)
                .await?;

            let progress = (index + 1) as f64 / pages.len() as f64 * 100.0;
            self.reporter.progress(progress);
        }

        Ok(())
    }

    /// Processes one listing page, leaving the phase at `Paginating`
    async fn crawl_page(
        &self,
        request: &CrawlRequest,
        page: u32,
        phase: &mut PhaseTracker,
        writer: &mut dyn RecordWriter,
        coordinator: &DownloadCoordinator,
        report: &mut CrawlReport,
    ) -> Result<()> {
        let page_url = format!("{}/{}", request.base_url.trim_end_matches('/'), page);

        let html = match self.fetch_text(&page_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Skipping listing page {}: {}", page_url, e);
                self.reporter
                    .warn(format!("Skipping page {} ({}): {}", page, page_url, e));
                report.pages_skipped += 1;
                phase.advance(CrawlPhase::Paginating);
                return Ok(());
            }
        };

        phase.advance(CrawlPhase::ExtractingItems);
        let base = Url::parse(&page_url)?;
        let links = self.extractor.item_links(&html, &base);
        self.reporter
            .details(format!("Page {}: {} items", page, links.len()));

        phase.advance(CrawlPhase::FetchingItems);
        let records = self.fetch_items(links, report).await;

        writer.append(&records)?;
        report.records_written += records.len();

        phase.advance(CrawlPhase::EnqueuingDocuments);
        let requests: Vec<DownloadRequest> = records
            .iter()
            .filter_map(|record| {
                record.document().map(|url| {
                    DownloadRequest::new(sanitize_file_stem(&record.document_id()), url)
                })
            })
            .collect();

        tracing::debug!("Page {}: enqueuing {} documents", page, requests.len());
        report.documents_enqueued += requests.len();
        coordinator.enqueue(requests);

        report.pages_visited += 1;
        phase.advance(CrawlPhase::Paginating);
        Ok(())
    }

    /// Fetches and parses every item, one task per item, started
    /// `item_delay` apart
    ///
    /// Records come back in link order; failed items are reported and left
    /// out.
    async fn fetch_items(&self, links: Vec<String>, report: &mut CrawlReport) -> Vec<CrawlRecord> {
        let delay = self.crawler.item_delay();
        let mut handles = Vec::with_capacity(links.len());

        for (i, link) in links.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let client = self.client.clone();
            let extractor = self.extractor.clone();
            let url = link.clone();
            let handle = tokio::spawn(async move { fetch_item(client, extractor, url).await });
            handles.push((link, handle));
        }

        let mut records = Vec::with_capacity(handles.len());

        for (link, handle) in handles {
            let outcome = handle
                .await
                .map_err(|e| HarvestError::Join(e.to_string()))
                .and_then(|result| result);

            match outcome {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping item {}: {}", link, e);
                    self.reporter.warn(format!("Skipping item {}: {}", link, e));
                    report.items_failed += 1;
                }
            }
        }

        records
    }

    /// Waits for outstanding downloads, reporting queue stats on every poll
    async fn drain(&self, coordinator: &DownloadCoordinator) {
        let interval = self.crawler.drain_poll_interval();

        loop {
            let stats = coordinator.stats();
            self.reporter.data(EventPayload::Stats(stats));

            if !coordinator.is_busy() {
                break;
            }

            tracing::debug!("Waiting for downloads: {}", stats);
            tokio::time::sleep(interval).await;
        }

        let failed = coordinator.failed_downloads();
        if !failed.is_empty() {
            self.reporter.data(EventPayload::Failures(failed));
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url, None, None).await?;
        Ok(response.text().await?)
    }
}

async fn fetch_item(
    client: Arc<dyn FetchClient>,
    extractor: Arc<dyn Extractor>,
    url: String,
) -> Result<CrawlRecord> {
    let item_url = Url::parse(&url)?;
    let response = client.get(&url, None, None).await?;
    let html = response.text().await?;

    extractor
        .parse_item(&html, &item_url)
        .map_err(|message| HarvestError::Extraction { url, message })
}

/// Tracks the run's phase and logs each transition
struct PhaseTracker {
    phase: CrawlPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: CrawlPhase::Idle,
        }
    }

    fn advance(&mut self, next: CrawlPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::error!("Unexpected crawl phase change {} -> {}", self.phase, next);
        }
        tracing::trace!("Crawl phase {} -> {}", self.phase, next);
        self.phase = next;
    }
}
