//! Crawler module for listing traversal and page processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic ([`FetchClient`], [`HttpFetchClient`])
//! - HTML extraction of listings, items and archive filters
//! - The page-by-page crawl state machine ([`CrawlOrchestrator`])
//! - The single-slot run controller ([`Controller`])

mod control;
mod fetcher;
mod orchestrator;
mod parser;

pub use control::{Controller, RunTicket};
pub use fetcher::{
    build_http_client, document_headers, ByteStream, FetchClient, FetchResponse, HttpFetchClient,
};
pub use orchestrator::{
    ArchiveFilters, CrawlMode, CrawlOrchestrator, CrawlReport, CrawlRequest, PageRange,
};
pub use parser::{
    ArchiveMonth, CrawlRecord, Extractor, ListingSummary, SelectorExtractor, YearArchive,
    NOT_AVAILABLE,
};
