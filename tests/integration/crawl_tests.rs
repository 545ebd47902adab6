//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small paginated listing and run the
//! full crawl cycle end-to-end: discovery, item extraction, CSV output and
//! document downloads.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_harvest::config::{Config, UserAgentConfig};
use sumi_harvest::crawler::{
    build_http_client, Controller, CrawlMode, CrawlOrchestrator, CrawlRecord, CrawlRequest,
    HttpFetchClient, PageRange,
};
use sumi_harvest::events::{channel, Event, EventKind, EventPayload, EventSink};
use sumi_harvest::output::{OutputError, OutputResult, RecordWriter, RecordWriterFactory};
use sumi_harvest::HarvestError;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a configuration with short delays for testing
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.crawler.item_delay_ms = 1;
    config.crawler.drain_poll_interval_ms = 10;
    config.downloads.max_retries = 2;
    config
}

fn create_client() -> Arc<HttpFetchClient> {
    let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(5))
        .expect("Failed to build client");
    Arc::new(HttpFetchClient::with_client(client, 0))
}

fn listing_root(title: &str, pages: Option<u32>) -> String {
    let pagination = pages
        .map(|n| {
            format!(
                r#"<div class="homepage-right-inside"><a href="/concursuri/{n}.html">{n}</a></div>"#
            )
        })
        .unwrap_or_default();

    format!(
        r#"<html><body>
        <h1 class="large">{title}</h1>
        {pagination}
        <div class="archive-year">
            <strong><span>2024:</span></strong>
            <a class="archive-month-active" href="/arhiva/Martie/2024/">Martie</a>
            <a class="archive-month-active" href="/arhiva/Aprilie/2024/">Aprilie</a>
        </div>
        </body></html>"#
    )
}

fn listing_page(items: &[&str]) -> String {
    let links: String = items
        .iter()
        .map(|item| format!(r#"<li><a class="newlisting-item" href="{item}">x</a></li>"#))
        .collect();
    format!(r#"<html><body><ul class="top20">{links}</ul></body></html>"#)
}

fn item_page(title: &str, document: &str) -> String {
    format!(
        r#"<html><body>
        <div class="listing-title"><h1 itemprop="name">{title}</h1></div>
        <h2 class="prize_list" itemprop="description">Voucher</h2>
        <span class="value red">Concursul s-a terminat pe 01.05.2024</span>
        <a class="rules-url" href="{document}">Regulament</a>
        </body></html>"#
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn mount_pdf(server: &MockServer, route: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .insert_header("content-type", "application/pdf"),
        )
        .mount(server)
        .await;
}

/// Serves a two-page listing with one item and one document per page
async fn mount_two_page_site(server: &MockServer) {
    mount_html(server, "/concursuri", listing_root("Concursuri terminate", Some(2))).await;
    mount_html(server, "/concursuri/1", listing_page(&["/concurs/a.html"])).await;
    mount_html(server, "/concursuri/2", listing_page(&["/concurs/b.html"])).await;
    mount_html(
        server,
        "/concurs/a.html",
        item_page("Concurs A Martie 2024", "/docs/a.pdf"),
    )
    .await;
    mount_html(
        server,
        "/concurs/b.html",
        item_page("Concurs B Aprilie 2024 - Mai 2024", "/docs/b.pdf"),
    )
    .await;
    mount_pdf(server, "/docs/a.pdf", b"%PDF-1.4 a").await;
    mount_pdf(server, "/docs/b.pdf", b"%PDF-1.4 bb").await;
}

fn drain_events(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn progress_values(events: &[Event]) -> Vec<f64> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .filter_map(|e| e.payload.as_number())
        .collect()
}

fn request(server: &MockServer, mode: CrawlMode, range: PageRange, output: &TempDir) -> CrawlRequest {
    CrawlRequest {
        base_url: format!("{}/concursuri", server.uri()),
        mode,
        range,
        output_location: output.path().to_path_buf(),
    }
}

#[tokio::test]
async fn test_two_page_crawl_writes_records_and_documents() {
    let server = MockServer::start().await;
    mount_two_page_site(&server).await;

    let output = TempDir::new().unwrap();
    let (sink, mut rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();

    let report = orchestrator
        .run(&request(&server, CrawlMode::All, PageRange::new(1, 2), &output))
        .await
        .expect("Crawl failed");

    assert_eq!(report.title, "Concursuri terminate");
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.records_written, 2);
    assert_eq!(report.items_failed, 0);
    assert_eq!(report.documents_enqueued, 2);
    assert_eq!(report.downloads.completed, 2);
    assert_eq!(report.downloads.total, 2);
    assert!(report.failed_downloads.is_empty());

    let documents = output.path().join("regulamente");
    let a = documents.join("Regulament_Concurs A Martie 2024_Martie 2024.pdf");
    let b = documents.join("Regulament_Concurs B Aprilie 2024 - Mai 2024_Aprilie 2024.pdf");
    assert_eq!(std::fs::read(a).unwrap(), b"%PDF-1.4 a");
    assert_eq!(std::fs::read(b).unwrap(), b"%PDF-1.4 bb");

    let mut reader = csv::Reader::from_path(output.path().join("Concursuri terminate.csv")).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "Concurs A Martie 2024");
    assert_eq!(&rows[1][2], "Mai 2024");

    let events = drain_events(&mut rx);
    assert_eq!(progress_values(&events), vec![50.0, 100.0]);

    let count = events
        .iter()
        .find(|e| e.kind == EventKind::Count)
        .expect("No count event");
    assert_eq!(count.payload.as_text(), Some("Found 2 pages on Concursuri terminate"));

    assert!(events.iter().any(|e| e.kind == EventKind::Data));
    assert!(!events.iter().any(|e| e.kind == EventKind::Error));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Complete));
}

#[tokio::test]
async fn test_archived_mode_walks_every_page() {
    let server = MockServer::start().await;
    mount_two_page_site(&server).await;

    let output = TempDir::new().unwrap();
    let (sink, _rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();

    // The caller's range is ignored in archived mode
    let report = orchestrator
        .run(&request(&server, CrawlMode::Archived, PageRange::new(2, 2), &output))
        .await
        .unwrap();

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.records_written, 2);
}

#[tokio::test]
async fn test_missing_page_count_aborts() {
    let server = MockServer::start().await;
    mount_html(&server, "/concursuri", listing_root("Fara paginare", None)).await;

    let output = TempDir::new().unwrap();
    let (sink, mut rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();

    let err = orchestrator
        .run(&request(&server, CrawlMode::All, PageRange::new(1, 2), &output))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Extraction { .. }));

    let events = drain_events(&mut rx);
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Error, EventKind::Complete]);
}

#[tokio::test]
async fn test_failed_listing_page_is_skipped() {
    let server = MockServer::start().await;
    mount_html(&server, "/concursuri", listing_root("Concursuri", Some(2))).await;
    mount_html(&server, "/concursuri/1", listing_page(&["/concurs/a.html"])).await;
    Mock::given(method("GET"))
        .and(path("/concursuri/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/concurs/a.html",
        item_page("Concurs A Martie 2024", "/docs/a.pdf"),
    )
    .await;
    mount_pdf(&server, "/docs/a.pdf", b"%PDF").await;

    let output = TempDir::new().unwrap();
    let (sink, mut rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();

    let report = orchestrator
        .run(&request(&server, CrawlMode::All, PageRange::new(1, 2), &output))
        .await
        .unwrap();

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(report.downloads.completed, 1);

    let events = drain_events(&mut rx);
    assert_eq!(progress_values(&events), vec![50.0, 100.0]);
    assert!(events.iter().any(|e| e.kind == EventKind::Warn));
}

#[tokio::test]
async fn test_broken_items_are_skipped() {
    let server = MockServer::start().await;
    mount_html(&server, "/concursuri", listing_root("Concursuri", Some(1))).await;
    mount_html(
        &server,
        "/concursuri/1",
        listing_page(&["/concurs/a.html", "/concurs/gone.html", "/concurs/empty.html"]),
    )
    .await;
    mount_html(
        &server,
        "/concurs/a.html",
        item_page("Concurs A Martie 2024", "N/A"),
    )
    .await;
    mount_html(&server, "/concurs/empty.html", "<html></html>".to_string()).await;

    let output = TempDir::new().unwrap();
    let (sink, _rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();

    let report = orchestrator
        .run(&request(&server, CrawlMode::All, PageRange::new(1, 1), &output))
        .await
        .unwrap();

    assert_eq!(report.records_written, 1);
    assert_eq!(report.items_failed, 2);
    assert_eq!(report.documents_enqueued, 0);
    assert_eq!(report.downloads.total, 0);
}

#[tokio::test]
async fn test_second_start_while_running_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/concursuri"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_root("Lent", None))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let (sink, mut rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();
    let controller = Controller::new(orchestrator);

    let first = controller
        .start(request(&server, CrawlMode::All, PageRange::new(1, 1), &output))
        .unwrap();
    assert!(controller.is_running());

    let second = controller.start(request(&server, CrawlMode::All, PageRange::new(1, 1), &output));
    assert!(matches!(second, Err(HarvestError::AlreadyRunning)));

    let refused = rx.try_recv().expect("No event for refused start");
    assert_eq!(refused.kind, EventKind::Error);
    assert_eq!(refused.payload.as_text(), Some("Already running a task"));

    // The first run fails on the missing page count, which frees the slot
    assert!(first.wait().await.is_err());
    assert!(!controller.is_running());

    let third = controller
        .start(request(&server, CrawlMode::All, PageRange::new(1, 1), &output))
        .unwrap();
    assert!(third.wait().await.is_err());
}

#[tokio::test]
async fn test_fetch_filters() {
    let server = MockServer::start().await;
    mount_html(&server, "/concursuri", listing_root("Concursuri", Some(12))).await;

    let (sink, _rx) = channel();
    let orchestrator =
        CrawlOrchestrator::new(&create_test_config(), create_client(), Arc::new(sink)).unwrap();
    let controller = Controller::new(orchestrator);

    let filters = controller
        .fetch_filters(&format!("{}/concursuri", server.uri()))
        .await
        .unwrap();

    assert_eq!(filters.max_pages, Some(12));
    assert_eq!(filters.years.len(), 1);
    assert_eq!(filters.years[0].name, "2024");
    assert_eq!(filters.years[0].months.len(), 2);
}

/// Accepts the first batch of records and fails every later one
struct FailingWriterFactory;

struct FailingWriter {
    batches: usize,
}

impl RecordWriter for FailingWriter {
    fn append(&mut self, _records: &[CrawlRecord]) -> OutputResult<()> {
        self.batches += 1;
        if self.batches > 1 {
            return Err(OutputError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        Ok(())
    }

    fn close(&mut self) -> OutputResult<()> {
        Ok(())
    }
}

impl RecordWriterFactory for FailingWriterFactory {
    fn create(&self, _output_location: &Path, _title: &str) -> OutputResult<Box<dyn RecordWriter>> {
        Ok(Box::new(FailingWriter { batches: 0 }))
    }
}

/// Records every event kind and whether `document` exists when `complete` arrives
struct CompletionSink {
    document: PathBuf,
    kinds: Mutex<Vec<EventKind>>,
    document_at_complete: Mutex<Option<bool>>,
}

impl EventSink for CompletionSink {
    fn emit(&self, kind: EventKind, _payload: EventPayload) {
        if kind == EventKind::Complete {
            *self.document_at_complete.lock().unwrap() = Some(self.document.exists());
        }
        self.kinds.lock().unwrap().push(kind);
    }
}

#[tokio::test]
async fn test_output_failure_waits_for_enqueued_documents() {
    let server = MockServer::start().await;
    mount_html(&server, "/concursuri", listing_root("Concursuri terminate", Some(2))).await;
    mount_html(&server, "/concursuri/1", listing_page(&["/concurs/a.html"])).await;
    mount_html(&server, "/concursuri/2", listing_page(&["/concurs/b.html"])).await;
    mount_html(
        &server,
        "/concurs/a.html",
        item_page("Concurs A Martie 2024", "/docs/a.pdf"),
    )
    .await;
    mount_html(
        &server,
        "/concurs/b.html",
        item_page("Concurs B Aprilie 2024", "/docs/b.pdf"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/docs/a.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4 slow".as_slice())
                .insert_header("content-type", "application/pdf")
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;
    mount_pdf(&server, "/docs/b.pdf", b"%PDF-1.4 b").await;

    let output = TempDir::new().unwrap();
    let document = output
        .path()
        .join("regulamente")
        .join("Regulament_Concurs A Martie 2024_Martie 2024.pdf");
    let sink = Arc::new(CompletionSink {
        document: document.clone(),
        kinds: Mutex::new(Vec::new()),
        document_at_complete: Mutex::new(None),
    });

    let orchestrator = CrawlOrchestrator::new(&create_test_config(), create_client(), sink.clone())
        .unwrap()
        .with_writer_factory(Arc::new(FailingWriterFactory));

    let result = orchestrator
        .run(&request(&server, CrawlMode::All, PageRange::new(1, 2), &output))
        .await;

    assert!(matches!(result, Err(HarvestError::Output(_))));
    assert_eq!(*sink.document_at_complete.lock().unwrap(), Some(true));
    assert_eq!(std::fs::read(&document).unwrap(), b"%PDF-1.4 slow");

    let kinds = sink.kinds.lock().unwrap().clone();
    assert!(kinds.contains(&EventKind::Error));
    assert_eq!(kinds.last(), Some(&EventKind::Complete));
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::Complete).count(), 1);
}

#[tokio::test]
async fn test_items_on_a_page_are_fetched_concurrently() {
    let server = MockServer::start().await;
    let items = ["/concurs/1.html", "/concurs/2.html", "/concurs/3.html", "/concurs/4.html"];
    mount_html(&server, "/concursuri", listing_root("Concursuri", Some(1))).await;
    mount_html(&server, "/concursuri/1", listing_page(&items)).await;

    for (index, item) in items.iter().enumerate() {
        let document = format!("/docs/{}.pdf", index + 1);
        Mock::given(method("GET"))
            .and(path(*item))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(item_page(&format!("Concurs {} Martie 2024", index + 1), &document))
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        mount_pdf(&server, &document, b"%PDF-1.4").await;
    }

    let mut config = create_test_config();
    config.crawler.item_delay_ms = 50;

    let output = TempDir::new().unwrap();
    let (sink, _rx) = channel();
    let orchestrator = CrawlOrchestrator::new(&config, create_client(), Arc::new(sink)).unwrap();

    let started = Instant::now();
    let report = orchestrator
        .run(&request(&server, CrawlMode::All, PageRange::new(1, 1), &output))
        .await
        .expect("Crawl failed");
    let elapsed = started.elapsed();

    assert_eq!(report.records_written, 4);
    assert_eq!(report.downloads.completed, 4);

    // One-at-a-time fetching would need at least 4 x 500ms
    assert!(elapsed >= Duration::from_millis(500), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);

    let mut reader = csv::Reader::from_path(output.path().join("Concursuri.csv")).unwrap();
    let titles: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect();
    assert_eq!(
        titles,
        vec![
            "Concurs 1 Martie 2024",
            "Concurs 2 Martie 2024",
            "Concurs 3 Martie 2024",
            "Concurs 4 Martie 2024",
        ]
    );
}
