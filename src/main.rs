//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest listing harvester.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_harvest::config::{load_or_default, Config};
use sumi_harvest::crawler::{
    Controller, CrawlMode, CrawlOrchestrator, CrawlRequest, HttpFetchClient, PageRange,
};
use sumi_harvest::events::TracingSink;
use sumi_harvest::output::{print_filters, print_report};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Sumi-Harvest: a polite listing harvester
///
/// Sumi-Harvest walks a paginated listing, writes one CSV row per detail
/// page and downloads the documents those pages reference.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite listing harvester", long_about = None)]
struct Cli {
    /// Listing root URL; page N is fetched from <URL>/N
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Which pages to walk: "all" uses --start/--end, "archived" every page
    #[arg(short, long, default_value = "all")]
    mode: CrawlMode,

    /// First page to visit (all mode); pages are numbered from 1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    start: u32,

    /// Last page to visit, inclusive (all mode)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    end: u32,

    /// Directory for the CSV file and the downloaded documents
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "filters")]
    dry_run: bool,

    /// Show the listing's archive years and page count and exit
    #[arg(long, conflicts_with = "dry_run")]
    filters: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) =
        load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    match (&cli.config, config_hash) {
        (Some(path), Some(hash)) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        ),
        _ => tracing::info!("No configuration file given, using defaults"),
    }

    Url::parse(&cli.url).with_context(|| format!("Invalid listing URL: {}", cli.url))?;

    if cli.mode == CrawlMode::All && cli.start > cli.end {
        bail!("--start ({}) must not be after --end ({})", cli.start, cli.end);
    }

    if cli.dry_run {
        handle_dry_run(&cli, &config);
        return Ok(());
    }

    let client = HttpFetchClient::new(&config).context("Failed to build HTTP client")?;
    let orchestrator = CrawlOrchestrator::new(&config, Arc::new(client), Arc::new(TracingSink))?;
    let controller = Controller::new(orchestrator);

    if cli.filters {
        let filters = controller
            .fetch_filters(&cli.url)
            .await
            .context("Failed to read listing filters")?;
        print_filters(&filters);
        return Ok(());
    }

    handle_harvest(&cli, &controller).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(cli: &Cli, config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Listing: {}", cli.url);
    match cli.mode {
        CrawlMode::All => println!("Pages: {} to {}", cli.start, cli.end),
        CrawlMode::Archived => println!("Pages: every page of the listing"),
    }
    println!("Output: {}", cli.output.display());

    println!("\nCrawler Configuration:");
    println!("  Item delay: {}ms", config.crawler.item_delay_ms);
    println!(
        "  Drain poll interval: {}ms",
        config.crawler.drain_poll_interval_ms
    );
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!("  Retries: {}", config.crawler.retries);

    println!("\nDownloads:");
    println!("  Max concurrent: {}", config.downloads.max_concurrent);
    println!("  Max retries: {}", config.downloads.max_retries);
    println!("  Timeout: {}ms", config.downloads.timeout_ms);
    println!("  Max file size: {} bytes", config.downloads.max_file_size);
    println!(
        "  Directory: {}",
        cli.output.join(&config.downloads.directory).display()
    );
    println!(
        "  Allowed content types: {}",
        config.downloads.allowed_content_types.join(", ")
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.value);

    println!("\n✓ Configuration is valid");
}

/// Handles the main harvest operation
async fn handle_harvest(cli: &Cli, controller: &Controller) -> anyhow::Result<()> {
    let request = CrawlRequest {
        base_url: cli.url.clone(),
        mode: cli.mode,
        range: PageRange::new(cli.start, cli.end),
        output_location: cli.output.clone(),
    };

    let ticket = controller.start(request)?;
    tracing::debug!("Waiting for run {}", ticket.id());

    match ticket.wait().await {
        Ok(report) => {
            tracing::info!("Harvest completed successfully");
            if !cli.quiet {
                print_report(&report);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
