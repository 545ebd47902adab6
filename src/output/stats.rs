//! Run summaries for the terminal
//!
//! This module renders a finished [`CrawlReport`] and the archive filter
//! query for stdout.

use crate::crawler::{ArchiveFilters, CrawlReport};
use crate::downloads::QueueStats;

/// Share of terminal downloads that completed, as a percentage
pub fn download_success_rate(stats: &QueueStats) -> f64 {
    let terminal = stats.completed + stats.failed;
    if terminal == 0 {
        return 0.0;
    }
    (stats.completed as f64 / terminal as f64) * 100.0
}

/// Prints a run report to stdout in a formatted manner
pub fn print_report(report: &CrawlReport) {
    println!("=== Harvest Report: {} ===\n", report.title);

    println!("Pages:");
    println!("  Visited: {}", report.pages_visited);
    if report.pages_skipped > 0 {
        println!("  Skipped: {}", report.pages_skipped);
    }
    println!();

    println!("Records:");
    println!("  Written: {}", report.records_written);
    println!("  Items failed: {}", report.items_failed);
    println!("  Documents enqueued: {}", report.documents_enqueued);
    println!();

    println!("Downloads:");
    println!("  {}", report.downloads);
    println!(
        "  Success Rate: {:.1}% ({} / {} documents)",
        download_success_rate(&report.downloads),
        report.downloads.completed,
        report.downloads.completed + report.downloads.failed
    );

    if !report.failed_downloads.is_empty() {
        println!();
        println!("Failed Downloads ({}):", report.failed_downloads.len());
        for failed in &report.failed_downloads {
            println!(
                "  - {} after {} attempts: {}",
                failed.id, failed.retries, failed.error
            );
            println!("    {}", failed.url);
        }
    }
}

/// Prints the archive years and page count of a listing
pub fn print_filters(filters: &ArchiveFilters) {
    match filters.max_pages {
        Some(pages) => println!("Pages: {}", pages),
        None => println!("Pages: unknown"),
    }

    println!("\nArchive ({} years):", filters.years.len());
    for year in &filters.years {
        let months: Vec<&str> = year.months.iter().map(|m| m.name.as_str()).collect();
        println!("  {}: {}", year.name, months.join(", "));
    }
}
