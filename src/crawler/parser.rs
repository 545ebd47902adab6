//! HTML extraction for listing and detail pages
//!
//! This module turns fetched HTML into:
//! - A [`ListingSummary`] (title and page count) from the listing root
//! - The item links on a listing page
//! - A [`CrawlRecord`] from each item's detail page
//! - The archive filter tree ([`YearArchive`]) from the listing footer
//!
//! The orchestrator only depends on the [`Extractor`] trait. The default
//! [`SelectorExtractor`] is driven entirely by CSS selectors from the
//! configuration.

use crate::config::SelectorConfig;
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

/// Value recorded for a text field the page does not provide
pub const NOT_AVAILABLE: &str = "N/A";

/// Summary of the listing root page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSummary {
    /// Human title of the listing
    pub title: String,

    /// Highest page number, if the pagination could be read
    pub max_pages: Option<u32>,

    /// Base link of the last pagination entry, with any trailing `*.html` removed
    pub link: Option<String>,
}

/// A structured record extracted from one detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlRecord {
    pub title: String,
    pub start_period: String,
    pub end_period: String,
    pub incentive: String,
    pub end_date: String,
    pub source: String,
    pub campaign_type: String,
    pub prizes: String,
    pub mechanics: String,
    /// Absolute URL of the referenced document, if any
    pub document_url: Option<String>,
    /// The detail page this record was parsed from
    pub item_url: String,
}

impl CrawlRecord {
    /// The document reference, unless absent or the "no document" marker
    pub fn document(&self) -> Option<&str> {
        self.document_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && *url != NOT_AVAILABLE)
    }

    /// Identifier used for the downloaded document
    pub fn document_id(&self) -> String {
        format!("Regulament_{}_{}", self.title, self.start_period)
    }
}

/// One month entry in the archive footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMonth {
    pub name: String,
    pub link: String,
}

/// One year entry in the archive footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearArchive {
    pub name: String,
    pub months: Vec<ArchiveMonth>,
}

/// Extraction rules consumed by the orchestrator
pub trait Extractor: Send + Sync {
    /// Reads the listing title and page count from the listing root
    fn listing_summary(&self, html: &str) -> ListingSummary;

    /// Returns the absolute detail-page URLs on a listing page
    fn item_links(&self, html: &str, base_url: &Url) -> Vec<String>;

    /// Parses a detail page into a record
    ///
    /// Returns a description of the problem when the page does not look like
    /// a detail page.
    fn parse_item(&self, html: &str, item_url: &Url) -> Result<CrawlRecord, String>;

    /// Reads the archive year/month tree from the listing footer
    fn archive(&self, html: &str) -> Vec<YearArchive>;
}

struct Selectors {
    listing_title: Selector,
    pagination_link: Selector,
    item_link: Selector,
    item_title: Selector,
    incentive: Selector,
    end_date: Selector,
    source: Selector,
    campaign_type_item: Selector,
    campaign_type_value: Selector,
    mechanics: Selector,
    document_link: Selector,
    archive_year: Selector,
    archive_year_name: Selector,
    archive_month: Selector,
}

/// [`Extractor`] built from configured CSS selectors
pub struct SelectorExtractor {
    selectors: Selectors,
    end_date_prefix: String,
    campaign_type_label: String,
    start_period: Regex,
    end_period: Regex,
    html_suffix: Regex,
    digits: Regex,
}

const MONTHS: &str =
    "Ianuarie|Februarie|Martie|Aprilie|Mai|Iunie|Iulie|August|Septembrie|Octombrie|Noiembrie|Decembrie";

impl SelectorExtractor {
    /// Compiles the configured selectors
    pub fn new(config: &SelectorConfig) -> Result<Self, ConfigError> {
        let selectors = Selectors {
            listing_title: compile(&config.listing_title)?,
            pagination_link: compile(&config.pagination_link)?,
            item_link: compile(&config.item_link)?,
            item_title: compile(&config.item_title)?,
            incentive: compile(&config.incentive)?,
            end_date: compile(&config.end_date)?,
            source: compile(&config.source)?,
            campaign_type_item: compile(&config.campaign_type_item)?,
            campaign_type_value: compile(&config.campaign_type_value)?,
            mechanics: compile(&config.mechanics)?,
            document_link: compile(&config.document_link)?,
            archive_year: compile(&config.archive_year)?,
            archive_year_name: compile(&config.archive_year_name)?,
            archive_month: compile(&config.archive_month)?,
        };

        Ok(Self {
            selectors,
            end_date_prefix: config.end_date_prefix.clone(),
            campaign_type_label: config.campaign_type_label.clone(),
            start_period: pattern(&format!(r"(?i)(?:{}) \d{{4}}", MONTHS))?,
            end_period: pattern(&format!(r"(?i)-\s*((?:{}) \d{{4}})", MONTHS))?,
            html_suffix: pattern(r"/[^/]*\.html$")?,
            digits: pattern(r"\d+")?,
        })
    }

    /// Extractor with the default selectors
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(&SelectorConfig::default())
    }

    fn campaign_type(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.campaign_type_item)
            .filter(|item| element_text(item).contains(&self.campaign_type_label))
            .flat_map(|item| item.select(&self.selectors.campaign_type_value))
            .map(|value| element_text(&value).trim().to_string())
            .find(|text| !text.is_empty())
    }
}

impl Extractor for SelectorExtractor {
    fn listing_summary(&self, html: &str) -> ListingSummary {
        let document = Html::parse_document(html);

        let title = joined_text(&document, &self.selectors.listing_title);
        let last_link = document.select(&self.selectors.pagination_link).last();

        let link = last_link
            .and_then(|element| element.value().attr("href"))
            .map(|href| self.html_suffix.replace(href, "/").into_owned());

        let max_pages = last_link
            .map(|element| element_text(&element))
            .and_then(|text| {
                self.digits
                    .find(&text)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
            });

        ListingSummary {
            title,
            max_pages,
            link,
        }
    }

    fn item_links(&self, html: &str, base_url: &Url) -> Vec<String> {
        let document = Html::parse_document(html);

        document
            .select(&self.selectors.item_link)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, base_url))
            .collect()
    }

    fn parse_item(&self, html: &str, item_url: &Url) -> Result<CrawlRecord, String> {
        let document = Html::parse_document(html);

        let title = joined_text(&document, &self.selectors.item_title);
        if title.is_empty() {
            return Err("detail page has no title".to_string());
        }

        let start_period = self
            .start_period
            .find(&title)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let end_period = self
            .end_period
            .captures(&title)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| start_period.clone());

        let incentive = joined_text(&document, &self.selectors.incentive);

        let end_date_text = joined_text(&document, &self.selectors.end_date);
        let end_date = end_date_text
            .replacen(&self.end_date_prefix, "", 1)
            .trim()
            .to_string();

        let source = first_attr(&document, &self.selectors.source, "href")
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let campaign_type = self
            .campaign_type(&document)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let prizes = or_not_available(incentive.clone());

        let mechanics = document
            .select(&self.selectors.mechanics)
            .next()
            .map(|element| element_text(&element).trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let document_url = first_attr(&document, &self.selectors.document_link, "href")
            .and_then(|href| resolve_document_link(&href, item_url));

        Ok(CrawlRecord {
            title,
            start_period,
            end_period,
            incentive,
            end_date,
            source,
            campaign_type,
            prizes,
            mechanics,
            document_url,
            item_url: item_url.to_string(),
        })
    }

    fn archive(&self, html: &str) -> Vec<YearArchive> {
        let document = Html::parse_document(html);
        let mut archives = Vec::new();

        for year in document.select(&self.selectors.archive_year) {
            let name = year
                .select(&self.selectors.archive_year_name)
                .next()
                .map(|element| element_text(&element))
                .map(|text| text.trim().trim_end_matches(':').to_string())
                .unwrap_or_default();

            if name.is_empty() {
                continue;
            }

            let months = year
                .select(&self.selectors.archive_month)
                .map(|month| ArchiveMonth {
                    name: element_text(&month).trim().to_string(),
                    link: month.value().attr("href").unwrap_or_default().to_string(),
                })
                .collect();

            archives.push(YearArchive { name, months });
        }

        archives
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn pattern(source: &str) -> Result<Regex, ConfigError> {
    Regex::new(source).map_err(|e| ConfigError::Validation(format!("bad pattern: {}", e)))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Text of every match, concatenated and trimmed
fn joined_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .map(|element| element_text(&element))
        .collect::<String>()
        .trim()
        .to_string()
}

fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn or_not_available(text: String) -> String {
    if text.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        text
    }
}

/// Resolves a document href, keeping the "no document" marker out
fn resolve_document_link(href: &str, item_url: &Url) -> Option<String> {
    if href == NOT_AVAILABLE {
        return None;
    }
    resolve_link(href, item_url)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
