use serde::Deserialize;
use std::time::Duration;

/// Document types accepted when no allow-list is configured
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] =
    &["application/pdf", "text/html", "application/msword"];

/// Default browser-like user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for Sumi-Harvest
///
/// Every section has defaults, so an empty file (or no file) yields a
/// working configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub downloads: DownloadConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub selectors: SelectorConfig,
}

/// Page traversal configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Delay between starting successive item fetches within a page (milliseconds)
    #[serde(rename = "item-delay-ms")]
    pub item_delay_ms: u64,

    /// Interval between download queue polls while draining (milliseconds)
    #[serde(rename = "drain-poll-interval-ms")]
    pub drain_poll_interval_ms: u64,

    /// Timeout for listing and item page requests (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Transport-level retries for transient failures
    pub retries: u32,
}

impl CrawlerConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: 50,
            drain_poll_interval_ms: 3000,
            request_timeout_ms: 30_000,
            retries: 2,
        }
    }
}

/// Document download configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum number of documents downloading at once
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: u32,

    /// Attempts per document before it is recorded as failed
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Timeout for a single document request (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum size of a single document (bytes)
    #[serde(rename = "max-file-size")]
    pub max_file_size: u64,

    /// Directory under the output location that receives documents
    pub directory: String,

    /// Content types accepted for download
    #[serde(rename = "allowed-content-types")]
    pub allowed_content_types: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_retries: 3,
            timeout_ms: 5000,
            max_file_size: 50 * 1024 * 1024,
            directory: "regulamente".to_string(),
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// User agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// The User-Agent header value
    pub value: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            value: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// CSS selectors used by the default extractor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    #[serde(rename = "listing-title")]
    pub listing_title: String,

    /// The last match carries the highest page number
    #[serde(rename = "pagination-link")]
    pub pagination_link: String,

    #[serde(rename = "item-link")]
    pub item_link: String,

    #[serde(rename = "item-title")]
    pub item_title: String,

    pub incentive: String,

    #[serde(rename = "end-date")]
    pub end_date: String,

    /// Text stripped from the front of the end date
    #[serde(rename = "end-date-prefix")]
    pub end_date_prefix: String,

    pub source: String,

    /// Element whose text contains `campaign-type-label`
    #[serde(rename = "campaign-type-item")]
    pub campaign_type_item: String,

    #[serde(rename = "campaign-type-label")]
    pub campaign_type_label: String,

    #[serde(rename = "campaign-type-value")]
    pub campaign_type_value: String,

    pub mechanics: String,

    #[serde(rename = "document-link")]
    pub document_link: String,

    #[serde(rename = "archive-year")]
    pub archive_year: String,

    #[serde(rename = "archive-year-name")]
    pub archive_year_name: String,

    #[serde(rename = "archive-month")]
    pub archive_month: String,
}

impl SelectorConfig {
    /// Returns every selector with its config key, for validation
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("listing-title", &self.listing_title),
            ("pagination-link", &self.pagination_link),
            ("item-link", &self.item_link),
            ("item-title", &self.item_title),
            ("incentive", &self.incentive),
            ("end-date", &self.end_date),
            ("source", &self.source),
            ("campaign-type-item", &self.campaign_type_item),
            ("campaign-type-value", &self.campaign_type_value),
            ("mechanics", &self.mechanics),
            ("document-link", &self.document_link),
            ("archive-year", &self.archive_year),
            ("archive-year-name", &self.archive_year_name),
            ("archive-month", &self.archive_month),
        ]
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_title: "h1.large".to_string(),
            pagination_link: ".homepage-right-inside a".to_string(),
            item_link: "ul.top20 a.newlisting-item".to_string(),
            item_title: "div.listing-title h1[itemprop='name']".to_string(),
            incentive: "h2.prize_list[itemprop='description']".to_string(),
            end_date: "span.value.red".to_string(),
            end_date_prefix: "Concursul s-a terminat pe".to_string(),
            source: "li .value.strong a#primary_url".to_string(),
            campaign_type_item: "li".to_string(),
            campaign_type_label: "Tip concurs:".to_string(),
            campaign_type_value: "span.value.strong".to_string(),
            mechanics: "div.listing-user-action p".to_string(),
            document_link: "a.rules-url".to_string(),
            archive_year: ".archive-year".to_string(),
            archive_year_name: "strong span".to_string(),
            archive_month: "a.archive-month-active".to_string(),
        }
    }
}
