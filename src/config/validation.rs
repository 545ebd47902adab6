use crate::config::types::{Config, CrawlerConfig, DownloadConfig, SelectorConfig, UserAgentConfig};
use crate::ConfigError;
use scraper::Selector;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_download_config(&config.downloads)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_selectors(&config.selectors)?;
    Ok(())
}

/// Validates page traversal configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.drain_poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "drain_poll_interval_ms must be >= 10ms, got {}ms",
            config.drain_poll_interval_ms
        )));
    }

    if config.request_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be >= 1ms".to_string(),
        ));
    }

    if config.retries > 10 {
        return Err(ConfigError::Validation(format!(
            "retries must be <= 10, got {}",
            config.retries
        )));
    }

    Ok(())
}

/// Validates document download configuration
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "timeout_ms must be >= 1ms".to_string(),
        ));
    }

    if config.max_file_size < 1 {
        return Err(ConfigError::Validation(
            "max_file_size must be >= 1 byte".to_string(),
        ));
    }

    validate_directory(&config.directory)?;

    if config.allowed_content_types.is_empty() {
        return Err(ConfigError::Validation(
            "allowed_content_types cannot be empty".to_string(),
        ));
    }

    for content_type in &config.allowed_content_types {
        validate_content_type(content_type)?;
    }

    Ok(())
}

/// The download directory is a single relative path component
fn validate_directory(directory: &str) -> Result<(), ConfigError> {
    if directory.is_empty() {
        return Err(ConfigError::Validation(
            "download directory cannot be empty".to_string(),
        ));
    }

    if directory == "." || directory == ".." || directory.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "download directory must be a plain directory name, got '{}'",
            directory
        )));
    }

    Ok(())
}

/// Validates a `type/subtype` content type string
fn validate_content_type(content_type: &str) -> Result<(), ConfigError> {
    let mut parts = content_type.split('/');
    let (Some(kind), Some(subtype), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ConfigError::InvalidContentType(content_type.to_string()));
    };

    let token_ok = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
    };

    if !token_ok(kind) || !token_ok(subtype) {
        return Err(ConfigError::InvalidContentType(content_type.to_string()));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.value.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user agent cannot be empty".to_string(),
        ));
    }

    if config.value.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(
            "user agent cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Every configured selector must parse
fn validate_selectors(config: &SelectorConfig) -> Result<(), ConfigError> {
    for (key, selector) in config.entries() {
        Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
            selector: format!("{} = {}", key, selector),
            message: format!("{:?}", e),
        })?;
    }

    if config.campaign_type_label.trim().is_empty() {
        return Err(ConfigError::Validation(
            "campaign_type_label cannot be empty".to_string(),
        ));
    }

    Ok(())
}
