use crate::config::types::{ChannelConfig, Config, CrawlerConfig, LinksConfig, StorageConfig};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_links_config(&config.links)?;
    validate_channels(&config.channels)?;
    Ok(())
}

/// Validates crawl pacing and stop conditions
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.known_streak_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "known_streak_threshold must be >= 1, got {}",
            config.known_streak_threshold
        )));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates provider domains, the reference domain, and inline patterns
fn validate_links_config(config: &LinksConfig) -> Result<(), ConfigError> {
    if config.provider_domains.is_empty() {
        return Err(ConfigError::Validation(
            "provider_domains must list at least one domain".to_string(),
        ));
    }

    for pattern in &config.provider_domains {
        validate_domain_pattern(pattern)?;
    }

    validate_domain_string(&config.reference_domain)?;

    for pattern in &config.inline_patterns {
        Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))?;
    }

    Ok(())
}

/// Validates channel entries
///
/// Channel ids name database tables, so they are restricted to ASCII
/// letters, digits and underscores.
fn validate_channels(channels: &[ChannelConfig]) -> Result<(), ConfigError> {
    if channels.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[channel]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for channel in channels {
        validate_channel_id(&channel.id)?;

        if !seen.insert(channel.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate channel id '{}'",
                channel.id
            )));
        }

        let url = Url::parse(&channel.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid URL for channel '{}': {}", channel.id, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Channel URL '{}' must use HTTP(S)",
                channel.url
            )));
        }

        if channel.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Channel '{}' needs a display name",
                channel.id
            )));
        }
    }

    Ok(())
}

pub(crate) fn validate_channel_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Validation(
            "channel id cannot be empty".to_string(),
        ));
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "channel id must contain only ASCII letters, digits and '_', got '{}'",
            id
        )));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
