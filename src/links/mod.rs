//! Link handling module for Channel-Harvest
//!
//! This module knows what the interesting links look like: destination links
//! on the external storage provider, reference pages of deferred-mode
//! channels, and the paginated channel page URLs themselves.

mod host;
mod reference;

use crate::config::LinksConfig;
use crate::ConfigError;
use regex::Regex;
use url::Url;

// Re-export main functions
pub use host::{extract_host, host_matches, matches_wildcard};
pub use reference::title_from_reference_url;

/// Query parameter carrying the pagination cursor
pub const CURSOR_PARAM: &str = "before";

/// Compiled link rules shared by the extractor and the resolver
#[derive(Debug, Clone)]
pub struct LinkRules {
    provider_domains: Vec<String>,
    reference_domain: String,
    inline_patterns: Vec<Regex>,
}

impl LinkRules {
    /// Builds the rules from configuration, compiling the inline patterns
    pub fn from_config(config: &LinksConfig) -> Result<Self, ConfigError> {
        let inline_patterns = config
            .inline_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            provider_domains: config
                .provider_domains
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            reference_domain: config.reference_domain.to_lowercase(),
            inline_patterns,
        })
    }

    /// Returns true if `url` points at the external storage provider
    ///
    /// This predicate gates acceptance of every destination link.
    pub fn is_destination_link(&self, url: &str) -> bool {
        host_matches(&self.provider_domains, url)
    }

    /// Returns true if `url` points at a reference page
    pub fn is_reference_link(&self, url: &str) -> bool {
        match extract_host(url) {
            Some(host) => matches_wildcard(&format!("*.{}", self.reference_domain), &host),
            None => false,
        }
    }

    /// Searches free text for a link matching the inline patterns, in order
    pub fn find_inline_link(&self, text: &str) -> Option<String> {
        self.inline_patterns
            .iter()
            .find_map(|pattern| pattern.find(text))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for LinkRules {
    fn default() -> Self {
        // The default patterns are literals known to compile
        Self::from_config(&LinksConfig::default()).unwrap_or_else(|_| Self {
            provider_domains: LinksConfig::default().provider_domains,
            reference_domain: LinksConfig::default().reference_domain,
            inline_patterns: Vec::new(),
        })
    }
}

/// Builds the URL of one page of a channel's message list
///
/// Without a cursor the newest page is requested; with one, the page of
/// messages strictly older than it.
pub fn page_url(base: &str, before: Option<i64>) -> Result<String, ::url::ParseError> {
    let mut url = Url::parse(base)?;
    if let Some(cursor) = before {
        url.query_pairs_mut()
            .append_pair(CURSOR_PARAM, &cursor.to_string());
    }
    Ok(url.to_string())
}
