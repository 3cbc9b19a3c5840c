use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Main configuration structure for Channel-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(rename = "channel", default)]
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    /// Looks up a configured channel by its identifier
    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Identifiers of every configured channel, in configuration order
    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.id.clone()).collect()
    }
}

/// Crawl pacing and stop-condition configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Delay after every request before control returns (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Backoff between retries of a failed page during a full crawl (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Transport-level timeout for a single request (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Consecutive already-known messages that end an incremental crawl
    #[serde(rename = "known-streak-threshold")]
    pub known_streak_threshold: u32,

    /// Running-total multiple at which a full crawl writes its checkpoint
    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u64,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1000,
            retry_delay_ms: 10_000,
            request_timeout_secs: 30,
            known_streak_threshold: 20,
            checkpoint_interval: 100,
        }
    }
}

/// Header set shared by every request of a session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    pub accept: String,

    #[serde(rename = "accept-language")]
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        }
    }
}

/// Locations of persisted state
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON checkpoint of an interrupted full crawl
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/resources.db".to_string(),
            checkpoint_path: "data/crawl_state.json".to_string(),
        }
    }
}

/// Recognised link shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Host patterns of the external storage provider (e.g. "115cdn.com" or "*.115cdn.com")
    #[serde(rename = "provider-domains")]
    pub provider_domains: Vec<String>,

    /// Host serving the reference pages of deferred-mode channels
    #[serde(rename = "reference-domain")]
    pub reference_domain: String,

    /// Regular expressions tried in order against message text when no anchor matched
    #[serde(rename = "inline-patterns")]
    pub inline_patterns: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            provider_domains: vec!["115cdn.com".to_string()],
            reference_domain: "telegra.ph".to_string(),
            inline_patterns: vec![
                r"https?://115cdn\.com/s/[a-zA-Z0-9]+\?password=[a-zA-Z0-9]+".to_string(),
                r"https?://115\.com/s/[a-zA-Z0-9]+".to_string(),
            ],
        }
    }
}

/// A configured channel
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Identifier, also used to name the channel's table
    pub id: String,

    /// Public rendering of the message list, e.g. "https://t.me/s/example"
    pub url: String,

    /// Display name
    pub name: String,

    /// How resources are laid out in this channel's messages
    pub mode: ExtractionMode,
}

/// Per-channel message layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// The message links to a reference page holding the destination link
    #[serde(alias = "telegraph")]
    Deferred,

    /// The destination link is in the message body
    Inline,

    /// The destination link sits behind a "click to go" button
    Button,
}

impl ExtractionMode {
    /// Returns true if resources of this mode need a second fetch
    pub fn needs_resolution(&self) -> bool {
        matches!(self, Self::Deferred)
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deferred => "deferred",
            Self::Inline => "inline",
            Self::Button => "button",
        };
        f.write_str(name)
    }
}
