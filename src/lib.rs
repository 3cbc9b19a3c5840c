//! Channel-Harvest: a resumable harvester for public channel archives
//!
//! This crate pages through the public web rendering of messaging channels,
//! extracts resource records (title, tags, storage link) from each message
//! according to the channel's extraction mode, and persists them so that long
//! crawls can be interrupted and resumed without loss or duplication.

pub mod config;
pub mod crawler;
pub mod links;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Channel-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Another task is already running: {active}")]
    Busy { active: state::ActiveTask },

    #[error("No pending task for channel {channel}")]
    NoPendingTask { channel: String },

    #[error("Channel {channel} has no stored resources; run a full crawl first")]
    EmptyChannel { channel: String },

    #[error("Resource {message_id} not found in channel {channel}")]
    ResourceNotFound { channel: String, message_id: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for errors caused by configuration rather than by the
    /// state of the source or the store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownChannel(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid link pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for Channel-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{ChannelConfig, Config, ExtractionMode};
pub use crawler::{ChannelFetcher, DeferredLinkResolver, MessageExtractor, Orchestrator};
pub use links::LinkRules;
pub use state::{CrawlCheckpoint, CrawlMode, CrawlOutcome, CrawlReport};
pub use storage::{DestinationLink, Resource, ResourceStore, SqliteStore};
