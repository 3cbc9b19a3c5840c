//! Configuration module for Channel-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use channel_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! for channel in &config.channels {
//!     println!("{} -> {}", channel.id, channel.url);
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ChannelConfig, Config, CrawlerConfig, ExtractionMode, HttpConfig, LinksConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
