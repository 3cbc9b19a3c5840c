//! Storage module for persisting harvested resources
//!
//! This module handles all database operations for the harvester, including:
//! - One lazily created SQLite table per channel
//! - Idempotent upserts keyed by message id
//! - The unresolved-set, search, and count queries used by the resolver and
//!   the front ends

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{ResourceStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// Stored value marking "resolution attempted, no link found"
pub const UNAVAILABLE_SENTINEL: &str = "N/A";

/// Separator used when tags are serialized into one column
pub const TAG_SEPARATOR: char = ',';

/// One harvested resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Platform message sequence number, unique within a channel
    pub message_id: i64,

    /// Never empty after extraction
    pub title: String,

    /// Hashtags in order of appearance, including the leading '#'
    pub tags: Vec<String>,

    /// Reference page URL for deferred-mode channels
    pub deferred_ref: Option<String>,

    /// State of the external storage link
    pub destination: DestinationLink,

    /// Short excerpt from the message or the reference page
    pub description: Option<String>,

    /// First persist time; `None` until stored
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// Tags joined into their stored form, e.g. "#sci-fi,#drama"
    pub fn tags_string(&self) -> String {
        self.tags.join(&TAG_SEPARATOR.to_string())
    }

    /// Placeholder title for messages with nothing better to offer
    pub fn placeholder_title(message_id: i64) -> String {
        format!("resource_{}", message_id)
    }
}

/// Splits a stored tag column back into its tags
pub fn parse_tags(stored: &str) -> Vec<String> {
    stored
        .split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolution state of a resource's destination link
///
/// "Pending" and "unavailable" are kept apart: pending resources are picked
/// up by the resolver, unavailable ones never are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationLink {
    /// No resolution attempted yet
    Pending,

    /// A validated link on the storage provider
    Found(String),

    /// Resolution attempted and nothing usable was found
    Unavailable,
}

impl DestinationLink {
    pub fn to_db_string(&self) -> &str {
        match self {
            Self::Pending => "",
            Self::Found(url) => url.as_str(),
            Self::Unavailable => UNAVAILABLE_SENTINEL,
        }
    }

    pub fn from_db_string(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            None | Some("") => Self::Pending,
            Some(UNAVAILABLE_SENTINEL) => Self::Unavailable,
            Some(url) => Self::Found(url.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The link itself, if one was found
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Found(url) => Some(url.as_str()),
            _ => None,
        }
    }
}
