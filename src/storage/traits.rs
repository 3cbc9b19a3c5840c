//! Storage traits and error types
//!
//! This module defines the trait interface for resource stores and
//! associated error types.

use crate::storage::Resource;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid channel identifier: {0}")]
    InvalidChannel(String),

    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for resource store implementations
///
/// Every operation is scoped to one channel's isolated table, created on
/// first use. Implementations must make each upsert a single atomic unit.
pub trait ResourceStore: Send + Sync {
    /// Checks whether a message has already been stored
    fn exists(&self, channel: &str, message_id: i64) -> StorageResult<bool>;

    /// Inserts or replaces a resource keyed by its message id
    ///
    /// All fields are overwritten. A supplied `created_at` is written as is;
    /// when it is `None`, new rows are stamped with the current time and
    /// existing rows keep their stored time.
    fn upsert(&self, channel: &str, resource: &Resource) -> StorageResult<()>;

    /// Fetches one resource by message id
    fn get(&self, channel: &str, message_id: i64) -> StorageResult<Option<Resource>>;

    /// Resources whose destination link has not been resolved yet, newest first
    fn unresolved(&self, channel: &str, limit: usize) -> StorageResult<Vec<Resource>>;

    /// Substring search over title and tags, newest first
    ///
    /// Resources marked unavailable are never returned. Without a channel,
    /// every configured channel is searched and the results concatenated.
    fn search(&self, keyword: &str, channel: Option<&str>)
        -> StorageResult<Vec<(String, Resource)>>;

    /// Most recent resources of a channel, newest first
    fn list_all(&self, channel: &str, limit: usize) -> StorageResult<Vec<Resource>>;

    /// Highest stored message id, or 0 for an empty channel
    fn latest_message_id(&self, channel: &str) -> StorageResult<i64>;

    /// Number of stored resources
    fn count(&self, channel: &str) -> StorageResult<u64>;

    /// Number of stored resources still awaiting resolution
    fn count_unresolved(&self, channel: &str) -> StorageResult<u64>;
}
