//! Database schema definitions
//!
//! Each channel gets its own `resources_<channel>` table with secondary
//! indexes on the searched columns.

use crate::storage::{StorageError, StorageResult};

/// Prefix of every per-channel table
pub const TABLE_PREFIX: &str = "resources_";

/// Connection-level settings applied once when the store is opened
pub const PRAGMAS_SQL: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
";

/// Maps a channel id to its table name
///
/// The id is interpolated into SQL, so anything but ASCII letters, digits
/// and underscores is refused.
pub fn table_name(channel: &str) -> StorageResult<String> {
    if channel.is_empty()
        || !channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StorageError::InvalidChannel(channel.to_string()));
    }
    Ok(format!("{}{}", TABLE_PREFIX, channel))
}

/// SQL creating a channel's table and its indexes
pub fn channel_table_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    message_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    tags TEXT,
    deferred_ref TEXT,
    destination_link TEXT,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_title ON {table}(title);
CREATE INDEX IF NOT EXISTS idx_{table}_tags ON {table}(tags);
"#,
        table = table
    )
}

/// Creates a channel's table if it does not exist yet
pub fn initialize_channel_table(conn: &rusqlite::Connection, table: &str) -> StorageResult<()> {
    conn.execute_batch(&channel_table_sql(table))?;
    Ok(())
}
