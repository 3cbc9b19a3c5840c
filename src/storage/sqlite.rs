//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ResourceStore
//! trait. A connection is opened per operation so that no transaction is
//! ever held across a network call.

use crate::storage::schema::{initialize_channel_table, table_name, PRAGMAS_SQL};
use crate::storage::traits::{ResourceStore, StorageResult};
use crate::storage::{parse_tags, DestinationLink, Resource, UNAVAILABLE_SENTINEL};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const COLUMNS: &str =
    "message_id, title, tags, deferred_ref, destination_link, description, created_at";

/// SQLite resource store
pub struct SqliteStore {
    path: PathBuf,

    /// Channels searched when no channel is given
    channels: Vec<String>,

    /// Tables already created during this process
    initialized: Mutex<HashSet<String>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `channels` - Every configured channel id, used by cross-channel search
    pub fn open(path: &Path, channels: Vec<String>) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS_SQL)?;

        Ok(Self {
            path: path.to_path_buf(),
            channels,
            initialized: Mutex::new(HashSet::new()),
        })
    }

    fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Resolves the channel's table, creating it on first use
    fn table(&self, conn: &Connection, channel: &str) -> StorageResult<String> {
        let table = table_name(channel)?;

        let mut initialized = self
            .initialized
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !initialized.contains(&table) {
            initialize_channel_table(conn, &table)?;
            initialized.insert(table.clone());
        }

        Ok(table)
    }

    fn query_resources(
        &self,
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<Resource>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_resource)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_where(&self, channel: &str, condition: &str) -> StorageResult<u64> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", table, condition),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl ResourceStore for SqliteStore {
    fn exists(&self, channel: &str, message_id: i64) -> StorageResult<bool> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE message_id = ?1", table),
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert(&self, channel: &str, resource: &Resource) -> StorageResult<()> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;

        let supplied_created_at = resource.created_at.map(|t| t.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        conn.execute(
            &format!(
                "INSERT INTO {table} ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, ?8))
                 ON CONFLICT(message_id) DO UPDATE SET
                     title = excluded.title,
                     tags = excluded.tags,
                     deferred_ref = excluded.deferred_ref,
                     destination_link = excluded.destination_link,
                     description = excluded.description,
                     created_at = COALESCE(?7, {table}.created_at)",
                table = table,
                COLUMNS = COLUMNS
            ),
            params![
                resource.message_id,
                resource.title,
                resource.tags_string(),
                resource.deferred_ref,
                resource.destination.to_db_string(),
                resource.description,
                supplied_created_at,
                now,
            ],
        )?;

        Ok(())
    }

    fn get(&self, channel: &str, message_id: i64) -> StorageResult<Option<Resource>> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;
        let resource = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE message_id = ?1", COLUMNS, table),
                params![message_id],
                row_to_resource,
            )
            .optional()?;
        Ok(resource)
    }

    fn unresolved(&self, channel: &str, limit: usize) -> StorageResult<Vec<Resource>> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;
        self.query_resources(
            &conn,
            &format!(
                "SELECT {} FROM {}
                 WHERE destination_link IS NULL OR destination_link = ''
                 ORDER BY message_id DESC LIMIT ?1",
                COLUMNS, table
            ),
            params![limit as i64],
        )
    }

    fn search(
        &self,
        keyword: &str,
        channel: Option<&str>,
    ) -> StorageResult<Vec<(String, Resource)>> {
        let channels: Vec<String> = match channel {
            Some(c) => vec![c.to_string()],
            None => self.channels.clone(),
        };

        let pattern = format!("%{}%", escape_like(keyword));
        let conn = self.connect()?;
        let mut results = Vec::new();

        for channel_id in channels {
            let table = self.table(&conn, &channel_id)?;
            let found = self.query_resources(
                &conn,
                &format!(
                    "SELECT {} FROM {}
                     WHERE (title LIKE ?1 ESCAPE '\\' OR tags LIKE ?1 ESCAPE '\\')
                       AND (destination_link IS NULL OR destination_link != ?2)
                     ORDER BY message_id DESC",
                    COLUMNS, table
                ),
                params![pattern, UNAVAILABLE_SENTINEL],
            )?;
            results.extend(found.into_iter().map(|r| (channel_id.clone(), r)));
        }

        Ok(results)
    }

    fn list_all(&self, channel: &str, limit: usize) -> StorageResult<Vec<Resource>> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;
        self.query_resources(
            &conn,
            &format!(
                "SELECT {} FROM {} ORDER BY message_id DESC LIMIT ?1",
                COLUMNS, table
            ),
            params![limit as i64],
        )
    }

    fn latest_message_id(&self, channel: &str) -> StorageResult<i64> {
        let conn = self.connect()?;
        let table = self.table(&conn, channel)?;
        let latest: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(message_id), 0) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    fn count(&self, channel: &str) -> StorageResult<u64> {
        self.count_where(channel, "1 = 1")
    }

    fn count_unresolved(&self, channel: &str) -> StorageResult<u64> {
        self.count_where(channel, "destination_link IS NULL OR destination_link = ''")
    }
}

fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let tags: Option<String> = row.get(2)?;
    let deferred_ref: Option<String> = row.get(3)?;
    let destination: Option<String> = row.get(4)?;
    let description: Option<String> = row.get(5)?;
    let created_at: Option<String> = row.get(6)?;

    Ok(Resource {
        message_id: row.get(0)?,
        title: row.get(1)?,
        tags: parse_tags(tags.as_deref().unwrap_or("")),
        deferred_ref: deferred_ref.filter(|s| !s.is_empty()),
        destination: DestinationLink::from_db_string(destination.as_deref()),
        description: description.filter(|s| !s.is_empty()),
        created_at: created_at.as_deref().and_then(parse_timestamp),
    })
}

/// Parses a stored timestamp; older databases used "YYYY-MM-DD HH:MM:SS"
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Escapes LIKE wildcards so the keyword matches literally
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(
            &dir.path().join("resources.db"),
            vec!["alpha".to_string(), "beta".to_string()],
        )
        .unwrap()
    }

    fn resource(id: i64, title: &str, destination: DestinationLink) -> Resource {
        Resource {
            message_id: id,
            title: title.to_string(),
            tags: vec!["#movie".to_string()],
            deferred_ref: None,
            destination,
            description: None,
            created_at: None,
        }
    }

    fn found(url: &str) -> DestinationLink {
        DestinationLink::Found(url.to_string())
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        assert!(SqliteStore::open(&path, vec![]).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_exists_after_upsert() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(!store.exists("alpha", 10).unwrap());
        store
            .upsert("alpha", &resource(10, "Title", DestinationLink::Pending))
            .unwrap();
        assert!(store.exists("alpha", 10).unwrap());
        // Tables are isolated per channel
        assert!(!store.exists("beta", 10).unwrap());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = resource(7, "Same", found("https://115cdn.com/s/a"));

        store.upsert("alpha", &r).unwrap();
        let first = store.get("alpha", 7).unwrap().unwrap();
        store.upsert("alpha", &r).unwrap();
        let second = store.get("alpha", 7).unwrap().unwrap();

        assert_eq!(store.count("alpha").unwrap(), 1);
        assert_eq!(first, second);
        assert!(first.created_at.is_some());
    }

    #[test]
    fn test_upsert_preserves_created_at_when_not_supplied() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut r = resource(1, "Old", DestinationLink::Pending);
        let original = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        r.created_at = Some(original);
        store.upsert("alpha", &r).unwrap();

        let mut rewrite = resource(1, "New", found("https://115cdn.com/s/b"));
        rewrite.created_at = None;
        store.upsert("alpha", &rewrite).unwrap();

        let stored = store.get("alpha", 1).unwrap().unwrap();
        assert_eq!(stored.title, "New");
        assert_eq!(stored.destination, found("https://115cdn.com/s/b"));
        assert_eq!(stored.created_at, Some(original));
    }

    #[test]
    fn test_upsert_overwrites_supplied_created_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut r = resource(1, "T", DestinationLink::Pending);
        store.upsert("alpha", &r).unwrap();

        let replacement = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        r.created_at = Some(replacement);
        store.upsert("alpha", &r).unwrap();

        assert_eq!(
            store.get("alpha", 1).unwrap().unwrap().created_at,
            Some(replacement)
        );
    }

    #[test]
    fn test_fields_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = Resource {
            message_id: 99,
            title: "流浪地球".to_string(),
            tags: vec!["#科幻".to_string(), "#刘慈欣".to_string()],
            deferred_ref: Some("https://telegra.ph/X-01-01".to_string()),
            destination: DestinationLink::Pending,
            description: Some("line one\nline two".to_string()),
            created_at: None,
        };
        store.upsert("alpha", &r).unwrap();

        let stored = store.get("alpha", 99).unwrap().unwrap();
        assert_eq!(stored.title, r.title);
        assert_eq!(stored.tags, r.tags);
        assert_eq!(stored.deferred_ref, r.deferred_ref);
        assert_eq!(stored.destination, DestinationLink::Pending);
        assert_eq!(stored.description, r.description);
        assert!(store.get("alpha", 100).unwrap().is_none());
    }

    #[test]
    fn test_unresolved_newest_first_excludes_sentinel() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .upsert("alpha", &resource(1, "a", DestinationLink::Pending))
            .unwrap();
        store
            .upsert("alpha", &resource(3, "b", DestinationLink::Pending))
            .unwrap();
        store
            .upsert("alpha", &resource(2, "c", DestinationLink::Unavailable))
            .unwrap();
        store
            .upsert("alpha", &resource(4, "d", found("https://115cdn.com/s/d")))
            .unwrap();

        let ids: Vec<i64> = store
            .unresolved("alpha", 10)
            .unwrap()
            .iter()
            .map(|r| r.message_id)
            .collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(store.count_unresolved("alpha").unwrap(), 2);
        assert_eq!(store.unresolved("alpha", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_search_matches_title_or_tags() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut tagged = resource(1, "Other", DestinationLink::Pending);
        tagged.tags = vec!["#仙逆".to_string()];
        store.upsert("alpha", &tagged).unwrap();
        store
            .upsert("alpha", &resource(2, "仙逆 第一季", found("https://115cdn.com/s/x")))
            .unwrap();
        store
            .upsert("alpha", &resource(3, "Unrelated", DestinationLink::Pending))
            .unwrap();

        let ids: Vec<i64> = store
            .search("仙逆", Some("alpha"))
            .unwrap()
            .iter()
            .map(|(_, r)| r.message_id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_search_excludes_sentinel() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .upsert("alpha", &resource(1, "Gone Movie", DestinationLink::Unavailable))
            .unwrap();

        assert!(store.search("Gone", Some("alpha")).unwrap().is_empty());
        assert!(store.search("", Some("alpha")).unwrap().is_empty());
        assert!(store.search("#movie", None).unwrap().is_empty());
    }

    #[test]
    fn test_search_all_channels_concatenates() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .upsert("alpha", &resource(5, "Dune", DestinationLink::Pending))
            .unwrap();
        store
            .upsert("beta", &resource(8, "Dune Part Two", DestinationLink::Pending))
            .unwrap();

        let results = store.search("Dune", None).unwrap();
        let keys: Vec<(String, i64)> = results
            .iter()
            .map(|(c, r)| (c.clone(), r.message_id))
            .collect();
        assert_eq!(
            keys,
            vec![("alpha".to_string(), 5), ("beta".to_string(), 8)]
        );
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .upsert("alpha", &resource(1, "100% Pure", DestinationLink::Pending))
            .unwrap();
        store
            .upsert("alpha", &resource(2, "1000 Pure", DestinationLink::Pending))
            .unwrap();

        let results = store.search("100%", Some("alpha")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.message_id, 1);
    }

    #[test]
    fn test_latest_and_counts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.latest_message_id("alpha").unwrap(), 0);
        assert_eq!(store.count("alpha").unwrap(), 0);

        for id in [12, 40, 7] {
            store
                .upsert("alpha", &resource(id, "x", DestinationLink::Pending))
                .unwrap();
        }

        assert_eq!(store.latest_message_id("alpha").unwrap(), 40);
        assert_eq!(store.count("alpha").unwrap(), 3);

        let listed: Vec<i64> = store
            .list_all("alpha", 2)
            .unwrap()
            .iter()
            .map(|r| r.message_id)
            .collect();
        assert_eq!(listed, vec![40, 12]);
    }

    #[test]
    fn test_invalid_channel_refused() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.count("bad name").is_err());
    }

    #[test]
    fn test_parse_legacy_timestamp() {
        let parsed = parse_timestamp("2024-03-01 12:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a%b_c\\d"), "a\\%b\\_c\\\\d");
        assert_eq!(escape_like("plain"), "plain");
    }
}
