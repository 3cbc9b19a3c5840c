//! Resumable checkpoint of an interrupted full crawl
//!
//! The checkpoint is a single JSON file. It is written atomically (temp file
//! plus rename) and parsed best-effort: unknown keys are ignored, missing
//! keys default, and an unreadable file counts as no checkpoint at all.

use crate::state::CrawlMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Persisted progress of a full crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlCheckpoint {
    #[serde(alias = "channel_id")]
    pub channel_id: String,

    /// Cursor the next page is requested with; `None` means the newest page
    #[serde(default, alias = "last_before_id")]
    pub last_before_id: Option<i64>,

    /// Resources saved across every run of this crawl
    #[serde(default, alias = "total_crawled")]
    pub total_crawled: u64,

    #[serde(default)]
    pub mode: CrawlMode,
}

impl CrawlCheckpoint {
    pub fn new(channel_id: &str, last_before_id: Option<i64>, total_crawled: u64) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            last_before_id,
            total_crawled,
            mode: CrawlMode::Full,
        }
    }
}

/// File-backed checkpoint location
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the checkpoint, if a valid one exists
    pub fn load(&self) -> Option<CrawlCheckpoint> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cannot read checkpoint {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!("Ignoring malformed checkpoint {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Overwrites the checkpoint atomically
    pub fn save(&self, checkpoint: &CrawlCheckpoint) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            "Checkpoint saved: {} before={:?} total={}",
            checkpoint.channel_id,
            checkpoint.last_before_id,
            checkpoint.total_crawled
        );
        Ok(())
    }

    /// Removes the checkpoint; a missing file is not an error
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
