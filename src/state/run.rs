/// Crawl strategy and outcome definitions
///
/// This module defines the three crawl strategies and the ways a crawl call can end.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy of a crawl call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Walk the whole history until the oldest page, resumable via checkpoint
    #[default]
    #[serde(alias = "all")]
    Full,

    /// Walk from the newest page until enough already-known messages are seen
    Incremental,

    /// Walk from the newest page until a number of new resources is saved
    Limited,
}

impl CrawlMode {
    /// Returns true if this strategy writes a checkpoint
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// Returns true if a network failure is retried instead of ending the call
    pub fn retries_forever(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Limited => "limited",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a crawl call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlOutcome {
    // ===== Natural endings =====
    /// A page yielded no candidates; the oldest message was reached
    Completed,

    /// Incremental crawl saw enough consecutive known messages
    CaughtUp,

    /// Limited crawl saved the requested number of resources
    LimitReached,

    // ===== Early endings =====
    /// Cancellation was observed; a full crawl saved its checkpoint
    Interrupted,

    /// A page could not be fetched and the strategy does not retry
    FetchFailed,
}

impl CrawlOutcome {
    /// Returns true if the call stopped before its natural end
    pub fn is_early(&self) -> bool {
        matches!(self, Self::Interrupted | Self::FetchFailed)
    }
}

impl fmt::Display for CrawlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::CaughtUp => "caught up",
            Self::LimitReached => "limit reached",
            Self::Interrupted => "interrupted",
            Self::FetchFailed => "fetch failed",
        };
        f.write_str(s)
    }
}

/// Summary of one crawl call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub channel_id: String,
    pub mode: CrawlMode,
    pub outcome: CrawlOutcome,

    /// Resources newly saved by this call
    pub saved: u64,

    /// Running total, including what earlier resumed runs saved
    pub total: u64,

    /// Pages fetched successfully
    pub pages: u64,

    /// Cursor the next page would have been requested with
    pub last_cursor: Option<i64>,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} crawl of {} {}: {} new, {} total, {} pages",
            self.mode, self.channel_id, self.outcome, self.saved, self.total, self.pages
        )
    }
}
