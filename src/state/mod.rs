//! State module for tracking crawl progress
//!
//! This module provides the state that outlives a single page fetch.
//!
//! # Components
//!
//! - `CrawlCheckpoint` / `CheckpointStore`: resumable progress of an interrupted full crawl
//! - `CrawlMode`, `CrawlOutcome`, `CrawlReport`: how a crawl call ran and ended
//! - `TaskLock`: at most one crawl or resolve task at a time

mod checkpoint;
mod run;
mod task;

// Re-export main types
pub use checkpoint::{CheckpointStore, CrawlCheckpoint};
pub use run::{CrawlMode, CrawlOutcome, CrawlReport};
pub use task::{ActiveTask, TaskKind, TaskLock, TaskPermit};
