//! Crawl orchestration
//!
//! The orchestrator drives the fetcher and the extractor across the three
//! crawl strategies, owns the checkpoint of an interrupted full crawl, and
//! composes crawls with deferred link resolution. It is the only entry
//! point front ends use to start work; at most one task runs at a time.
//!
//! Pages are fetched strictly one after the other. Cancellation is observed
//! before every fetch, during retry backoff, and before every message of a
//! page.

use crate::config::{ChannelConfig, Config};
use crate::crawler::extractor::MessageExtractor;
use crate::crawler::fetcher::{ChannelFetcher, PageSource};
use crate::crawler::resolver::{DeferredLinkResolver, ResolveReport};
use crate::links::LinkRules;
use crate::state::{
    ActiveTask, CheckpointStore, CrawlCheckpoint, CrawlMode, CrawlOutcome, CrawlReport, TaskKind,
    TaskLock, TaskPermit,
};
use crate::storage::{Resource, ResourceStore, SqliteStore};
use crate::{HarvestError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a crawl should start and when it should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlRequest {
    /// Full crawl from the newest page
    Full,

    /// Full crawl continuing from the saved checkpoint
    Resume,

    /// Newest messages until the known-streak threshold
    Incremental,

    /// Newest messages until this many new resources are saved
    Limited(u64),
}

impl CrawlRequest {
    pub fn mode(&self) -> CrawlMode {
        match self {
            Self::Full | Self::Resume => CrawlMode::Full,
            Self::Incremental => CrawlMode::Incremental,
            Self::Limited(_) => CrawlMode::Limited,
        }
    }
}

/// Result of a crawl followed by resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// `None` when the crawl was skipped (incremental crawl of an empty channel)
    pub crawl: Option<CrawlReport>,
    pub resolve: ResolveReport,
}

/// Progress of the crawl loop, kept outside it so errors can still checkpoint
#[derive(Debug, Clone, Copy)]
struct Progress {
    cursor: Option<i64>,
    total: u64,
    saved: u64,
    pages: u64,
}

/// Drives crawls and resolutions
pub struct Orchestrator {
    config: Arc<Config>,
    source: Arc<dyn PageSource>,
    store: Arc<dyn ResourceStore>,
    extractor: MessageExtractor,
    resolver: DeferredLinkResolver,
    checkpoints: CheckpointStore,
    tasks: TaskLock,
}

impl Orchestrator {
    /// Creates an orchestrator over the given page source and store
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `source` - Where pages come from
    /// * `store` - Where resources go
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to crawl
    /// * `Err(HarvestError)` - The link rules failed to compile
    pub fn new(
        config: Config,
        source: Arc<dyn PageSource>,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self> {
        let rules = Arc::new(LinkRules::from_config(&config.links)?);
        let checkpoints = CheckpointStore::new(&config.storage.checkpoint_path);

        Ok(Self {
            extractor: MessageExtractor::new(Arc::clone(&rules)),
            resolver: DeferredLinkResolver::new(Arc::clone(&source), Arc::clone(&store), rules),
            config: Arc::new(config),
            source,
            store,
            checkpoints,
            tasks: TaskLock::new(),
        })
    }

    /// Creates an orchestrator fetching over HTTP into the configured database
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = ChannelFetcher::new(&config.http, &config.crawler)?;
        let store = SqliteStore::open(
            Path::new(&config.storage.database_path),
            config.channel_ids(),
        )?;
        Self::new(config, Arc::new(fetcher), Arc::new(store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read-only query surface for front ends
    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    /// The checkpoint of an interrupted full crawl, if any
    pub fn pending_checkpoint(&self) -> Option<CrawlCheckpoint> {
        self.checkpoints.load()
    }

    /// The task currently running, if any
    pub fn current_task(&self) -> Option<ActiveTask> {
        self.tasks.current()
    }

    fn channel(&self, channel_id: &str) -> Result<&ChannelConfig> {
        self.config
            .channel(channel_id)
            .ok_or_else(|| HarvestError::UnknownChannel(channel_id.to_string()))
    }

    fn acquire(&self, channel_id: &str, kind: TaskKind) -> Result<TaskPermit> {
        self.tasks
            .try_acquire(channel_id, kind)
            .map_err(|active| HarvestError::Busy { active })
    }

    // ===== Crawl entry points =====

    /// Crawls a channel with the given strategy
    pub async fn crawl(
        &self,
        channel_id: &str,
        request: CrawlRequest,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        let channel = self.channel(channel_id)?;
        let _permit = self.acquire(channel_id, TaskKind::Crawl)?;
        self.run_request(channel, request, cancel).await
    }

    /// Full crawl, from `resume_cursor` when given or else from the newest page
    pub async fn crawl_full(
        &self,
        channel_id: &str,
        resume_cursor: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        let channel = self.channel(channel_id)?;
        let _permit = self.acquire(channel_id, TaskKind::Crawl)?;
        self.run_full(channel, resume_cursor, 0, cancel).await
    }

    /// Continues the interrupted full crawl of `channel_id`
    ///
    /// Refused with `NoPendingTask` when there is no checkpoint or it belongs
    /// to another channel; nothing is fetched in that case.
    pub async fn resume(&self, channel_id: &str, cancel: &CancellationToken) -> Result<CrawlReport> {
        self.crawl(channel_id, CrawlRequest::Resume, cancel).await
    }

    /// Crawls new messages until enough consecutive known ones are seen
    pub async fn crawl_incremental(
        &self,
        channel_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        self.crawl(channel_id, CrawlRequest::Incremental, cancel)
            .await
    }

    /// Crawls until `limit` new resources are saved
    pub async fn crawl_limited(
        &self,
        channel_id: &str,
        limit: u64,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        self.crawl(channel_id, CrawlRequest::Limited(limit), cancel)
            .await
    }

    // ===== Resolution entry points =====

    /// Resolves up to `limit` unresolved resources (all of them when `None`)
    ///
    /// Channels whose mode needs no resolution report nothing resolved.
    pub async fn resolve_batch(
        &self,
        channel_id: &str,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<ResolveReport> {
        let channel = self.channel(channel_id)?;
        let _permit = self.acquire(channel_id, TaskKind::Resolve)?;
        self.run_resolve(channel, limit, cancel).await
    }

    /// Resolves one stored resource on demand
    ///
    /// Resources that are not deferred, or already carry a link, are returned
    /// as stored. Otherwise the reference page is fetched even when the
    /// resource was marked unavailable, and the result is persisted only when
    /// a link is found.
    pub async fn resolve_message(&self, channel_id: &str, message_id: i64) -> Result<Resource> {
        self.channel(channel_id)?;
        let _permit = self.acquire(channel_id, TaskKind::Resolve)?;

        let mut resource =
            self.store
                .get(channel_id, message_id)?
                .ok_or_else(|| HarvestError::ResourceNotFound {
                    channel: channel_id.to_string(),
                    message_id,
                })?;

        if resource.destination.url().is_some() {
            return Ok(resource);
        }
        let Some(reference) = resource.deferred_ref.clone() else {
            return Ok(resource);
        };

        let resolution = self.resolver.resolve_one(&reference).await?;
        if resolution.link.is_some() {
            crate::crawler::resolver::apply(&mut resource, resolution);
            self.store.upsert(channel_id, &resource)?;
            tracing::info!("Resolved {} of {}", message_id, channel_id);
        } else {
            tracing::info!("No link found for {} of {}", message_id, channel_id);
        }

        Ok(resource)
    }

    // ===== Composition =====

    /// Crawls a channel, then resolves what the crawl left unresolved
    ///
    /// Full crawls resolve the whole unresolved set; incremental and limited
    /// crawls resolve as many resources as they saved.
    pub async fn sync_channel(
        &self,
        channel_id: &str,
        request: CrawlRequest,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let channel = self.channel(channel_id)?;
        let _permit = self.acquire(channel_id, TaskKind::Sync)?;

        let crawl = self.run_request(channel, request, cancel).await?;
        let limit = match request {
            CrawlRequest::Full | CrawlRequest::Resume => None,
            CrawlRequest::Incremental | CrawlRequest::Limited(_) => Some(crawl.saved as usize),
        };

        let resolve = if limit == Some(0) || cancel.is_cancelled() {
            ResolveReport::default()
        } else {
            self.run_resolve(channel, limit, cancel).await?
        };

        Ok(SyncReport {
            crawl: Some(crawl),
            resolve,
        })
    }

    /// Synchronizes every configured channel in turn
    ///
    /// Each channel is crawled (fully, or incrementally when `full` is false)
    /// and its whole unresolved set resolved. A channel that cannot be
    /// crawled incrementally because it is empty is only resolved.
    pub async fn sync_all(
        &self,
        full: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, SyncReport)>> {
        let _permit = self.acquire("all channels", TaskKind::Sync)?;
        let request = if full {
            CrawlRequest::Full
        } else {
            CrawlRequest::Incremental
        };

        let mut reports = Vec::new();
        for channel in &self.config.channels {
            if cancel.is_cancelled() {
                tracing::info!("Sync interrupted before {}", channel.id);
                break;
            }
            tracing::info!("Syncing {} ({})", channel.id, channel.name);

            let crawl = match self.run_request(channel, request, cancel).await {
                Ok(report) => Some(report),
                Err(HarvestError::EmptyChannel { channel: id }) => {
                    tracing::warn!("{} is empty; run a full crawl first", id);
                    None
                }
                Err(e) => return Err(e),
            };

            let resolve = if cancel.is_cancelled() {
                ResolveReport::default()
            } else {
                self.run_resolve(channel, None, cancel).await?
            };

            reports.push((channel.id.clone(), SyncReport { crawl, resolve }));
        }

        Ok(reports)
    }

    // ===== Internals (lock already held) =====

    async fn run_request(
        &self,
        channel: &ChannelConfig,
        request: CrawlRequest,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        match request {
            CrawlRequest::Full => self.run_full(channel, None, 0, cancel).await,
            CrawlRequest::Resume => {
                let checkpoint = match self.checkpoints.load() {
                    Some(checkpoint) if checkpoint.channel_id == channel.id => checkpoint,
                    Some(checkpoint) => {
                        tracing::warn!(
                            "Pending task belongs to {}, not {}",
                            checkpoint.channel_id,
                            channel.id
                        );
                        return Err(HarvestError::NoPendingTask {
                            channel: channel.id.clone(),
                        });
                    }
                    None => {
                        return Err(HarvestError::NoPendingTask {
                            channel: channel.id.clone(),
                        })
                    }
                };
                tracing::info!(
                    "Resuming {} before {:?} with {} already saved",
                    channel.id,
                    checkpoint.last_before_id,
                    checkpoint.total_crawled
                );
                self.run_full(
                    channel,
                    checkpoint.last_before_id,
                    checkpoint.total_crawled,
                    cancel,
                )
                .await
            }
            CrawlRequest::Incremental => {
                let latest = self.store.latest_message_id(&channel.id)?;
                if latest == 0 {
                    return Err(HarvestError::EmptyChannel {
                        channel: channel.id.clone(),
                    });
                }
                tracing::info!("Newest stored message of {} is {}", channel.id, latest);
                self.run_pages(channel, CrawlMode::Incremental, None, 0, None, cancel)
                    .await
            }
            CrawlRequest::Limited(limit) => {
                self.run_pages(channel, CrawlMode::Limited, None, 0, Some(limit), cancel)
                    .await
            }
        }
    }

    async fn run_full(
        &self,
        channel: &ChannelConfig,
        cursor: Option<i64>,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        self.run_pages(channel, CrawlMode::Full, cursor, total, None, cancel)
            .await
    }

    async fn run_resolve(
        &self,
        channel: &ChannelConfig,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<ResolveReport> {
        if !channel.mode.needs_resolution() {
            tracing::info!(
                "{} is a {} channel; links are already in the messages",
                channel.id,
                channel.mode
            );
            return Ok(ResolveReport::default());
        }

        let limit = match limit {
            Some(limit) => limit,
            None => self.store.count_unresolved(&channel.id)? as usize,
        };
        if limit == 0 {
            tracing::info!("No unresolved resources in {}", channel.id);
            return Ok(ResolveReport::default());
        }

        self.resolver.resolve_batch(&channel.id, limit, cancel).await
    }

    /// Runs the page loop and settles the checkpoint
    async fn run_pages(
        &self,
        channel: &ChannelConfig,
        mode: CrawlMode,
        cursor: Option<i64>,
        total: u64,
        limit: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport> {
        tracing::info!("Starting {} crawl of {} ({})", mode, channel.id, channel.name);

        let mut progress = Progress {
            cursor,
            total,
            saved: 0,
            pages: 0,
        };

        let outcome = match self
            .crawl_pages(channel, mode, limit, &mut progress, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                if mode.is_resumable() {
                    self.save_checkpoint(channel, &progress);
                }
                return Err(e);
            }
        };

        if mode.is_resumable() {
            match outcome {
                CrawlOutcome::Completed => {
                    if let Err(e) = self.checkpoints.clear() {
                        tracing::error!("Failed to clear checkpoint: {}", e);
                    }
                }
                _ => self.save_checkpoint(channel, &progress),
            }
        }

        let report = CrawlReport {
            channel_id: channel.id.clone(),
            mode,
            outcome,
            saved: progress.saved,
            total: progress.total,
            pages: progress.pages,
            last_cursor: progress.cursor,
        };
        tracing::info!("{}", report);
        Ok(report)
    }

    /// The page loop shared by every strategy
    async fn crawl_pages(
        &self,
        channel: &ChannelConfig,
        mode: CrawlMode,
        limit: Option<u64>,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let crawler = &self.config.crawler;
        let mut known_streak: u32 = 0;

        let outcome = 'pages: loop {
            if cancel.is_cancelled() {
                break CrawlOutcome::Interrupted;
            }
            if limit.is_some_and(|limit| progress.saved >= limit) {
                break CrawlOutcome::LimitReached;
            }

            let html = match self.source.fetch_channel_page(channel, progress.cursor).await {
                Ok(html) => html,
                Err(e) if mode.retries_forever() => {
                    tracing::warn!("{}; retrying in {:?}", e, crawler.retry_delay());
                    tokio::select! {
                        _ = cancel.cancelled() => break 'pages CrawlOutcome::Interrupted,
                        _ = tokio::time::sleep(crawler.retry_delay()) => continue 'pages,
                    }
                }
                Err(e) => {
                    tracing::warn!("{}; stopping with {} saved", e, progress.saved);
                    break CrawlOutcome::FetchFailed;
                }
            };
            progress.pages += 1;

            let page = self.extractor.extract_page(&html, channel.mode);
            let Some(oldest) = page.oldest_message_id() else {
                tracing::info!("No more messages in {}", channel.id);
                break CrawlOutcome::Completed;
            };

            let mut page_saved = 0;
            for resource in &page.resources {
                if cancel.is_cancelled() {
                    break 'pages CrawlOutcome::Interrupted;
                }

                if self.store.exists(&channel.id, resource.message_id)? {
                    known_streak += 1;
                    if mode == CrawlMode::Incremental
                        && known_streak >= crawler.known_streak_threshold
                    {
                        tracing::info!(
                            "{} consecutive known messages; {} is caught up",
                            known_streak,
                            channel.id
                        );
                        break 'pages CrawlOutcome::CaughtUp;
                    }
                    continue;
                }

                known_streak = 0;
                self.store.upsert(&channel.id, resource)?;
                tracing::debug!("Saved {}: {}", resource.message_id, resource.title);
                page_saved += 1;
                progress.saved += 1;
                progress.total += 1;

                if mode.is_resumable()
                    && crawler.checkpoint_interval > 0
                    && progress.total % crawler.checkpoint_interval == 0
                {
                    self.save_checkpoint(channel, progress);
                }
                if limit.is_some_and(|limit| progress.saved >= limit) {
                    break 'pages CrawlOutcome::LimitReached;
                }
            }

            tracing::info!(
                "Page before {:?}: {} messages, {} new, {} total",
                progress.cursor,
                page.candidate_ids.len(),
                page_saved,
                progress.total
            );

            if progress.cursor.is_some_and(|cursor| oldest >= cursor) {
                tracing::warn!(
                    "Cursor did not advance past {} in {}; treating as exhausted",
                    oldest,
                    channel.id
                );
                break CrawlOutcome::Completed;
            }
            progress.cursor = Some(oldest);
        };

        Ok(outcome)
    }

    fn save_checkpoint(&self, channel: &ChannelConfig, progress: &Progress) {
        let checkpoint = CrawlCheckpoint::new(&channel.id, progress.cursor, progress.total);
        if let Err(e) = self.checkpoints.save(&checkpoint) {
            tracing::error!(
                "Failed to write checkpoint {}: {}",
                self.checkpoints.path().display(),
                e
            );
        }
    }
}
