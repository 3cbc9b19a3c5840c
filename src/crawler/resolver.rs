//! Deferred link resolution
//!
//! Resources of deferred-mode channels are stored with only a reference
//! page URL. The resolver fetches that page and recovers the destination
//! link and a short description from it.

use crate::crawler::fetcher::{FetchError, PageSource};
use crate::links::LinkRules;
use crate::storage::{DestinationLink, Resource, ResourceStore};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Anchor text marking the preferred link on a reference page
const VIEW_LINK_MARKERS: [&str; 2] = ["查看链接", "🔗"];

/// Article lines kept as the description
const MAX_DESCRIPTION_LINES: usize = 5;

/// What a reference page yielded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Destination link, if one on the provider's domain was found
    pub link: Option<String>,

    /// First lines of the page's article text
    pub description: Option<String>,
}

/// Totals of one batch resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveReport {
    /// Resources taken from the unresolved set
    pub attempted: u64,

    /// Resources that received a destination link
    pub found: u64,

    /// Resources whose reference page held no destination link
    pub unavailable: u64,

    /// Resources whose reference page could not be fetched; also marked unavailable
    pub failed: u64,
}

impl fmt::Display for ResolveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} found, {} unavailable, {} failed",
            self.attempted, self.found, self.unavailable, self.failed
        )
    }
}

/// Resolves reference pages into destination links
#[derive(Clone)]
pub struct DeferredLinkResolver {
    source: Arc<dyn PageSource>,
    store: Arc<dyn ResourceStore>,
    rules: Arc<LinkRules>,
}

impl DeferredLinkResolver {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: Arc<dyn ResourceStore>,
        rules: Arc<LinkRules>,
    ) -> Self {
        Self {
            source,
            store,
            rules,
        }
    }

    /// Fetches one reference page and extracts its destination link
    ///
    /// A page without a matching link is not an error; it yields a
    /// resolution with no link.
    pub async fn resolve_one(&self, reference_url: &str) -> Result<Resolution, FetchError> {
        let html = self.source.fetch_reference_page(reference_url).await?;
        Ok(parse_reference_page(&html, &self.rules))
    }

    /// Resolves up to `limit` unresolved resources of a channel, newest first
    ///
    /// Each result is persisted right away. Every attempted resource leaves
    /// the unresolved set: a page without a link and a page that cannot be
    /// fetched both mark it unavailable. Cancellation is observed between
    /// resources.
    pub async fn resolve_batch(
        &self,
        channel: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> crate::Result<ResolveReport> {
        let pending = self.store.unresolved(channel, limit)?;
        let mut report = ResolveReport::default();

        if pending.is_empty() {
            tracing::info!("No unresolved resources in {}", channel);
            return Ok(report);
        }

        tracing::info!("Resolving {} resources of {}", pending.len(), channel);
        let total = pending.len();

        for (i, mut resource) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Resolution of {} interrupted", channel);
                break;
            }
            report.attempted += 1;

            let Some(reference) = resource.deferred_ref.clone() else {
                tracing::warn!(
                    "Resource {} of {} has no reference page; marking unavailable",
                    resource.message_id,
                    channel
                );
                resource.destination = DestinationLink::Unavailable;
                self.store.upsert(channel, &resource)?;
                report.unavailable += 1;
                continue;
            };

            let resolution = match self.resolve_one(&reference).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    tracing::warn!("[{}/{}] {}; marking unavailable", i + 1, total, e);
                    resource.destination = DestinationLink::Unavailable;
                    self.store.upsert(channel, &resource)?;
                    report.failed += 1;
                    continue;
                }
            };

            apply(&mut resource, resolution);
            self.store.upsert(channel, &resource)?;

            match &resource.destination {
                DestinationLink::Found(link) => {
                    tracing::info!("[{}/{}] {} -> {}", i + 1, total, resource.title, link);
                    report.found += 1;
                }
                _ => {
                    tracing::info!("[{}/{}] {}: no link, marked", i + 1, total, resource.title);
                    report.unavailable += 1;
                }
            }
        }

        tracing::info!("Resolution of {} done: {}", channel, report);
        Ok(report)
    }
}

/// Writes a resolution into a resource; no link means unavailable
pub(crate) fn apply(resource: &mut Resource, resolution: Resolution) {
    resource.destination = match resolution.link {
        Some(link) => DestinationLink::Found(link),
        None => DestinationLink::Unavailable,
    };
    if resolution.description.is_some() {
        resource.description = resolution.description;
    }
}

/// Extracts the destination link and description from a reference page
///
/// Anchors whose text carries a "view link" marker win over other anchors;
/// either way the link must be on the provider's domain.
pub fn parse_reference_page(html: &str, rules: &LinkRules) -> Resolution {
    let document = Html::parse_document(html);

    let mut marked = None;
    let mut first = None;

    if let Ok(anchor) = Selector::parse("a[href]") {
        for a in document.select(&anchor) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            if !rules.is_destination_link(href) {
                continue;
            }

            let text = a.text().collect::<String>();
            if VIEW_LINK_MARKERS.iter().any(|m| text.contains(m)) {
                marked = Some(href.to_string());
                break;
            }
            if first.is_none() {
                first = Some(href.to_string());
            }
        }
    }

    let description = Selector::parse("article")
        .ok()
        .and_then(|article| document.select(&article).next())
        .map(article_excerpt)
        .filter(|d| !d.is_empty());

    Resolution {
        link: marked.or(first),
        description,
    }
}

fn article_excerpt(article: ElementRef<'_>) -> String {
    article
        .text()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_DESCRIPTION_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}
