//! Crawler module for channel harvesting
//!
//! This module contains the core harvesting logic, including:
//! - Paced HTTP fetching of channel and reference pages
//! - Per-mode extraction of resources from channel pages
//! - Resolution of deferred-mode reference pages
//! - Orchestration of full, incremental and limited crawls

mod extractor;
mod fetcher;
mod orchestrator;
mod resolver;

pub use extractor::{ExtractedPage, MessageExtractor};
pub use fetcher::{build_http_client, ChannelFetcher, FetchError, PageSource};
pub use orchestrator::{CrawlRequest, Orchestrator, SyncReport};
pub use resolver::{parse_reference_page, DeferredLinkResolver, Resolution, ResolveReport};

/// Canned page source for tests
#[cfg(test)]
pub(crate) mod testing {
    use super::{FetchError, PageSource};
    use crate::config::ChannelConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Serves fixed pages keyed by cursor and records every request
    ///
    /// Unknown cursors yield an empty page; unknown reference URLs a 404.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pages: HashMap<Option<i64>, String>,
        references: HashMap<String, String>,
        failures: Mutex<HashMap<Option<i64>, u32>>,
        requests: Mutex<Vec<Option<i64>>>,
        reference_requests: Mutex<Vec<String>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl FakeSource {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_page(mut self, before: Option<i64>, html: String) -> Self {
            self.pages.insert(before, html);
            self
        }

        pub(crate) fn with_reference(mut self, url: &str, html: &str) -> Self {
            self.references.insert(url.to_string(), html.to_string());
            self
        }

        /// Fails the first `times` requests for `before`
        pub(crate) fn failing(self, before: Option<i64>, times: u32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(before, times);
            self
        }

        /// Cancels `token` when the `n`-th channel page is requested
        pub(crate) fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
            self.cancel_after = Some((n, token));
            self
        }

        pub(crate) fn requests(&self) -> Vec<Option<i64>> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn reference_requests(&self) -> Vec<String> {
            self.reference_requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_channel_page(
            &self,
            channel: &ChannelConfig,
            before: Option<i64>,
        ) -> Result<String, FetchError> {
            let count = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(before);
                requests.len()
            };

            if let Some((n, token)) = &self.cancel_after {
                if count == *n {
                    token.cancel();
                }
            }

            if let Some(remaining) = self.failures.lock().unwrap().get_mut(&before) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Network {
                        url: channel.url.clone(),
                        message: "connection reset".to_string(),
                    });
                }
            }

            Ok(self
                .pages
                .get(&before)
                .cloned()
                .unwrap_or_else(|| page(&[])))
        }

        async fn fetch_reference_page(&self, url: &str) -> Result<String, FetchError> {
            self.reference_requests
                .lock()
                .unwrap()
                .push(url.to_string());
            self.references
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Http {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    /// A whole channel page around the given messages
    pub(crate) fn page(messages: &[String]) -> String {
        format!("<html><body>{}</body></html>", messages.join("\n"))
    }

    fn wrap(id: i64, body: &str, extra: &str) -> String {
        format!(
            r#"<div class="tgme_widget_message_wrap"><div class="tgme_widget_message" data-post="chan/{}"><div class="tgme_widget_message_text">{}</div>{}</div></div>"#,
            id, body, extra
        )
    }

    /// An inline-mode message carrying a valid destination link
    pub(crate) fn inline_message(id: i64) -> String {
        wrap(
            id,
            &format!("名称：Item {id}<br>https://115cdn.com/s/item{id}?password=pw{id}"),
            "",
        )
    }

    /// A message with an id but nothing any mode accepts
    pub(crate) fn plain_message(id: i64) -> String {
        wrap(id, "just chatting", "")
    }

    /// A deferred-mode message linking to `https://telegra.ph/Item-<id>-01-01`
    pub(crate) fn deferred_message(id: i64) -> String {
        wrap(
            id,
            "new upload",
            &format!(r#"<a href="https://telegra.ph/Item-{id}-01-01">📎 查看资源</a>"#),
        )
    }

    /// A reference page for `deferred_message(id)` with a link
    pub(crate) fn reference_page(id: i64) -> String {
        format!(
            r#"<article><p>Item {id}</p><a href="https://115cdn.com/s/ref{id}">🔗 查看链接</a></article>"#
        )
    }
}
