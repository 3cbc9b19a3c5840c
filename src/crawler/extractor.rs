//! Message extraction from channel pages
//!
//! This module turns one page of a channel's public message list into
//! resources. Every message container with a numeric id is a candidate;
//! the channel's extraction mode then decides whether the candidate becomes
//! a resource:
//! - Deferred: the message links to a reference page
//! - Inline: the destination link is in the message body
//! - Button: the destination link sits behind a "click to go" button
//!
//! Extraction is synchronous and returns owned data, so the parsed document
//! never lives across an await point.

use crate::config::ExtractionMode;
use crate::links::{title_from_reference_url, LinkRules};
use crate::storage::{DestinationLink, Resource};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, LazyLock};

/// Hashtag anchors link to an in-channel search for "#..."
const TAG_QUERY_MARKER: &str = "?q=%23";

/// Anchor text of the reference link in deferred mode
const VIEW_RESOURCE_MARKERS: [&str; 2] = ["查看资源", "📎"];

/// Anchor text of the destination button in button mode
const CLICK_TO_GO_MARKER: &str = "点击跳转";

/// Line prefixes carrying an explicit resource name in inline mode
const NAME_PREFIXES: [&str; 2] = ["名称：", "名称:"];

/// Body lines considered for titles and descriptions
const MAX_BODY_LINES: usize = 10;

/// Tags used for the fallback title in inline and button modes
const MAX_TITLE_TAGS: usize = 3;

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{1F300}-\x{1F9FF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]")
        .expect("emoji pattern is valid")
});

struct Selectors {
    wrap: Selector,
    message: Selector,
    text: Selector,
    anchor: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            wrap: Selector::parse("div.tgme_widget_message_wrap").expect("wrap selector"),
            message: Selector::parse("div.tgme_widget_message").expect("message selector"),
            text: Selector::parse("div.tgme_widget_message_text").expect("text selector"),
            anchor: Selector::parse("a[href]").expect("anchor selector"),
        }
    }
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Ids of every message container on the page, in document order
    pub candidate_ids: Vec<i64>,

    /// Accepted resources, in document order
    pub resources: Vec<Resource>,
}

impl ExtractedPage {
    /// Returns true if the page held no messages at all
    pub fn is_empty(&self) -> bool {
        self.candidate_ids.is_empty()
    }

    /// Smallest message id on the page, the next page's cursor
    pub fn oldest_message_id(&self) -> Option<i64> {
        self.candidate_ids.iter().copied().min()
    }
}

/// One message container, parsed far enough to dispatch on the mode
struct MessageParts<'a> {
    id: i64,
    container: ElementRef<'a>,
    text: Option<ElementRef<'a>>,
    tags: Vec<String>,
}

impl MessageParts<'_> {
    /// Tags without their leading '#'
    fn title_parts(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.trim_start_matches('#'))
    }

    fn tag_title(&self, max: Option<usize>) -> Option<String> {
        let parts: Vec<&str> = match max {
            Some(n) => self.title_parts().take(n).collect(),
            None => self.title_parts().collect(),
        };
        let title = parts.join(" ").trim().to_string();
        if title.is_empty() {
            None
        } else {
            Some(title)
        }
    }

    /// The first non-blank text lines of the message body
    fn body_lines(&self) -> Vec<String> {
        match self.text {
            Some(text) => text_lines(text).into_iter().take(MAX_BODY_LINES).collect(),
            None => Vec::new(),
        }
    }

    fn anchors(&self) -> impl Iterator<Item = (&'_ str, String)> + '_ {
        self.container
            .select(&SELECTORS.anchor)
            .filter_map(|a| a.value().attr("href").map(|href| (href, element_text(a))))
    }

    fn resource(&self, title: String) -> Resource {
        Resource {
            message_id: self.id,
            title,
            tags: self.tags.clone(),
            deferred_ref: None,
            destination: DestinationLink::Pending,
            description: None,
            created_at: None,
        }
    }
}

/// Extracts resources from channel pages
#[derive(Debug, Clone)]
pub struct MessageExtractor {
    rules: Arc<LinkRules>,
}

impl MessageExtractor {
    pub fn new(rules: Arc<LinkRules>) -> Self {
        Self { rules }
    }

    /// Parses one page and extracts its resources
    ///
    /// # Arguments
    ///
    /// * `html` - Raw markup of the page
    /// * `mode` - The channel's extraction mode
    ///
    /// # Returns
    ///
    /// The candidate ids and accepted resources, both in document order
    /// (newest first on the platform's rendering).
    pub fn extract_page(&self, html: &str, mode: ExtractionMode) -> ExtractedPage {
        let document = Html::parse_document(html);
        let mut page = ExtractedPage::default();

        for wrap in document.select(&SELECTORS.wrap) {
            let Some(parts) = parse_message(wrap) else {
                continue;
            };
            page.candidate_ids.push(parts.id);

            let resource = match mode {
                ExtractionMode::Deferred => self.extract_deferred(&parts),
                ExtractionMode::Inline => self.extract_inline(&parts),
                ExtractionMode::Button => self.extract_button(&parts),
            };

            match resource {
                Some(resource) => page.resources.push(resource),
                None => tracing::debug!("Message {} has no {} resource", parts.id, mode),
            }
        }

        page
    }

    fn extract_deferred(&self, msg: &MessageParts<'_>) -> Option<Resource> {
        let reference = msg.anchors().find_map(|(href, text)| {
            let marked = VIEW_RESOURCE_MARKERS.iter().any(|m| text.contains(m));
            (marked && self.rules.is_reference_link(href)).then(|| href.to_string())
        })?;

        let title = title_from_reference_url(&reference)
            .or_else(|| msg.tag_title(None))
            .unwrap_or_else(|| Resource::placeholder_title(msg.id));

        let mut resource = msg.resource(title);
        resource.deferred_ref = Some(reference);
        Some(resource)
    }

    fn extract_inline(&self, msg: &MessageParts<'_>) -> Option<Resource> {
        let text = msg.text?;

        let link = text
            .select(&SELECTORS.anchor)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| self.rules.is_destination_link(href))
            .map(str::to_string)
            .or_else(|| self.rules.find_inline_link(&text_lines(text).join("\n")))?;

        if !self.rules.is_destination_link(&link) {
            return None;
        }

        let lines = msg.body_lines();
        let title = named_title(&lines)
            .or_else(|| msg.tag_title(Some(MAX_TITLE_TAGS)))
            .unwrap_or_else(|| Resource::placeholder_title(msg.id));

        let mut resource = msg.resource(title);
        resource.destination = DestinationLink::Found(link);
        resource.description = description(&lines);
        Some(resource)
    }

    fn extract_button(&self, msg: &MessageParts<'_>) -> Option<Resource> {
        let link = msg.anchors().find_map(|(href, text)| {
            (text.contains(CLICK_TO_GO_MARKER) && self.rules.is_destination_link(href))
                .then(|| href.to_string())
        })?;

        let lines = msg.body_lines();
        let title = button_title(&lines)
            .or_else(|| msg.tag_title(Some(MAX_TITLE_TAGS)))
            .unwrap_or_else(|| Resource::placeholder_title(msg.id));

        let mut resource = msg.resource(title);
        resource.destination = DestinationLink::Found(link);
        resource.description = description(&lines);
        Some(resource)
    }
}

/// Reads the id and tags of one message container
///
/// Returns `None` (not a candidate) when the post id is missing or malformed.
fn parse_message(wrap: ElementRef<'_>) -> Option<MessageParts<'_>> {
    let message = wrap.select(&SELECTORS.message).next()?;
    let post = message.value().attr("data-post").unwrap_or_default();

    let id = match post.rsplit_once('/').map(|(_, id)| id.trim().parse::<i64>()) {
        Some(Ok(id)) => id,
        _ => {
            tracing::debug!("Skipping message with malformed post id '{}'", post);
            return None;
        }
    };

    let text = wrap.select(&SELECTORS.text).next();
    let tags = text.map(extract_tags).unwrap_or_default();

    Some(MessageParts {
        id,
        container: wrap,
        text,
        tags,
    })
}

/// Hashtags of a message body, in order of appearance
fn extract_tags(text: ElementRef<'_>) -> Vec<String> {
    text.select(&SELECTORS.anchor)
        .filter(|a| {
            a.value()
                .attr("href")
                .is_some_and(|href| href.contains(TAG_QUERY_MARKER))
        })
        .map(element_text)
        .filter(|t| t.starts_with('#'))
        .collect()
}

/// Trimmed, non-blank lines of an element's text
///
/// A text node may hold several lines; each becomes its own entry.
fn text_lines(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn description(lines: &[String]) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Value of the first "名称：..." line
fn named_title(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        NAME_PREFIXES
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
            .map(|rest| rest.trim().to_string())
            .filter(|title| !title.is_empty())
    })
}

/// Title of a button-mode message
///
/// Emoji-only lines are skipped. A line with a vertical bar yields the text
/// after it ("电视剧｜凡人修仙传" gives "凡人修仙传"); otherwise the first
/// line longer than two characters, emoji removed, is used.
fn button_title(lines: &[String]) -> Option<String> {
    for line in lines {
        let cleaned = EMOJI.replace_all(line, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            continue;
        }

        if line.contains('｜') || line.contains('|') {
            let after = line.split_once('｜').map_or(line.as_str(), |(_, rest)| rest);
            let after = after.split_once('|').map_or(after, |(_, rest)| rest);
            let title = after.trim();
            return (!title.is_empty()).then(|| title.to_string());
        }

        if cleaned.chars().count() > 2 {
            return Some(cleaned.to_string());
        }
    }
    None
}
