//! Output module for harvest summaries
//!
//! This module handles:
//! - Per-channel statistics (`status`)
//! - Plain-text rendering of resources for the listing commands

pub mod stats;

pub use stats::{load_statistics, print_statistics, ChannelStatistics};

use crate::storage::{DestinationLink, Resource};

/// Longest title shown in one-line listings
const LISTING_TITLE_CHARS: usize = 50;

/// One-line rendering of a resource for listings
///
/// The marker shows the resolution state: `+` found, `-` unavailable,
/// `?` pending.
pub fn format_resource_line(resource: &Resource) -> String {
    let marker = match resource.destination {
        DestinationLink::Found(_) => '+',
        DestinationLink::Unavailable => '-',
        DestinationLink::Pending => '?',
    };
    format!(
        "{} [{}] {}",
        marker,
        resource.message_id,
        truncate(&resource.title, LISTING_TITLE_CHARS)
    )
}

/// Multi-line rendering of a resource
pub fn format_resource_details(channel_name: &str, resource: &Resource) -> String {
    let mut lines = vec![
        format!("Resource: {}", resource.title),
        format!("Channel:  {}", channel_name),
        format!("Message:  {}", resource.message_id),
    ];

    if !resource.tags.is_empty() {
        lines.push(format!("Tags:     {}", resource.tags.join(" ")));
    }
    match &resource.destination {
        DestinationLink::Found(link) => lines.push(format!("Link:     {}", link)),
        DestinationLink::Unavailable => lines.push("Link:     unavailable".to_string()),
        DestinationLink::Pending => lines.push("Link:     not resolved yet".to_string()),
    }
    if let Some(reference) = &resource.deferred_ref {
        lines.push(format!("Page:     {}", reference));
    }
    if let Some(created_at) = &resource.created_at {
        lines.push(format!("Saved:    {}", created_at.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(description) = &resource.description {
        lines.push(String::new());
        lines.push(description.clone());
    }

    lines.join("\n")
}

/// Truncates to `max` characters, never splitting one
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(max).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(destination: DestinationLink) -> Resource {
        Resource {
            message_id: 42,
            title: "流浪地球".to_string(),
            tags: vec!["#科幻".to_string()],
            deferred_ref: None,
            destination,
            description: Some("line".to_string()),
            created_at: None,
        }
    }

    #[test]
    fn test_format_resource_line() {
        assert_eq!(
            format_resource_line(&resource(DestinationLink::Pending)),
            "? [42] 流浪地球"
        );
        assert_eq!(
            format_resource_line(&resource(DestinationLink::Unavailable)),
            "- [42] 流浪地球"
        );
    }

    #[test]
    fn test_format_resource_details() {
        let details = format_resource_details(
            "Alpha",
            &resource(DestinationLink::Found("https://115cdn.com/s/a".to_string())),
        );
        assert!(details.contains("Link:     https://115cdn.com/s/a"));
        assert!(details.contains("Tags:     #科幻"));
        assert!(details.ends_with("\n\nline"));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("短标题", 5), "短标题");
        assert_eq!(truncate("一二三四五六", 3), "一二三…");
    }
}
