//! Statistics generation from the resource store
//!
//! This module provides functionality for extracting and displaying
//! per-channel harvest statistics and the pending-task summary.

use crate::config::{Config, ExtractionMode};
use crate::state::CrawlCheckpoint;
use crate::storage::{ResourceStore, StorageResult};

/// Harvest statistics of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatistics {
    pub channel_id: String,
    pub name: String,
    pub mode: ExtractionMode,

    /// Stored resources
    pub total: u64,

    /// Resources no longer awaiting resolution (found or unavailable)
    pub resolved: u64,

    /// Resources awaiting resolution
    pub unresolved: u64,

    /// Highest stored message id, 0 when empty
    pub latest_message_id: i64,
}

/// Loads statistics of every configured channel, in configuration order
///
/// # Arguments
///
/// * `store` - The store to query
/// * `config` - Supplies the channel list
///
/// # Returns
///
/// * `Ok(Vec<ChannelStatistics>)` - One entry per channel
/// * `Err(StorageError)` - Failed to query the store
pub fn load_statistics(
    store: &dyn ResourceStore,
    config: &Config,
) -> StorageResult<Vec<ChannelStatistics>> {
    config
        .channels
        .iter()
        .map(|channel| {
            let total = store.count(&channel.id)?;
            let unresolved = store.count_unresolved(&channel.id)?;
            Ok(ChannelStatistics {
                channel_id: channel.id.clone(),
                name: channel.name.clone(),
                mode: channel.mode,
                total,
                resolved: total.saturating_sub(unresolved),
                unresolved,
                latest_message_id: store.latest_message_id(&channel.id)?,
            })
        })
        .collect()
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The per-channel statistics to display
/// * `pending` - The checkpoint of an interrupted full crawl, if any
pub fn print_statistics(stats: &[ChannelStatistics], pending: Option<&CrawlCheckpoint>) {
    println!("=== Database ===");

    for channel in stats {
        println!();
        println!("[{}] {} ({})", channel.channel_id, channel.name, channel.mode);

        let share = if channel.total > 0 {
            (channel.resolved as f64 / channel.total as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "  Resources: {} (resolved: {}, unresolved: {}, {:.1}%)",
            channel.total, channel.resolved, channel.unresolved, share
        );
        println!("  Latest message id: {}", channel.latest_message_id);
    }

    println!();
    println!("=== Crawl state ===");
    match pending {
        Some(checkpoint) => {
            println!("Pending task: {}", checkpoint.channel_id);
            println!("  Mode: {}", checkpoint.mode);
            println!("  Saved so far: {}", checkpoint.total_crawled);
            if let Some(cursor) = checkpoint.last_before_id {
                println!("  Next page before: {}", cursor);
            }
            println!(
                "Run 'crawl {} --resume' to continue",
                checkpoint.channel_id
            );
        }
        None => println!("No pending task"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, CrawlerConfig, HttpConfig, LinksConfig, StorageConfig};
    use crate::storage::{DestinationLink, Resource, SqliteStore};
    use tempfile::TempDir;

    fn config() -> Config {
        Config {
            crawler: CrawlerConfig::default(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            links: LinksConfig::default(),
            channels: vec![
                ChannelConfig {
                    id: "alpha".to_string(),
                    url: "https://t.me/s/alpha".to_string(),
                    name: "Alpha".to_string(),
                    mode: ExtractionMode::Deferred,
                },
                ChannelConfig {
                    id: "beta".to_string(),
                    url: "https://t.me/s/beta".to_string(),
                    name: "Beta".to_string(),
                    mode: ExtractionMode::Inline,
                },
            ],
        }
    }

    fn resource(id: i64, destination: DestinationLink) -> Resource {
        Resource {
            message_id: id,
            title: "t".to_string(),
            tags: vec![],
            deferred_ref: None,
            destination,
            description: None,
            created_at: None,
        }
    }

    #[test]
    fn test_load_statistics() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let store =
            SqliteStore::open(&dir.path().join("db.sqlite"), config.channel_ids()).unwrap();

        store
            .upsert("alpha", &resource(5, DestinationLink::Pending))
            .unwrap();
        store
            .upsert("alpha", &resource(9, DestinationLink::Unavailable))
            .unwrap();
        store
            .upsert(
                "alpha",
                &resource(7, DestinationLink::Found("https://115cdn.com/s/x".to_string())),
            )
            .unwrap();

        let stats = load_statistics(&store, &config).unwrap();
        assert_eq!(stats.len(), 2);

        let alpha = &stats[0];
        assert_eq!(alpha.total, 3);
        assert_eq!(alpha.resolved, 2);
        assert_eq!(alpha.unresolved, 1);
        assert_eq!(alpha.latest_message_id, 9);

        let beta = &stats[1];
        assert_eq!(beta.channel_id, "beta");
        assert_eq!(beta.total, 0);
        assert_eq!(beta.latest_message_id, 0);
    }
}
