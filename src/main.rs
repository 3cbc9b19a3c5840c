//! Channel-Harvest main entry point
//!
//! This is the command-line interface for the channel archive harvester.

use anyhow::{bail, Context};
use channel_harvest::config::{load_config_with_hash, Config};
use channel_harvest::crawler::{CrawlRequest, Orchestrator};
use channel_harvest::output::{
    format_resource_details, format_resource_line, load_statistics, print_statistics,
};
use channel_harvest::HarvestError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Channel-Harvest: a resumable harvester for public channel archives
///
/// Pages through the public web rendering of configured channels, extracts
/// resource records from each message, and stores them per channel so that
/// long crawls can be interrupted and resumed.
#[derive(Parser, Debug)]
#[command(name = "channel-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable harvester for public channel archives", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, value_name = "CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured channels with their stored counts
    Channels,

    /// Crawl one channel
    Crawl(CrawlArgs),

    /// Resolve deferred links of one channel
    Resolve {
        /// Channel identifier
        #[arg(short, long)]
        channel: String,

        /// Resolve at most this many resources (all when omitted)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search stored resources by title or tag
    Search {
        keyword: String,

        /// Restrict to one channel
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Show one search hit in full, resolving its link if needed
    Get {
        keyword: String,

        /// Restrict to one channel
        #[arg(short, long)]
        channel: Option<String>,

        /// Which hit to show (1-based)
        #[arg(long, default_value_t = 1)]
        index: usize,
    },

    /// List the most recent resources of a channel
    List {
        /// Channel identifier
        #[arg(short, long)]
        channel: String,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show per-channel statistics and the pending task
    Status {
        /// Restrict to one channel
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Crawl and resolve every configured channel
    Sync {
        /// Full crawl instead of incremental
        #[arg(long)]
        full: bool,
    },
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Channel identifier
    #[arg(short, long)]
    channel: String,

    /// Crawl the whole history
    #[arg(long, conflicts_with_all = ["incremental", "resume", "limit"])]
    all: bool,

    /// Stop once this many new resources are saved
    #[arg(long, default_value_t = 50)]
    limit: u64,

    /// Crawl new messages until enough known ones are seen
    #[arg(long, conflicts_with_all = ["all", "resume", "limit"])]
    incremental: bool,

    /// Continue the interrupted full crawl
    #[arg(long, conflicts_with_all = ["all", "incremental", "limit"])]
    resume: bool,

    /// Resolve deferred links after crawling
    #[arg(long)]
    resolve: bool,
}

impl CrawlArgs {
    fn request(&self) -> CrawlRequest {
        if self.all {
            CrawlRequest::Full
        } else if self.resume {
            CrawlRequest::Resume
        } else if self.incremental {
            CrawlRequest::Incremental
        } else {
            CrawlRequest::Limited(self.limit)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let orchestrator = Orchestrator::from_config(config).context("failed to open harvester")?;
    let cancel = interrupt_token();

    match cli.command {
        Command::Channels => handle_channels(&orchestrator)?,
        Command::Crawl(args) => handle_crawl(&orchestrator, &args, &cancel).await?,
        Command::Resolve { channel, limit } => {
            let report = orchestrator.resolve_batch(&channel, limit, &cancel).await?;
            println!("{}: {}", channel, report);
        }
        Command::Search { keyword, channel } => {
            handle_search(&orchestrator, &keyword, channel.as_deref())?
        }
        Command::Get {
            keyword,
            channel,
            index,
        } => handle_get(&orchestrator, &keyword, channel.as_deref(), index).await?,
        Command::List { channel, limit } => handle_list(&orchestrator, &channel, limit)?,
        Command::Status { channel } => handle_status(&orchestrator, channel.as_deref())?,
        Command::Sync { full } => handle_sync(&orchestrator, full, &cancel).await?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("channel_harvest=info,warn"),
            1 => EnvFilter::new("channel_harvest=debug,info"),
            2 => EnvFilter::new("channel_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels the returned token on the first Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    token
}

fn channel_name<'a>(config: &'a Config, channel_id: &'a str) -> &'a str {
    config
        .channel(channel_id)
        .map(|c| c.name.as_str())
        .unwrap_or(channel_id)
}

/// Handles `channels`: lists configured channels
fn handle_channels(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let config = orchestrator.config();
    let store = orchestrator.store();

    println!("Channels ({}):", config.channels.len());
    for channel in &config.channels {
        println!(
            "  - {} [{}] {} ({} stored)",
            channel.id,
            channel.mode,
            channel.name,
            store.count(&channel.id)?
        );
        println!("    {}", channel.url);
    }
    Ok(())
}

/// Handles `crawl`, optionally followed by resolution
async fn handle_crawl(
    orchestrator: &Orchestrator,
    args: &CrawlArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let request = args.request();

    if args.resolve {
        let report = orchestrator
            .sync_channel(&args.channel, request, cancel)
            .await?;
        if let Some(crawl) = &report.crawl {
            println!("{}", crawl);
        }
        println!("Resolution: {}", report.resolve);
        return Ok(());
    }

    match orchestrator.crawl(&args.channel, request, cancel).await {
        Ok(report) => {
            println!("{}", report);
            if report.outcome.is_early() && request.mode().is_resumable() {
                println!("Run 'crawl -c {} --resume' to continue", args.channel);
            }
            Ok(())
        }
        Err(HarvestError::NoPendingTask { channel }) => {
            bail!("nothing to resume for {}; start with 'crawl -c {} --all'", channel, channel)
        }
        Err(e) => Err(e.into()),
    }
}

/// Handles `search`
fn handle_search(
    orchestrator: &Orchestrator,
    keyword: &str,
    channel: Option<&str>,
) -> anyhow::Result<()> {
    let hits = orchestrator.store().search(keyword, channel)?;
    if hits.is_empty() {
        println!("No resources match '{}'", keyword);
        return Ok(());
    }

    println!("{} resources match '{}':", hits.len(), keyword);
    for (i, (channel_id, resource)) in hits.iter().enumerate() {
        println!(
            "{:>3}. {} ({})",
            i + 1,
            format_resource_line(resource),
            channel_id
        );
    }
    Ok(())
}

/// Handles `get`: shows one search hit, resolving it on demand
async fn handle_get(
    orchestrator: &Orchestrator,
    keyword: &str,
    channel: Option<&str>,
    index: usize,
) -> anyhow::Result<()> {
    let hits = orchestrator.store().search(keyword, channel)?;
    let Some((channel_id, resource)) = index.checked_sub(1).and_then(|i| hits.get(i)) else {
        bail!("no hit #{} for '{}' ({} found)", index, keyword, hits.len());
    };

    let resource = orchestrator
        .resolve_message(channel_id, resource.message_id)
        .await?;
    println!(
        "{}",
        format_resource_details(channel_name(orchestrator.config(), channel_id), &resource)
    );
    Ok(())
}

/// Handles `list`
fn handle_list(orchestrator: &Orchestrator, channel: &str, limit: usize) -> anyhow::Result<()> {
    if orchestrator.config().channel(channel).is_none() {
        return Err(HarvestError::UnknownChannel(channel.to_string()).into());
    }

    let resources = orchestrator.store().list_all(channel, limit)?;
    println!(
        "{} ({} of {}):",
        channel_name(orchestrator.config(), channel),
        resources.len(),
        orchestrator.store().count(channel)?
    );
    for resource in &resources {
        println!("  {}", format_resource_line(resource));
    }
    Ok(())
}

/// Handles `status`: shows statistics from the database
fn handle_status(orchestrator: &Orchestrator, channel: Option<&str>) -> anyhow::Result<()> {
    let config = orchestrator.config();
    println!("Database: {}\n", config.storage.database_path);

    let mut stats = load_statistics(orchestrator.store(), config)?;
    if let Some(channel) = channel {
        if config.channel(channel).is_none() {
            return Err(HarvestError::UnknownChannel(channel.to_string()).into());
        }
        stats.retain(|s| s.channel_id == channel);
    }

    print_statistics(&stats, orchestrator.pending_checkpoint().as_ref());
    Ok(())
}

/// Handles `sync`: every channel, crawl then resolve
async fn handle_sync(
    orchestrator: &Orchestrator,
    full: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let reports = orchestrator.sync_all(full, cancel).await?;

    println!("=== Sync ===");
    for (channel_id, report) in &reports {
        match &report.crawl {
            Some(crawl) => println!("{}", crawl),
            None => println!("{}: skipped crawl (empty channel)", channel_id),
        }
        println!("  Resolution: {}", report.resolve);
    }
    if reports.len() < orchestrator.config().channels.len() {
        println!(
            "Interrupted after {} of {} channels",
            reports.len(),
            orchestrator.config().channels.len()
        );
    }
    Ok(())
}
