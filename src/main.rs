//! Dict-Harvester main entry point
//!
//! This is the command-line interface for the dictionary harvester.

use anyhow::Context;
use clap::Parser;
use dict_harvester::config::{load_config_with_hash, Config};
use dict_harvester::crawler::{harvest, ResumePolicy};
use dict_harvester::state::CrawlStateStore;
use dict_harvester::url::Level;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, BufReader};
use tracing_subscriber::EnvFilter;

/// Dict-Harvester: crawl state and output for a dictionary harvest
///
/// Reads crawl engine events (one JSON object per line) from a file or
/// stdin, answers each with a decision on stdout, and keeps failure
/// records, the resume cursor and per-letter output on disk.
#[derive(Parser, Debug)]
#[command(name = "dict-harvester")]
#[command(version = "1.0.0")]
#[command(about = "Crawl state and output aggregation for a dictionary harvest", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Read engine events from FILE instead of stdin
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard saved crawl state (failures and cursor) before starting
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the effective settings without running
    #[arg(long, conflicts_with_all = ["stats", "failed"])]
    dry_run: bool,

    /// Show output statistics and crawl progress and exit
    #[arg(long, conflicts_with_all = ["dry_run", "failed"])]
    stats: bool,

    /// List recorded URL failures and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    failed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.failed {
        handle_failed(&config)?;
    } else {
        handle_harvest(&config, cli.events.as_deref(), cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout carries the decision stream.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("dict_harvester=info,warn"),
            1 => EnvFilter::new("dict_harvester=debug,info"),
            2 => EnvFilter::new("dict_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Dict-Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Retry HTTP codes: {:?}", config.crawler.retry_http_codes);
    println!(
        "  Second-level segments: {}",
        config.crawler.second_level_segments
    );
    println!("  Resume policy: {:?}", config.crawler.resume_policy);

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir);
    println!("  State directory: {}", config.output.state_dir);
    println!("  Flush every: {} records", config.output.flush_every);
    println!("  Flush policy: {:?}", config.output.flush_policy);

    if config.crawler.resume_policy == ResumePolicy::AbsenceAsSuccess {
        println!("\n! Only URLs with a recorded failure will be dispatched");
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows output totals and crawl progress
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use dict_harvester::output::{load_statistics, print_progress, print_statistics};

    let data_dir = Path::new(&config.output.data_dir);
    println!("Data directory: {}\n", data_dir.display());

    let stats = load_statistics(data_dir)
        .with_context(|| format!("failed to read statistics in {}", data_dir.display()))?;
    print_statistics(&stats);

    let store = CrawlStateStore::load(Path::new(&config.output.state_dir))?;
    print_progress(&store.get_progress(), &store.failure_counts());

    Ok(())
}

/// Handles the --failed mode: lists every recorded failure by level
fn handle_failed(config: &Config) -> anyhow::Result<()> {
    let store = CrawlStateStore::load(Path::new(&config.output.state_dir))?;

    for level in Level::all() {
        let failed = store.failed_urls(Some(level));
        println!("{} ({}):", level, failed.len());
        for entry in failed {
            println!(
                "  {} [{}, {} retries, {}]",
                entry.url,
                entry.status,
                entry.retry_count,
                entry.last_update.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}

/// Handles the main harvest: events in, decisions out, state on disk
async fn handle_harvest(config: &Config, events: Option<&Path>, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (discarding saved crawl state)");
        CrawlStateStore::reset(Path::new(&config.output.state_dir))?;
    } else {
        tracing::info!("Starting harvest (will resume from saved state)");
    }

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open events file {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match harvest(config, reader, tokio::io::stdout(), shutdown).await {
        Ok(summary) => {
            tracing::info!(
                "Harvest {}: {} events, {} malformed, {} items in output",
                if summary.interrupted {
                    "interrupted"
                } else {
                    "completed"
                },
                summary.events,
                summary.malformed,
                summary.stats.total_items
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
