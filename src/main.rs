//! Talpa main entry point
//!
//! This is the command-line interface for the Talpa crawl engine.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use talpa::config::{load_config_with_hash, Config};
use talpa::crawler::build_crawler;
use talpa::storage::SqliteSink;
use tracing_subscriber::EnvFilter;

/// Talpa: a concurrent two-stage crawl engine
///
/// Talpa fetches the configured sites and forums with a bounded pool of
/// downloaders and stores documents through a separate pool of scraper workers.
#[derive(Parser, Debug)]
#[command(name = "talpa")]
#[command(version)]
#[command(about = "A concurrent two-stage crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show document counts from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("talpa=info,warn"),
            1 => EnvFilter::new("talpa=debug,info"),
            2 => EnvFilter::new("talpa=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Talpa Dry Run ===\n");

    println!("Engine:");
    println!("  Downloader workers: {}", config.engine.downloader_concurrency);
    println!("  Scraper workers: {}", config.engine.scraper_concurrency);
    println!("  Queue capacity hint: {}", config.engine.queue_capacity_hint);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    match &config.output.dump_dir {
        Some(dir) => println!(
            "  Captures: {} (bodies: {})",
            dir, config.output.dump_bodies
        ),
        None => println!("  Captures: disabled"),
    }

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        println!(
            "  - {} (depth {}, up to {} pages, priority {})",
            site.name, site.max_depth, site.max_pages, site.priority
        );
        for seed in &site.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\nForums ({}):", config.forums.len());
    for forum in &config.forums {
        println!(
            "  - {} ({}: {} listing pages of {} threads, {} posts per page, priority {})",
            forum.name,
            forum.forum,
            forum.list_pages,
            forum.threads_per_page,
            forum.posts_per_page,
            forum.priority
        );
        println!("    * {}", forum.list_endpoint);
        println!("    * {}", forum.thread_endpoint);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs and {} listing pages",
        config.sites.iter().map(|s| s.seeds.len()).sum::<usize>(),
        config.forums.iter().map(|f| f.list_pages).sum::<u32>()
    );
}

/// Handles the --stats mode: shows document counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let sink = SqliteSink::open(Path::new(&config.output.database_path))
        .context("Failed to open the document database")?;
    let counts = sink.collection_counts()?;

    if counts.is_empty() {
        println!("No documents stored yet");
    }
    for (collection, count) in counts {
        println!("  {:<20} {}", collection, count);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    let sink = Arc::new(
        SqliteSink::open(Path::new(&config.output.database_path))
            .context("Failed to open the document database")?,
    );

    let seed_count: usize = config.sites.iter().map(|s| s.seeds.len()).sum();
    tracing::info!(
        "Crawling {} sites from {} seed URLs and {} forums",
        config.sites.len(),
        seed_count,
        config.forums.len()
    );

    let crawler = build_crawler(config, sink.clone())?;
    crawler.start()?;

    tokio::select! {
        _ = crawler.wait() => tracing::info!("Crawl completed successfully"),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::warn!("Interrupted, stopping crawler");
                    crawler.stop().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for interrupts: {}", e);
                    crawler.wait().await;
                }
            }
        }
    }

    for (collection, count) in sink.collection_counts()? {
        tracing::info!("{}: {} documents", collection, count);
    }

    Ok(())
}
