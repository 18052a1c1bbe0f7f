//! Scanner CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scanner::{
    config::{load_config, load_url_list},
    error::Result,
    models::{Config, DrainMode, ScanSummary},
    pipeline,
    storage::{ResultStore, SqliteStore},
    utils::http,
};

/// Depth-limited concurrent web scanner
#[derive(Parser, Debug)]
#[command(
    name = "scanner",
    version,
    about = "Crawl seed URLs and record the requests each page makes"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the seed URLs and everything reachable within the depth limit
    Scan {
        /// Seed URL file (default: scanner.url_list)
        #[arg(long)]
        urls: Option<PathBuf>,

        /// Starting depth for seed URLs
        #[arg(long)]
        depth: Option<u32>,

        /// Number of concurrent workers
        #[arg(long)]
        threads: Option<usize>,

        /// Skip URLs already in the result database
        #[arg(long)]
        resume: bool,

        /// Wipe the result database before scanning
        #[arg(long)]
        clear_history: bool,

        /// When to stop draining the queue: settle or first_empty
        #[arg(long)]
        drain_mode: Option<DrainMode>,
    },

    /// List stored scan results, newest first
    Report {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove every stored scan result
    Clear,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli.config)?;
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Scan {
            urls,
            depth,
            threads,
            resume,
            clear_history,
            drain_mode,
        } => {
            if let Some(depth) = depth {
                config.scanner.depth = depth;
            }
            if let Some(threads) = threads {
                config.scanner.thread_count = threads;
            }
            if let Some(mode) = drain_mode {
                config.scanner.drain_mode = mode;
            }
            config.scanner.resume |= resume;
            config.scanner.clear_history |= clear_history;
            config.validate()?;

            let url_path = urls.unwrap_or_else(|| PathBuf::from(&config.scanner.url_list));
            let seeds = load_url_list(&url_path)?;
            if seeds.is_empty() {
                log::warn!("No URLs in {}. Nothing to scan.", url_path.display());
                return Ok(());
            }
            log::info!("Loaded {} seed URLs from {}", seeds.len(), url_path.display());

            let store = open_store(&config).await?;
            let client = http::create_client(&config.http)?;
            let stats = pipeline::run_scan(
                Arc::new(config),
                Arc::new(store.clone()),
                &client,
                &seeds,
            )
            .await?;
            store.close().await;

            log::info!(
                "Scan complete: {} pages saved, {} failed",
                stats.succeeded,
                stats.failed
            );
        }

        Command::Report { json } => {
            let store = open_store(&config).await?;
            let scans = store.list_scans().await?;
            store.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&scans)?);
            } else {
                print_table(&scans);
            }
        }

        Command::Clear => {
            let store = open_store(&config).await?;
            store.clear_all().await?;
            store.close().await;
            log::info!("Cleared results in {}", config.storage.result_db);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let url_path = Path::new(&config.scanner.url_list);
            match load_url_list(url_path) {
                Ok(urls) => log::info!("✓ {} seed URLs in {}", urls.len(), url_path.display()),
                Err(e) => log::warn!("Seed list {} unreadable: {}", url_path.display(), e),
            }
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.storage.result_db)
        .await
        .inspect_err(|e| log::error!("Cannot open {}: {}", config.storage.result_db, e))
}

fn print_table(scans: &[ScanSummary]) {
    if scans.is_empty() {
        println!("No scans stored.");
        return;
    }

    println!(
        "{:<6} {:>5} {:>5} {:>5} {:>5}  {:<25}  {}",
        "CODE", "API", "JS", "GET", "POST", "SCANNED", "URL"
    );
    for scan in scans {
        println!(
            "{:<6} {:>5} {:>5} {:>5} {:>5}  {:<25}  {}",
            scan.status_code,
            scan.api_count,
            scan.script_count,
            scan.get_count,
            scan.post_count,
            scan.scanned_at,
            scan.url
        );
    }
    println!("{} scans", scans.len());
}
