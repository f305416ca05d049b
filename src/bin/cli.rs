//! Harvester CLI
//!
//! Harvests one configured source, or all of them, into the sink.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use harvester::{
    error::{AppError, Result},
    models::{Config, Lifecycle},
    pipeline::Harvester,
    services::{HttpSink, ServiceRegistry, SinkService, SourceService},
    utils::{http, log as report},
};
use tokio_util::sync::CancellationToken;

/// Harvests metadata from remote services into a discovery index
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about = "Metadata harvester")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    /// Key of the service to harvest, or "all"
    #[arg(short, long)]
    service: Option<String>,

    /// Only harvest entities modified since this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    last_modified: Option<NaiveDate>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{value}: {e}"))
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_services(registry: &ServiceRegistry) {
    println!("Available services:");
    println!("  all");
    for key in registry.keys() {
        println!("  {key}");
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    let client = http::create_async_client(&config.http)?;
    let mut registry = ServiceRegistry::from_config(&config, &client)?;

    let mut sources: Vec<Box<dyn SourceService>> = match cli.service.as_deref() {
        Some("all") => registry.take_all(),
        Some(key) if registry.contains(key) => registry.take(key).into_iter().collect(),
        Some(key) => {
            println!("Unknown service: {key}");
            print_services(&registry);
            return Ok(());
        }
        None => {
            print_services(&registry);
            return Ok(());
        }
    };
    if sources.is_empty() {
        log::info!("No services configured in {}", cli.config.display());
        return Ok(());
    }

    if let Some(date) = cli.last_modified {
        let at = date
            .and_hms_opt(0, 0, 0)
            .map(|at| Utc.from_utc_datetime(&at))
            .ok_or_else(|| AppError::config(format!("invalid date: {date}")))?;
        for source in &mut sources {
            source.set_last_modified(at)?;
        }
    }

    let sink: Arc<dyn SinkService> = Arc::new(HttpSink::new(config.sink.clone(), client)?);
    let harvester = Harvester::new(&config.harvester);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, closing sources...");
            signal.cancel();
        }
    });

    report::header(&format!("Harvesting {} service(s)", sources.len()));
    let snapshots = harvester.run_all(sources, Arc::clone(&sink), &shutdown).await;
    sink.close().await;

    for snapshot in &snapshots {
        report::summary(&snapshot.id, &report::status_items(snapshot));
    }

    if snapshots.iter().any(|s| s.lifecycle == Lifecycle::Failed) {
        log::error!("One or more harvests failed to start");
        std::process::exit(1);
    }
    Ok(())
}
