mod browser;
mod chrome;
mod config;
mod credentials;
mod error;
mod fetch;
mod merge;
mod normalize;
mod paths;
mod session;
mod store;

use anyhow::Result;
use clap::Parser;
use config::Config;
use credentials::OpCli;
use error::RunError;
use fetch::{ActivityFetcher, FetchWindow};
use std::path::PathBuf;
use store::{CanonicalStore, RunSnapshot};

#[derive(Parser)]
#[command(name = "kindle-stats")]
#[command(about = "Incremental scraper for kids' Kindle reading activity")]
#[command(version)]
struct Cli {
    /// Save screenshots and log all captured API responses
    #[arg(long)]
    debug: bool,

    /// Storage home override (default: ~/.kindle-stats)
    #[arg(long, value_name = "DIR")]
    data_home: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Some(dir) = &cli.data_home {
        std::env::set_var(paths::HOME_ENV, dir);
    }
    init_tracing(cli.debug);

    if let Err(err) = run(cli.debug) {
        eprintln!("[kindle-stats] Error: {:#}", err);
        let code = err
            .downcast_ref::<RunError>()
            .map(RunError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "kindle_stats=debug"
    } else {
        "kindle_stats=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One full fetch-and-merge cycle. Either the whole fetched window commits
/// to the canonical store, or nothing does.
fn run(debug: bool) -> Result<()> {
    let config = Config::load_or_init()?;
    let credentials = OpCli::new(&config)?;

    let store_path = paths::canonical_path()?;
    let mut store = CanonicalStore::load(&store_path)?;

    let today = chrono::Utc::now()
        .with_timezone(&fetch::DASHBOARD_TZ)
        .date_naive();
    let window = FetchWindow::compute(store.latest_date(), today);
    match store.latest_date() {
        Some(latest) => eprintln!(
            "[kindle-stats] Incremental fetch starting from existing latest day: {}",
            latest
        ),
        None => eprintln!(
            "[kindle-stats] No existing reading history found; using the {}-day bootstrap window",
            window.days()
        ),
    }

    let session = {
        let mut browser = chrome::ChromeBrowser::launch()?;
        session::establish(&mut browser, &credentials, debug)?
        // The browser closes here; everything else is direct HTTP with the
        // harvested cookies.
    };
    let names: Vec<&str> = session.children.values().map(String::as_str).collect();
    eprintln!("[kindle-stats] Found children: {}", names.join(", "));

    let fetcher = ActivityFetcher::new(session);
    let report = fetcher.fetch_window(&window)?;

    archive_run(&report);

    let records = normalize::normalize(&report.payloads);
    eprintln!("[kindle-stats] Fetched {} days of activity", records.len());
    if !report.skipped.is_empty() {
        eprintln!(
            "[kindle-stats] {} sub-windows were beyond retention and skipped",
            report.skipped.len()
        );
    }

    let days_before = store.reading_activity.len();
    merge::merge(&mut store, records, chrono::Utc::now());
    store.save_atomic(&store_path)?;

    let total = store.reading_activity.len();
    eprintln!();
    eprintln!(
        "[kindle-stats] Merged: {} total days (+{} new)",
        total,
        total - days_before
    );
    match (store.reading_activity.first(), store.reading_activity.last()) {
        (Some(first), Some(last)) => {
            eprintln!("[kindle-stats] Date range: {} to {}", first.date, last.date);
        }
        _ => eprintln!("[kindle-stats] Date range: no activity yet"),
    }
    eprintln!("[kindle-stats] Saved to {}", store_path.display());
    Ok(())
}

/// Writes the raw snapshot. The archive is diagnostic only, so a failure
/// here warns and moves on rather than losing the run.
fn archive_run(report: &fetch::FetchReport) {
    let stamp = chrono::Local::now().format("%Y-%m-%dT%H%M%S").to_string();
    let snapshot_file = match paths::snapshot_path(&stamp) {
        Ok(path) => path,
        Err(err) => {
            tracing::warn!("failed to resolve snapshot path: {:#}", err);
            return;
        }
    };
    let snapshot = RunSnapshot {
        fetched_at: chrono::Utc::now(),
        responses: &report.payloads,
        retention_skipped: &report.skipped,
    };
    match store::archive_snapshot(&snapshot_file, &snapshot) {
        Ok(()) => eprintln!(
            "[kindle-stats] Raw fetch saved to {}",
            snapshot_file.display()
        ),
        Err(err) => tracing::warn!("failed to archive raw snapshot: {:#}", err),
    }
}
