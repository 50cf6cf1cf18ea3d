use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use nizima_fetch::config::Config;
use nizima_fetch::fetcher::{FetchStatus, Fetcher};
use nizima_fetch::logging::{self, LogLevel};
use nizima_fetch::{Error, Result};

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

/// Fetch Live2D model bundles from the nizima catalog.
#[derive(Parser, Debug)]
#[command(name = "nizima-fetch")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    NIZIMA_FETCH_LOG    Log level (error, warn, info, debug, trace)")]
struct Cli {
    /// Item ids to fetch.
    #[arg(required = true)]
    item_ids: Vec<String>,

    /// Output directory the items are published under.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of items fetched concurrently.
    #[arg(short, long)]
    concurrent: Option<usize>,

    /// Attempt the export archive even when the catalog does not mark it
    /// downloadable.
    #[arg(long)]
    export: bool,

    /// Log verbosity (overrides NIZIMA_FETCH_LOG).
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("nizima-fetch error: {err}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load()?;
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if let Some(concurrent) = cli.concurrent {
        config.item_concurrency = concurrent.max(1);
    }
    if cli.export {
        config.attempt_export = true;
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received; letting in-flight work finish");
            signal_cancel.cancel();
        }
    });

    let item_ids = dedup_preserving_order(cli.item_ids);

    let fetcher = Fetcher::new(config, cancel.clone())?;
    let results = fetcher.fetch_many(&item_ids).await;

    let mut failed: Vec<&str> = Vec::new();
    for (item_id, result) in &results {
        match result {
            Ok(FetchStatus::Fetched(dir)) => {
                println!("{item_id}: fetched -> {}", dir.display());
            }
            Ok(FetchStatus::UpToDate) => {
                println!("{item_id}: up to date");
            }
            Ok(FetchStatus::SkippedNoPreview) => {
                println!("{item_id}: no preview archive");
                failed.push(item_id);
            }
            Err(Error::Cancelled) => {
                println!("{item_id}: interrupted");
            }
            Err(err) => {
                eprintln!("{item_id}: failed: {err}");
                failed.push(item_id);
            }
        }
    }

    if cancel.is_cancelled() {
        println!("interrupted; completed items are kept and the rest can be re-run");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }

    if failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} of {} item(s) failed: {}",
            failed.len(),
            results.len(),
            failed.join(", ")
        );
        Ok(ExitCode::from(EXIT_FAILURE))
    }
}

fn dedup_preserving_order(item_ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    item_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
