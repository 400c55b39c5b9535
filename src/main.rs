use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;

use commitpulse::archive::{ArchiveClient, Scanner};
use commitpulse::bigquery::{merge_totals, missing_span, BigQueryClient};
use commitpulse::chart;
use commitpulse::events::releases_between;
use commitpulse::models::Month;
use commitpulse::store::{self, Store};

#[derive(Parser)]
#[command(
    name = "commitpulse",
    version,
    about = "Monthly GitHub commit volume charted against major LLM releases"
)]
struct Cli {
    /// Directory holding the cache and checkpoint files
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan GitHub Archive hour files day by day, resuming from the checkpoint
    Scan {
        /// First date to fetch, inclusive (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date, default_value = "2020-01-01")]
        start: NaiveDate,
        /// Last date to fetch, inclusive (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date, default_value = "2025-01-31")]
        end: NaiveDate,
        /// Reprocess days already recorded in the checkpoint
        #[arg(long)]
        force: bool,
    },
    /// Fetch monthly totals with one BigQuery aggregate over the month range
    Query {
        /// GCP project ID the query is billed against
        #[arg(long)]
        project: String,
        /// Start month, inclusive (YYYY-MM)
        #[arg(long, value_parser = parse_month, default_value = "2023-01")]
        start: Month,
        /// End month, inclusive (YYYY-MM)
        #[arg(long, value_parser = parse_month, default_value = "2026-01")]
        end: Month,
    },
    /// Render the commit chart with release-event overlays
    Chart {
        /// Cache file to read (defaults to <data-dir>/monthly_commits.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Restrict the chart to months >= this (YYYY-MM)
        #[arg(long, value_parser = parse_month)]
        start: Option<Month>,
        /// Restrict the chart to months <= this (YYYY-MM)
        #[arg(long, value_parser = parse_month)]
        end: Option<Month>,
        /// Save the chart here instead of opening a viewer
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}': expected YYYY-MM-DD", value))
}

fn parse_month(value: &str) -> std::result::Result<Month, String> {
    value.parse::<Month>().map_err(|err| err.to_string())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan { start, end, force } => cmd_scan(&cli.data_dir, start, end, force),
        Commands::Query {
            project,
            start,
            end,
        } => cmd_query(&cli.data_dir, &project, start, end),
        Commands::Chart {
            csv,
            start,
            end,
            out,
        } => cmd_chart(&cli.data_dir, csv, start, end, out),
    }
}

fn cmd_scan(data_dir: &Path, start: NaiveDate, end: NaiveDate, force: bool) -> Result<()> {
    if start > end {
        bail!("start date {} is after end date {}", start, end);
    }
    let store = Store::new(data_dir)?;
    let client = ArchiveClient::new();
    let scanner = Scanner::new(&client, &store);
    let totals = scanner.run(start, end, force)?;
    info!(
        "{} month(s) aggregated in {}",
        totals.len(),
        store.cache_path().display()
    );
    Ok(())
}

fn cmd_query(data_dir: &Path, project: &str, start: Month, end: Month) -> Result<()> {
    if start > end {
        bail!("start month {} is after end month {}", start, end);
    }
    let store = Store::new(data_dir)?;
    let mut totals = store.load_totals()?;

    let Some((span_start, span_end)) = missing_span(&totals, start, end) else {
        info!("all months between {} and {} already cached", start, end);
        return Ok(());
    };

    // The suffix filter is one contiguous BETWEEN; cached months inside the
    // span are re-fetched and overwritten on merge.
    info!(
        "{} month(s) cached; querying {} -> {}",
        totals.len(),
        span_start,
        span_end
    );
    let client = BigQueryClient::new(project)?;
    let fetched = client.fetch_totals(span_start, span_end)?;
    merge_totals(&mut totals, fetched);
    store.save_totals(&totals)?;
    info!(
        "saved {} month(s) to {}",
        totals.len(),
        store.cache_path().display()
    );
    Ok(())
}

fn cmd_chart(
    data_dir: &Path,
    csv: Option<PathBuf>,
    start: Option<Month>,
    end: Option<Month>,
    out: Option<PathBuf>,
) -> Result<()> {
    let store = Store::new(data_dir)?;
    let cache_path = csv.unwrap_or_else(|| store.cache_path());
    if !cache_path.exists() {
        bail!(
            "no commit data at '{}'; run `commitpulse scan` or `commitpulse query` first",
            cache_path.display()
        );
    }

    let totals = store::load_totals_from(&cache_path)?;
    let (series, _capped) = chart::prepare_series(&totals, start, end);
    if series.is_empty() {
        bail!("no commit data in the requested chart range");
    }

    let first_day = series[0].0.first_day();
    let last_day = series[series.len() - 1].0.first_day();
    let events = releases_between(first_day, last_day);
    info!(
        "plotting {} month(s) with {} release event(s)",
        series.len(),
        events.len()
    );
    chart::render_or_open(&series, &events, out.as_deref())?;
    Ok(())
}
