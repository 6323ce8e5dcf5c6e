use anyhow::{bail, Result};
use clap::Parser;
use estatsync::{
    config::{Config, DatasetConfig},
    fetch::{self, FetchOptions},
    init_tracing, process, store,
};
use reqwest::Client;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Fetch e-Stat datasets and merge them into a wide SQLite table"
)]
struct Args {
    /// YAML config file; missing means defaults
    #[arg(short, long, default_value = "estatsync.yaml")]
    config: PathBuf,
    /// statsDataId to fetch; repeat for several. Replaces the config's dataset list
    #[arg(short = 's', long = "stats-id")]
    stats_ids: Vec<String>,
    /// Target wide table for --stats-id datasets
    #[arg(short, long)]
    table: Option<String>,
    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,
    /// Records per request
    #[arg(long)]
    page_size: Option<u64>,
    /// Stop after this many records per dataset
    #[arg(long)]
    max_records: Option<u64>,
    /// Pause between requests, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    init_tracing("info");
    let args = Args::parse();

    // ─── 2) load config, apply flags ─────────────────────────────────
    let mut cfg = Config::load(&args.config)?;
    if !args.stats_ids.is_empty() {
        cfg.datasets = args
            .stats_ids
            .iter()
            .map(|id| {
                let mut ds = DatasetConfig::new(id.as_str());
                if let Some(t) = &args.table {
                    ds.table = t.clone();
                }
                ds
            })
            .collect();
    }
    if let Some(db) = args.db {
        cfg.db.path = db;
    }
    if let Some(n) = args.page_size {
        cfg.fetch.page_size = n;
    }
    if args.max_records.is_some() {
        cfg.fetch.max_records = args.max_records;
    }
    if let Some(ms) = args.delay_ms {
        cfg.fetch.delay_ms = ms;
    }
    cfg.validate()?;
    cfg.require_app_id()?;
    if cfg.datasets.is_empty() {
        bail!("no datasets: list them in {} or pass --stats-id", args.config.display());
    }
    info!(
        datasets = cfg.datasets.len(),
        db = %cfg.db.path.display(),
        "startup"
    );

    // ─── 3) open store ───────────────────────────────────────────────
    let client = Client::builder().gzip(true).build()?;
    let opts = FetchOptions::from(&cfg.fetch);
    let mut conn = store::open(&cfg.db.path)?;

    // ─── 4) fetch → reshape → persist, one dataset at a time ─────────
    for ds in &cfg.datasets {
        let start = Instant::now();
        let dataset = fetch::fetch_stats_data(&client, &cfg.api, ds, &opts).await?;
        let reshaped = process::reshape(&dataset)?;
        let report = store::persist_dataset(&mut conn, &ds.table, &dataset, &reshaped)?;
        info!(
            stats_data_id = %ds.stats_data_id,
            table = %ds.table,
            records = dataset.values.len(),
            rows = report.rows,
            columns = report.columns,
            elapsed = ?start.elapsed(),
            "dataset done"
        );
    }

    info!("all datasets persisted");
    Ok(())
}
