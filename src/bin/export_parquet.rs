use anyhow::{anyhow, Result};
use clap::Parser;
use estatsync::{
    config::{Config, DEFAULT_VALUES_TABLE},
    export::export_parquet,
    init_tracing, store,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(about = "Export a stored wide value table to Parquet")]
struct Args {
    /// Output Parquet file
    output: PathBuf,
    #[arg(short, long, default_value = "estatsync.yaml")]
    config: PathBuf,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(short, long, default_value = DEFAULT_VALUES_TABLE)]
    table: String,
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();
    let db = match args.db {
        Some(db) => db,
        None => Config::load(&args.config)?.db.path,
    };

    let conn = store::open(&db)?;
    let wide = store::values::load_wide(&conn, &args.table)?
        .ok_or_else(|| anyhow!("table {} not found in {}", args.table, db.display()))?;
    let rows = export_parquet(&wide, &args.output)?;
    info!(output = %args.output.display(), rows, "done");
    Ok(())
}
