use anyhow::Result;
use clap::Parser;
use estatsync::{config::Config, config::DEFAULT_VALUES_TABLE, init_tracing, store};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(about = "Delete every row of a stored wide value table, keeping its columns")]
struct Args {
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
    let removed = store::values::clear_values(&conn, &args.table)?;
    info!(table = %args.table, rows = removed, "cleared");
    Ok(())
}
