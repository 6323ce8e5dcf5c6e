use anyhow::{anyhow, bail, Result};
use clap::{ArgGroup, Parser};
use estatsync::{
    init_tracing,
    process::deviation::{
        classify_monthly_deviation, DeviationOptions, IdDedupe, NumericFrame, SortOrder,
    },
    process::KEY_COLUMN,
    store::{
        self,
        labels::{write_label_table, WriteMode},
    },
};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(about = "Label each value by its deviation from the same calendar month's mean")]
#[command(group(ArgGroup::new("source").required(true).args(["input_csv", "source_table"])))]
struct Args {
    /// Wide CSV with a date id column
    #[arg(long)]
    input_csv: Option<PathBuf>,
    /// Read a stored wide value table instead of a CSV
    #[arg(long)]
    source_table: Option<String>,
    #[arg(long, default_value = KEY_COLUMN)]
    id_col: String,
    /// Comma-separated; default is every all-numeric column
    #[arg(long, value_delimiter = ',')]
    value_cols: Vec<String>,
    #[arg(long, value_enum, default_value_t = IdDedupe::None)]
    id_dedupe: IdDedupe,
    /// Emit A..E instead of a..e
    #[arg(long)]
    uppercase: bool,
    #[arg(long, value_enum, default_value_t = SortOrder::Asc)]
    sort_by_date: SortOrder,
    #[arg(long, default_value = "./estat_data.db")]
    sqlite: PathBuf,
    #[arg(long, default_value = "adj-table")]
    table: String,
    #[arg(long, value_enum, default_value_t = WriteMode::Upsert)]
    mode: WriteMode,
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let value_cols = (!args.value_cols.is_empty()).then_some(args.value_cols.as_slice());
    let mut conn = store::open(&args.sqlite)?;

    // ─── 1) load the numeric frame ───────────────────────────────────
    let frame = match (&args.input_csv, &args.source_table) {
        (Some(path), _) => NumericFrame::from_csv_path(path, &args.id_col, value_cols)?,
        (None, Some(table)) => {
            let wide = store::values::load_wide(&conn, table)?
                .ok_or_else(|| anyhow!("table {} not found in {}", table, args.sqlite.display()))?;
            NumericFrame::from_wide(&wide, value_cols)?
        }
        (None, None) => bail!("pass --input-csv or --source-table"),
    };
    info!(rows = frame.rows.len(), columns = frame.columns.len(), "loaded input");

    // ─── 2) classify ─────────────────────────────────────────────────
    let opts = DeviationOptions {
        dedupe: args.id_dedupe,
        uppercase: args.uppercase,
        sort: args.sort_by_date,
    };
    let labels = classify_monthly_deviation(&frame, &opts)?;
    for (from, to) in labels.column_map.iter().filter(|(f, t)| f != t) {
        debug!(from = %from, to = %to, "renamed column");
    }

    // ─── 3) persist ──────────────────────────────────────────────────
    let written = write_label_table(&mut conn, &args.table, &labels, args.mode)?;
    info!(table = %args.table, rows = written, "done");
    Ok(())
}
