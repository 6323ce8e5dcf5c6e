use anyhow::{bail, Result};
use clap::Parser;
use estatsync::{
    config::Config,
    fetch::{search_tables, TableSearch},
    init_tracing, store,
    store::text_table::{column_union, replace_text_table},
};
use reqwest::Client;
use std::{collections::BTreeMap, path::PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(about = "Search the e-Stat table catalogue and store the hits in SQLite")]
struct Args {
    #[arg(short, long, default_value = "estatsync.yaml")]
    config: PathBuf,
    #[arg(long, default_value = "月次")]
    search_word: String,
    /// e.g. `2015` or `201501-201812`
    #[arg(long, default_value = "2015")]
    survey_years: String,
    #[arg(long, default_value_t = 1500)]
    limit: u64,
    /// Extra getStatsList parameters as key=value
    #[arg(long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(short, long, default_value = "estat_table_info")]
    table: String,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {:?}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(db) = args.db {
        cfg.db.path = db;
    }
    cfg.require_app_id()?;

    let query = TableSearch {
        search_word: Some(args.search_word),
        survey_years: Some(args.survey_years),
        limit: Some(args.limit),
        extra: args.params.into_iter().collect::<BTreeMap<_, _>>(),
    };
    let client = Client::builder().gzip(true).build()?;
    let rows = search_tables(&client, &cfg.api, &query).await?;
    if rows.is_empty() {
        bail!("no tables matched {:?}", query.search_word);
    }

    let columns = column_union(&rows);
    let conn = store::open(&cfg.db.path)?;
    replace_text_table(&conn, &args.table, None, &columns, &rows)?;
    info!(
        table = %args.table,
        rows = rows.len(),
        columns = columns.len(),
        "table search stored"
    );
    Ok(())
}
