// src/store/mod.rs

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info, instrument};

pub mod labels;
pub mod meta;
pub mod summary;
pub mod text_table;
pub mod values;

use crate::fetch::StatsDataset;
use crate::process::{Reshaped, WideTable};

/// SQLite's default compile-time column limit.
pub const MAX_COLUMNS: usize = 2000;

pub fn open(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open(path)
        .with_context(|| format!("opening SQLite database {}", path.display()))?;
    debug!(path = %path.display(), "opened database");
    Ok(conn)
}

/// Double-quote an identifier. Table and column names here come from data
/// (composite keys, CSV headers), never from trusted literals.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |r| r.get(0),
        )
        .with_context(|| format!("checking for table {}", table))?;
    Ok(n > 0)
}

/// Column names of `table` in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let cols = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("reading columns of {}", table))?;
    Ok(cols)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReport {
    pub rows: usize,
    pub columns: usize,
    pub added_rows: usize,
    pub added_columns: usize,
    pub meta_records: usize,
}

/// Merge one reshaped dataset into the store: wide values, column metadata
/// and the classification summary, all in one transaction.
#[instrument(level = "info", skip(conn, dataset, reshaped), fields(stats_data_id = %dataset.stats_data_id))]
pub fn persist_dataset(
    conn: &mut Connection,
    table: &str,
    dataset: &StatsDataset,
    reshaped: &Reshaped,
) -> Result<PersistReport> {
    let tx = conn.transaction()?;

    let existing = values::load_wide(&tx, table)?;
    let (before_rows, before_cols) = existing
        .as_ref()
        .map(|t| (t.row_count(), t.columns().len()))
        .unwrap_or((0, 0));
    let merged = WideTable::merge(existing, &reshaped.table)?;
    values::write_wide(&tx, table, &merged)?;

    let fresh_meta =
        meta::build_column_meta(&dataset.stats_data_id, reshaped.table.columns(), &reshaped.axes);
    let merged_meta = meta::merge_column_meta(meta::load_column_meta(&tx)?, &fresh_meta);
    meta::write_column_meta(&tx, &merged_meta)?;

    summary::upsert_summary(
        &tx,
        &summary::ClassSummary::from_dataset(dataset, &reshaped.axes),
    )?;

    tx.commit().context("committing dataset")?;

    let report = PersistReport {
        rows: merged.row_count(),
        columns: merged.columns().len(),
        added_rows: merged.row_count() - before_rows,
        added_columns: merged.columns().len() - before_cols,
        meta_records: merged_meta.len(),
    };
    info!(
        table,
        rows = report.rows,
        columns = report.columns,
        added_rows = report.added_rows,
        added_columns = report.added_columns,
        "persisted dataset"
    );
    Ok(report)
}
