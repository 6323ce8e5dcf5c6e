// src/store/labels.rs

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use tracing::{info, warn};

use super::{quote_ident, table_columns, table_exists, MAX_COLUMNS};
use crate::process::deviation::LabelTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum WriteMode {
    /// Insert or replace by id; other rows are kept.
    #[default]
    Upsert,
    /// Delete every row first.
    Replace,
}

/// Write `labels` into `table` in a single transaction. Returns rows written.
pub fn write_label_table(
    conn: &mut Connection,
    table: &str,
    labels: &LabelTable,
    mode: WriteMode,
) -> Result<usize> {
    if labels.columns.len() + 1 > MAX_COLUMNS {
        bail!("label table {} would need {} columns", table, labels.columns.len() + 1);
    }
    let tx = conn.transaction()?;

    if table_exists(&tx, table)? {
        let existing = table_columns(&tx, table)?;
        // SQLite column names are case-insensitive
        let has = |name: &str| existing.iter().any(|c| c.eq_ignore_ascii_case(name));
        if !has(&labels.id_column) {
            bail!("table {} has no {} column", table, labels.id_column);
        }
        for col in labels.columns.iter().filter(|c| !has(c.as_str())) {
            tx.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} TEXT", quote_ident(table), quote_ident(col)),
                [],
            )
            .with_context(|| format!("adding column {} to {}", col, table))?;
            warn!(table, column = %col, "added label column");
        }
    } else {
        let mut ddl = vec![format!("{} TEXT PRIMARY KEY", quote_ident(&labels.id_column))];
        ddl.extend(labels.columns.iter().map(|c| format!("{} TEXT", quote_ident(c))));
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote_ident(table),
            ddl.join(", ")
        ))
        .with_context(|| format!("creating {}", table))?;
    }

    if mode == WriteMode::Replace {
        tx.execute(&format!("DELETE FROM {}", quote_ident(table)), [])?;
    }

    let names: Vec<String> = std::iter::once(&labels.id_column)
        .chain(&labels.columns)
        .map(|c| quote_ident(c))
        .collect();
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        (1..=names.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
    );
    let mut written = 0usize;
    {
        let mut stmt = tx.prepare(&sql)?;
        for (id, row) in &labels.rows {
            let params = std::iter::once(SqlValue::Text(id.clone())).chain(
                row.iter()
                    .map(|l| l.clone().map_or(SqlValue::Null, SqlValue::Text)),
            );
            written += stmt
                .execute(params_from_iter(params))
                .with_context(|| format!("writing labels for {}", id))?;
        }
    }
    tx.commit().context("committing labels")?;
    info!(table, rows = written, mode = ?mode, "labels written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn labels(columns: &[&str], rows: &[(&str, Vec<Option<&str>>)]) -> LabelTable {
        LabelTable {
            id_column: "id".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(id, ls)| {
                    (id.to_string(), ls.iter().map(|l| l.map(str::to_string)).collect())
                })
                .collect(),
            column_map: BTreeMap::new(),
        }
    }

    fn count(conn: &Connection, table: &str) -> Result<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |r| {
            r.get(0)
        })?)
    }

    #[test]
    fn upsert_replaces_rows_and_adds_columns() -> Result<()> {
        let tmp = tempdir()?;
        let mut conn = open(tmp.path().join("t.db"))?;
        let first = labels(&["a"], &[("2020-01-01", vec![Some("c")]), ("2020-02-01", vec![None])]);
        write_label_table(&mut conn, "adj-table", &first, WriteMode::Upsert)?;

        let second = labels(&["a", "b"], &[("2020-02-01", vec![Some("e"), Some("a")])]);
        write_label_table(&mut conn, "adj-table", &second, WriteMode::Upsert)?;

        assert_eq!(table_columns(&conn, "adj-table")?, vec!["id", "a", "b"]);
        assert_eq!(count(&conn, "adj-table")?, 2);
        let a: String = conn.query_row(
            "SELECT a FROM \"adj-table\" WHERE id = '2020-02-01'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(a, "e");
        Ok(())
    }

    #[test]
    fn replace_mode_drops_old_rows() -> Result<()> {
        let tmp = tempdir()?;
        let mut conn = open(tmp.path().join("t.db"))?;
        let first = labels(&["a"], &[("2020-01-01", vec![Some("c")]), ("2020-02-01", vec![Some("d")])]);
        write_label_table(&mut conn, "adj-table", &first, WriteMode::Upsert)?;
        let second = labels(&["a"], &[("2021-01-01", vec![Some("b")])]);
        assert_eq!(write_label_table(&mut conn, "adj-table", &second, WriteMode::Replace)?, 1);
        assert_eq!(count(&conn, "adj-table")?, 1);
        Ok(())
    }

    #[test]
    fn column_case_change_reuses_existing_column() -> Result<()> {
        let tmp = tempdir()?;
        let mut conn = open(tmp.path().join("t.db"))?;
        let first = labels(&["DI"], &[("2020-01-01", vec![Some("c")])]);
        write_label_table(&mut conn, "adj-table", &first, WriteMode::Upsert)?;

        let second = labels(&["di"], &[("2020-02-01", vec![Some("a")])]);
        write_label_table(&mut conn, "adj-table", &second, WriteMode::Upsert)?;

        assert_eq!(table_columns(&conn, "adj-table")?, vec!["id", "DI"]);
        assert_eq!(count(&conn, "adj-table")?, 2);
        let v: String = conn.query_row(
            "SELECT DI FROM \"adj-table\" WHERE id = '2020-02-01'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(v, "a");
        Ok(())
    }
}
