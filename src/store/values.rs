// src/store/values.rs

use anyhow::{bail, Context, Result};
use rusqlite::{params_from_iter, types::Value as SqlValue, types::ValueRef, Connection};
use tracing::{debug, warn};

use super::{quote_ident, table_columns, table_exists, MAX_COLUMNS};
use crate::process::date_parser::{normalize_time, row_key};
use crate::process::{ReshapeError, WideTable, KEY_COLUMN};

fn key_from_sql(v: ValueRef<'_>) -> Option<String> {
    match v {
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

fn number_from_sql(v: ValueRef<'_>) -> Option<f64> {
    match v {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(t) => std::str::from_utf8(t).ok()?.trim().parse().ok(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

/// Load a stored wide table. `Ok(None)` if the table does not exist; an
/// error if it exists without an `id` column.
///
/// Row keys are re-normalised so tables written by older tools with
/// `YYYY-MM-DD HH:MM:SS` keys line up with fresh batches.
pub fn load_wide(conn: &Connection, table: &str) -> Result<Option<WideTable>> {
    if !table_exists(conn, table)? {
        debug!(table, "no stored table yet");
        return Ok(None);
    }
    let columns = table_columns(conn, table)?;
    let key_idx = columns
        .iter()
        .position(|c| c == KEY_COLUMN)
        .ok_or_else(|| ReshapeError::MissingKeyColumn {
            table: table.to_string(),
            key: KEY_COLUMN.to_string(),
        })?;

    let mut wide = WideTable::new(KEY_COLUMN);
    for (i, c) in columns.iter().enumerate() {
        if i != key_idx {
            wide.add_column(c);
        }
    }

    let sql = format!("SELECT * FROM {}", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut skipped = 0usize;
    while let Some(row) = rows.next()? {
        let raw = match key_from_sql(row.get_ref(key_idx)?) {
            Some(k) => k,
            None => {
                skipped += 1;
                continue;
            }
        };
        let key = normalize_time(&raw).map(row_key).unwrap_or(raw);
        wide.add_row(&key);
        for (i, c) in columns.iter().enumerate() {
            if i == key_idx {
                continue;
            }
            if let Some(v) = number_from_sql(row.get_ref(i)?) {
                wide.set(&key, c, Some(v));
            }
        }
    }
    if skipped > 0 {
        warn!(table, rows = skipped, "stored rows without a key were dropped");
    }
    debug!(
        table,
        rows = wide.row_count(),
        columns = wide.columns().len(),
        "loaded wide table"
    );
    Ok(Some(wide))
}

/// Rewrite `table` from scratch with the contents of `wide`.
pub fn write_wide(conn: &Connection, table: &str, wide: &WideTable) -> Result<()> {
    if wide.columns().len() + 1 > MAX_COLUMNS {
        bail!(
            "table {} would need {} columns; SQLite allows {}",
            table,
            wide.columns().len() + 1,
            MAX_COLUMNS
        );
    }

    let mut ddl = vec![format!("{} TEXT PRIMARY KEY", quote_ident(wide.key_column()))];
    ddl.extend(wide.columns().iter().map(|c| format!("{} REAL", quote_ident(c))));
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({cols});",
        t = quote_ident(table),
        cols = ddl.join(", ")
    ))
    .with_context(|| format!("recreating table {}", table))?;

    let placeholders: Vec<String> = (1..=wide.columns().len() + 1)
        .map(|i| format!("?{}", i))
        .collect();
    let sql = format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(table),
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    for (key, cells) in wide.iter_rows() {
        let mut params = Vec::with_capacity(cells.len() + 1);
        params.push(SqlValue::Text(key.to_string()));
        params.extend(cells.into_iter().map(|c| c.map_or(SqlValue::Null, SqlValue::Real)));
        stmt.execute(params_from_iter(params))
            .with_context(|| format!("inserting row {} into {}", key, table))?;
    }
    debug!(table, rows = wide.row_count(), "wrote wide table");
    Ok(())
}

/// Delete every row of `table`, keeping its columns. Returns the rows removed.
pub fn clear_values(conn: &Connection, table: &str) -> Result<usize> {
    if !table_exists(conn, table)? {
        warn!(table, "nothing to clear; table does not exist");
        return Ok(0);
    }
    let n = conn
        .execute(&format!("DELETE FROM {}", quote_ident(table)), [])
        .with_context(|| format!("clearing {}", table))?;
    Ok(n)
}
