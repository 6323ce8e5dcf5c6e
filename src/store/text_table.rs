// src/store/text_table.rs

use anyhow::{bail, Context, Result};
use rusqlite::{params_from_iter, types::Value as SqlValue, types::ValueRef, Connection};
use std::collections::BTreeMap;
use tracing::debug;

use super::{quote_ident, table_columns, table_exists, MAX_COLUMNS};

pub type TextRow = BTreeMap<String, String>;

/// Union of the keys of `rows`, in first-seen order.
pub fn column_union<'a, I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a TextRow>,
{
    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        for k in row.keys() {
            if !cols.contains(k) {
                cols.push(k.clone());
            }
        }
    }
    cols
}

/// Rewrite `table` as all-TEXT columns. With `key_column`, that column is the
/// primary key and is placed first.
pub fn replace_text_table(
    conn: &Connection,
    table: &str,
    key_column: Option<&str>,
    columns: &[String],
    rows: &[TextRow],
) -> Result<()> {
    let mut ordered: Vec<&str> = Vec::with_capacity(columns.len() + 1);
    if let Some(k) = key_column {
        ordered.push(k);
    }
    ordered.extend(
        columns
            .iter()
            .map(String::as_str)
            .filter(|c| Some(*c) != key_column),
    );
    if ordered.is_empty() {
        bail!("table {} needs at least one column", table);
    }
    if ordered.len() > MAX_COLUMNS {
        bail!("table {} would need {} columns", table, ordered.len());
    }

    let ddl: Vec<String> = ordered
        .iter()
        .map(|c| {
            if Some(*c) == key_column {
                format!("{} TEXT PRIMARY KEY", quote_ident(c))
            } else {
                format!("{} TEXT", quote_ident(c))
            }
        })
        .collect();
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({cols});",
        t = quote_ident(table),
        cols = ddl.join(", ")
    ))
    .with_context(|| format!("recreating table {}", table))?;

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        ordered.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        (1..=ordered.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    for (i, row) in rows.iter().enumerate() {
        let params = ordered
            .iter()
            .map(|c| row.get(*c).map_or(SqlValue::Null, |v| SqlValue::Text(v.clone())));
        stmt.execute(params_from_iter(params))
            .with_context(|| format!("inserting row {} into {}", i, table))?;
    }
    debug!(table, rows = rows.len(), columns = ordered.len(), "wrote text table");
    Ok(())
}

/// Every row of `table` as column → text; NULL cells are left out.
/// `Ok(None)` if the table does not exist.
pub fn load_text_table(conn: &Connection, table: &str) -> Result<Option<Vec<TextRow>>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let columns = table_columns(conn, table)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut rec = TextRow::new();
        for (i, c) in columns.iter().enumerate() {
            let text = match row.get_ref(i)? {
                ValueRef::Null | ValueRef::Blob(_) => continue,
                ValueRef::Integer(n) => n.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
            };
            rec.insert(c.clone(), text);
        }
        out.push(rec);
    }
    Ok(Some(out))
}
