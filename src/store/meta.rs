// src/store/meta.rs

use anyhow::Result;
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::debug;

use super::text_table::{load_text_table, replace_text_table, TextRow};
use crate::process::axes::{CATEGORY_AXIS_CANDIDATES, TAB_AXIS};
use crate::process::{decode_key, AxisCodeMap};

pub const META_TABLE: &str = "estat_column_meta";
pub const META_KEY: &str = "column_key";
pub const STATS_ID_FIELD: &str = "stats_data_id";

/// composite key → field → text
pub type ColumnMeta = BTreeMap<String, TextRow>;

/// Describe each composite key: the dataset it came from and, per axis, the
/// code, its display name and the axis label.
pub fn build_column_meta(stats_data_id: &str, columns: &[String], axes: &AxisCodeMap) -> ColumnMeta {
    columns
        .iter()
        .map(|key| {
            let mut fields = TextRow::new();
            fields.insert(STATS_ID_FIELD.to_string(), stats_data_id.to_string());
            for (axis, code) in decode_key(key) {
                if let Some(name) = axes.name(&axis, &code) {
                    fields.insert(format!("{}_name", axis), name.to_string());
                }
                if let Some(label) = axes.label(&axis).filter(|l| !l.is_empty()) {
                    fields.insert(format!("{}_label", axis), label.to_string());
                }
                fields.insert(format!("{}_code", axis), code);
            }
            (key.clone(), fields)
        })
        .collect()
}

/// Existing records win; fresh records only fill fields and keys that are
/// missing.
pub fn merge_column_meta(mut existing: ColumnMeta, fresh: &ColumnMeta) -> ColumnMeta {
    for (key, fields) in fresh {
        let target = existing.entry(key.clone()).or_default();
        for (field, value) in fields {
            target.entry(field.clone()).or_insert_with(|| value.clone());
        }
    }
    existing
}

pub fn load_column_meta(conn: &Connection) -> Result<ColumnMeta> {
    let rows = load_text_table(conn, META_TABLE)?.unwrap_or_default();
    let mut meta = ColumnMeta::new();
    for mut row in rows {
        if let Some(key) = row.remove(META_KEY) {
            meta.insert(key, row);
        }
    }
    debug!(records = meta.len(), "loaded column metadata");
    Ok(meta)
}

pub fn write_column_meta(conn: &Connection, meta: &ColumnMeta) -> Result<()> {
    let mut fields: Vec<String> = Vec::new();
    for row in meta.values() {
        for f in row.keys() {
            if !fields.contains(f) {
                fields.push(f.clone());
            }
        }
    }
    fields.sort_by_key(|f| field_rank(f));

    let rows: Vec<TextRow> = meta
        .iter()
        .map(|(key, row)| {
            let mut r = row.clone();
            r.insert(META_KEY.to_string(), key.clone());
            r
        })
        .collect();
    replace_text_table(conn, META_TABLE, Some(META_KEY), &fields, &rows)
}

/// stats_data_id, then tab, cat01..cat10 and any other axis; within an axis
/// code, name, label.
fn field_rank(field: &str) -> (usize, String, usize) {
    if field == STATS_ID_FIELD {
        return (0, String::new(), 0);
    }
    let (axis, suffix) = field.rsplit_once('_').unwrap_or((field, ""));
    let axis_rank = if axis == TAB_AXIS {
        1
    } else if let Some(i) = CATEGORY_AXIS_CANDIDATES.iter().position(|c| *c == axis) {
        2 + i
    } else {
        2 + CATEGORY_AXIS_CANDIDATES.len()
    };
    let suffix_rank = match suffix {
        "code" => 0,
        "name" => 1,
        "label" => 2,
        _ => 3,
    };
    (axis_rank, axis.to_string(), suffix_rank)
}
