// src/process/pivot.rs

use std::cmp::Ordering;
use tracing::debug;

use super::date_parser::row_key;
use super::error::ReshapeError;
use super::flatten::FlatRecord;
use super::wide::{WideTable, KEY_COLUMN};

/// Long `(time, column_key, value)` records → wide table.
///
/// Records are visited in (time, key) order. A repeated (time, key) pair is
/// accepted only when it repeats the same value; any disagreement is an
/// error. A record whose time did not parse is an error.
pub fn pivot(records: &[FlatRecord]) -> Result<WideTable, ReshapeError> {
    let mut ordered: Vec<(String, &FlatRecord)> = Vec::with_capacity(records.len());
    for rec in records {
        let date = rec.time.ok_or_else(|| ReshapeError::UnparseableTime {
            raw: rec.time_raw.clone(),
            column: rec.column_key.clone(),
        })?;
        ordered.push((row_key(date), rec));
    }
    ordered.sort_by(|a, b| match a.0.cmp(&b.0) {
        Ordering::Equal => a.1.column_key.cmp(&b.1.column_key),
        other => other,
    });

    let mut wide = WideTable::new(KEY_COLUMN);
    let mut last: Option<(&str, &str, Option<f64>)> = None;
    for (row, rec) in &ordered {
        if let Some((prev_row, prev_col, prev_val)) = last {
            if prev_row == row.as_str() && prev_col == rec.column_key {
                if prev_val != rec.value {
                    return Err(ReshapeError::ConflictingValue {
                        row: row.clone(),
                        column: rec.column_key.clone(),
                        first: prev_val,
                        second: rec.value,
                    });
                }
                continue;
            }
        }
        wide.set(row, &rec.column_key, rec.value);
        last = Some((row.as_str(), rec.column_key.as_str(), rec.value));
    }

    debug!(
        rows = wide.row_count(),
        columns = wide.columns().len(),
        cells = wide.non_null_cells(),
        "pivoted"
    );
    Ok(wide)
}
