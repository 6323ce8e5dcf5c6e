// src/process/wide.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use super::error::ReshapeError;

/// Name of the row-key column in every persisted wide table.
pub const KEY_COLUMN: &str = "id";

/// One row per time key, one column per composite key. An absent cell is null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    key_column: String,
    columns: Vec<String>,
    column_set: HashSet<String>,
    rows: BTreeMap<String, HashMap<String, f64>>,
}

impl WideTable {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            ..Self::default()
        }
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_set.contains(column)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn has_row(&self, row: &str) -> bool {
        self.rows.contains_key(row)
    }

    /// Register a column without giving it any values.
    pub fn add_column(&mut self, column: &str) {
        if self.column_set.insert(column.to_string()) {
            self.columns.push(column.to_string());
        }
    }

    /// Register a row without giving it any values.
    pub fn add_row(&mut self, row: &str) {
        self.rows.entry(row.to_string()).or_default();
    }

    /// Set a cell. `None` registers the row and column but leaves the cell
    /// null, and never clears an existing value.
    pub fn set(&mut self, row: &str, column: &str, value: Option<f64>) {
        self.add_column(column);
        let cells = self.rows.entry(row.to_string()).or_default();
        if let Some(v) = value {
            cells.insert(column.to_string(), v);
        }
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        self.rows.get(row)?.get(column).copied()
    }

    /// Rows in key order, each with one cell per column in column order.
    pub fn iter_rows(&self) -> impl Iterator<Item = (&str, Vec<Option<f64>>)> + '_ {
        self.rows.iter().map(move |(key, cells)| {
            let values = self.columns.iter().map(|c| cells.get(c).copied()).collect();
            (key.as_str(), values)
        })
    }

    pub fn non_null_cells(&self) -> usize {
        self.rows.values().map(HashMap::len).sum()
    }

    /// Merge `new` over `existing`:
    /// - column set is the union (existing order, then new columns);
    /// - non-null cells of `new` overwrite, null cells never do;
    /// - rows only in `new` are added, rows only in `existing` survive.
    pub fn merge(existing: Option<WideTable>, new: &WideTable) -> Result<WideTable, ReshapeError> {
        let mut merged = match existing {
            None => return Ok(new.clone()),
            Some(t) => t,
        };
        if merged.key_column != new.key_column {
            return Err(ReshapeError::KeyColumnMismatch {
                existing: merged.key_column,
                new: new.key_column.clone(),
            });
        }

        let before_cols = merged.columns.len();
        let before_rows = merged.rows.len();
        for column in &new.columns {
            merged.add_column(column);
        }
        for (row, cells) in &new.rows {
            let target = merged.rows.entry(row.clone()).or_default();
            for (column, value) in cells {
                target.insert(column.clone(), *value);
            }
        }
        debug!(
            added_columns = merged.columns.len() - before_cols,
            added_rows = merged.rows.len() - before_rows,
            "merged wide tables"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(cells: &[(&str, &str, Option<f64>)]) -> WideTable {
        let mut t = WideTable::new(KEY_COLUMN);
        for (row, col, v) in cells {
            t.set(row, col, *v);
        }
        t
    }

    #[test]
    fn no_existing_table_takes_batch_verbatim() {
        let new = table(&[("2020-01-01", "A", Some(1.0))]);
        assert_eq!(WideTable::merge(None, &new).unwrap(), new);
    }

    #[test]
    fn disjoint_columns_on_same_row_combine() {
        let existing = table(&[("2020-01-01", "A", Some(1.0))]);
        let new = table(&[("2020-01-01", "B", Some(2.0))]);
        let merged = WideTable::merge(Some(existing), &new).unwrap();
        assert_eq!(merged.columns(), &["A".to_string(), "B".to_string()]);
        assert_eq!(merged.get("2020-01-01", "A"), Some(1.0));
        assert_eq!(merged.get("2020-01-01", "B"), Some(2.0));
    }

    #[test]
    fn null_never_overwrites_value() {
        let existing = table(&[("2020-01-01", "A", Some(1.0))]);
        let new = table(&[("2020-01-01", "A", None)]);
        let merged = WideTable::merge(Some(existing), &new).unwrap();
        assert_eq!(merged.get("2020-01-01", "A"), Some(1.0));
    }

    #[test]
    fn new_values_overwrite_and_new_rows_append() {
        let existing = table(&[
            ("2020-01-01", "A", Some(1.0)),
            ("2020-02-01", "A", Some(5.0)),
        ]);
        let new = table(&[
            ("2020-02-01", "A", Some(6.0)),
            ("2020-03-01", "A", Some(7.0)),
        ]);
        let merged = WideTable::merge(Some(existing), &new).unwrap();
        let keys: Vec<_> = merged.row_keys().collect();
        assert_eq!(keys, vec!["2020-01-01", "2020-02-01", "2020-03-01"]);
        assert_eq!(merged.get("2020-01-01", "A"), Some(1.0));
        assert_eq!(merged.get("2020-02-01", "A"), Some(6.0));
        assert_eq!(merged.get("2020-03-01", "A"), Some(7.0));
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let existing = table(&[("2020-01-01", "A", Some(1.0)), ("2020-01-01", "C", Some(3.0))]);
        let new = table(&[
            ("2020-01-01", "A", Some(9.0)),
            ("2020-02-01", "B", None),
            ("2020-02-01", "A", Some(2.0)),
        ]);
        let once = WideTable::merge(Some(existing), &new).unwrap();
        let twice = WideTable::merge(Some(once.clone()), &new).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn columns_only_grow_across_merges() {
        let batches = [
            table(&[("2020-01-01", "A", Some(1.0))]),
            table(&[("2020-01-01", "B", None)]),
            table(&[("2020-02-01", "C", Some(3.0)), ("2020-02-01", "A", Some(4.0))]),
        ];
        let mut acc: Option<WideTable> = None;
        let mut expected: Vec<String> = Vec::new();
        for b in &batches {
            let merged = WideTable::merge(acc.take(), b).unwrap();
            for c in b.columns() {
                if !expected.contains(c) {
                    expected.push(c.clone());
                }
            }
            assert_eq!(merged.columns(), expected.as_slice());
            acc = Some(merged);
        }
    }

    #[test]
    fn mismatched_key_columns_are_rejected() {
        let existing = WideTable::new("date");
        let new = table(&[("2020-01-01", "A", Some(1.0))]);
        assert!(matches!(
            WideTable::merge(Some(existing), &new),
            Err(ReshapeError::KeyColumnMismatch { .. })
        ));
    }
}
