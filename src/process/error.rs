// src/process/error.rs

use thiserror::Error;

/// Failures of the flatten → pivot → merge chain.
#[derive(Debug, Error, PartialEq)]
pub enum ReshapeError {
    #[error("time value {raw:?} (column {column}) could not be parsed as a date")]
    UnparseableTime { raw: String, column: String },

    #[error("conflicting values for row {row}, column {column}: {first:?} vs {second:?}")]
    ConflictingValue {
        row: String,
        column: String,
        first: Option<f64>,
        second: Option<f64>,
    },

    #[error("table {table} has no key column {key}")]
    MissingKeyColumn { table: String, key: String },

    #[error("cannot merge tables keyed by {existing} and {new}")]
    KeyColumnMismatch { existing: String, new: String },
}
