// src/export.rs

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{fs::File, path::Path, sync::Arc};
use tracing::{info, instrument};

use crate::process::WideTable;

/// Arrow schema for a wide table: the key as Utf8, every column nullable Float64.
pub fn wide_schema(table: &WideTable) -> Schema {
    let mut fields = vec![Field::new(table.key_column(), DataType::Utf8, false)];
    fields.extend(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c.as_str(), DataType::Float64, true)),
    );
    Schema::new(fields)
}

/// Write `table` as a single Snappy-compressed Parquet file.
#[instrument(level = "info", skip(table, path), fields(path = %path.as_ref().display()))]
pub fn export_parquet(table: &WideTable, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let schema = Arc::new(wide_schema(table));

    let rows: Vec<(&str, Vec<Option<f64>>)> = table.iter_rows().collect();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len() + 1);
    arrays.push(Arc::new(StringArray::from_iter_values(rows.iter().map(|(k, _)| *k))));
    for j in 0..table.columns().len() {
        arrays.push(Arc::new(Float64Array::from_iter(rows.iter().map(|(_, v)| v[j]))));
    }

    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).context("creating Arrow writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;

    info!(rows = rows.len(), columns = table.columns().len(), "exported parquet");
    Ok(rows.len())
}
