// src/process/mod.rs

use tracing::{info, instrument};

pub mod axes;
pub mod date_parser;
pub mod deviation;
pub mod error;
pub mod flatten;
pub mod pivot;
pub mod wide;

pub use axes::AxisCodeMap;
pub use error::ReshapeError;
pub use flatten::{composite_key, decode_key, flatten_records, FlatRecord};
pub use pivot::pivot;
pub use wide::{WideTable, KEY_COLUMN};

use crate::fetch::StatsDataset;

/// A fetched dataset in wide form, with the axis names needed to describe
/// its columns.
#[derive(Debug, Clone)]
pub struct Reshaped {
    pub axes: AxisCodeMap,
    pub table: WideTable,
}

/// Flatten and pivot every value record of `dataset`.
#[instrument(level = "info", skip(dataset), fields(stats_data_id = %dataset.stats_data_id))]
pub fn reshape(dataset: &StatsDataset) -> Result<Reshaped, ReshapeError> {
    let axes = AxisCodeMap::from_class_inf(&dataset.class_inf);
    let flat = flatten_records(&dataset.values, &axes);
    let table = pivot(&flat)?;
    info!(
        rows = table.row_count(),
        columns = table.columns().len(),
        "reshaped dataset"
    );
    Ok(Reshaped { axes, table })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_sample_dataset() -> anyhow::Result<()> {
        let r = reshape(&fixtures::sample_dataset())?;
        assert_eq!(r.table.row_keys().collect::<Vec<_>>(), vec!["2020-01-01", "2020-02-01"]);
        assert_eq!(r.table.columns().len(), 4);
        assert_eq!(r.table.get("2020-01-01", "tab-100,cat01-00,cat02-10"), Some(45.2));
        // "-" keeps its column but stays null
        assert!(r.table.has_column("tab-100,cat01-01,cat02-10"));
        assert_eq!(r.table.get("2020-01-01", "tab-100,cat01-01,cat02-10"), None);
        Ok(())
    }
}
