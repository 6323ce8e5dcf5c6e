// src/process/deviation.rs
//! Month-of-year deviation labels.
//!
//! Each value is compared with the mean of the same column in the same
//! calendar month (across all years) and bucketed by its z-score:
//!
//! | label | z               |
//! |-------|-----------------|
//! | a     | z ≥ 1           |
//! | b     | 0.3 ≤ z < 1     |
//! | c     | -0.3 < z < 0.3  |
//! | d     | -1 < z ≤ -0.3   |
//! | e     | z ≤ -1          |
//!
//! With no usable standard deviation (single observation, or all equal) the
//! sign of the deviation decides: `a`, `c` or `e`.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs::File,
    io::Read,
    path::Path,
};
use tracing::{debug, info, warn};

use super::date_parser::normalize_time;
use super::wide::WideTable;

/// Deviations within this distance of zero count as "no deviation".
pub const ZERO_TOLERANCE: f64 = 1e-12;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum IdDedupe {
    #[default]
    None,
    First,
    Last,
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
    None,
}

#[derive(Debug, Clone, Default)]
pub struct DeviationOptions {
    pub dedupe: IdDedupe,
    pub uppercase: bool,
    pub sort: SortOrder,
}

/// Rows of `id` + numeric value columns, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericFrame {
    pub id_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

/// Wide label output: one row per id, one label column per value column.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    pub id_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<String>>)>,
    /// original column name → sanitised name (id column included)
    pub column_map: BTreeMap<String, String>,
}

impl NumericFrame {
    pub fn from_csv_path(
        path: impl AsRef<Path>,
        id_column: &str,
        value_columns: Option<&[String]>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_csv_reader(file, id_column, value_columns)
            .with_context(|| format!("reading {}", path.display()))
    }

    /// Read a headered CSV. Without `value_columns`, every column other than
    /// the id whose non-empty cells all parse as numbers is used.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        id_column: &str,
        value_columns: Option<&[String]>,
    ) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("reading CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let id_idx = headers
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| anyhow!("id column {:?} not found in CSV header", id_column))?;

        let mut raw: Vec<(String, Vec<String>)> = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.with_context(|| format!("CSV record {}", i + 1))?;
            let id = rec.get(id_idx).unwrap_or_default().trim().to_string();
            let cells = rec.iter().map(|c| c.trim().to_string()).collect();
            raw.push((id, cells));
        }

        let picked: Vec<usize> = match value_columns {
            Some(cols) if !cols.is_empty() => cols
                .iter()
                .map(|c| {
                    headers
                        .iter()
                        .position(|h| h == c)
                        .ok_or_else(|| anyhow!("value column {:?} not found in CSV header", c))
                })
                .collect::<Result<_>>()?,
            _ => (0..headers.len())
                .filter(|&j| j != id_idx)
                .filter(|&j| {
                    raw.iter().all(|(_, cells)| {
                        let c = cells.get(j).map(String::as_str).unwrap_or("");
                        c.is_empty() || c.parse::<f64>().is_ok()
                    })
                })
                .collect(),
        };
        if picked.is_empty() {
            bail!("no numeric value columns found; pass value columns explicitly");
        }

        let mut coerced = 0usize;
        let rows = raw
            .into_iter()
            .map(|(id, cells)| {
                let values = picked
                    .iter()
                    .map(|&j| {
                        let c = cells.get(j).map(String::as_str).unwrap_or("");
                        let v = c.parse::<f64>().ok().filter(|f| f.is_finite());
                        if v.is_none() && !c.is_empty() {
                            coerced += 1;
                        }
                        v
                    })
                    .collect();
                (id, values)
            })
            .collect();
        if coerced > 0 {
            warn!(cells = coerced, "non-numeric cells treated as missing");
        }

        Ok(Self {
            id_column: id_column.to_string(),
            columns: picked.iter().map(|&j| headers[j].clone()).collect(),
            rows,
        })
    }

    /// Take rows straight from a stored wide table.
    pub fn from_wide(table: &WideTable, value_columns: Option<&[String]>) -> Result<Self> {
        let columns: Vec<String> = match value_columns {
            Some(cols) if !cols.is_empty() => {
                for c in cols {
                    if !table.has_column(c) {
                        bail!("value column {:?} not found in table", c);
                    }
                }
                cols.to_vec()
            }
            _ => table.columns().to_vec(),
        };
        if columns.is_empty() {
            bail!("table has no value columns");
        }
        let rows = table
            .row_keys()
            .map(|key| {
                let values = columns.iter().map(|c| table.get(key, c)).collect();
                (key.to_string(), values)
            })
            .collect();
        Ok(Self {
            id_column: table.key_column().to_string(),
            columns,
            rows,
        })
    }
}

/// Label for a z-score.
pub fn label_for_z(z: f64) -> char {
    if z <= -1.0 {
        'e'
    } else if z <= -0.3 {
        'd'
    } else if z < 0.3 {
        'c'
    } else if z < 1.0 {
        'b'
    } else {
        'a'
    }
}

/// Label when the standard deviation is zero or undefined.
pub fn label_for_deviation(dev: f64) -> char {
    if dev.abs() <= ZERO_TOLERANCE {
        'c'
    } else if dev > 0.0 {
        'a'
    } else {
        'e'
    }
}

/// SQLite-friendly column name: runs of non-word characters become `_`.
pub fn sanitize_column_name(name: &str) -> String {
    let s = NON_WORD.replace_all(name.trim(), "_");
    let s = s.trim_matches('_');
    if s.is_empty() {
        "col".to_string()
    } else if s.starts_with(|c: char| c.is_ascii_digit()) {
        format!("c_{}", s)
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
struct MonthStats {
    mean: f64,
    std: Option<f64>,
}

impl MonthStats {
    /// False for n = 1 and for constant groups, whose std is only rounding
    /// noise (0.1 three times gives about 1.7e-17).
    fn has_spread(&self) -> bool {
        match self.std {
            Some(s) => s.is_finite() && s > ZERO_TOLERANCE * self.mean.abs().max(1.0),
            None => false,
        }
    }
}

fn month_stats(values: &[f64]) -> MonthStats {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if values.len() < 2 {
        None
    } else {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt())
    };
    MonthStats { mean, std }
}

fn dedupe_rows(frame: &NumericFrame, how: IdDedupe) -> Vec<(String, Vec<Option<f64>>)> {
    if how == IdDedupe::None {
        return frame.rows.clone();
    }
    let width = frame.columns.len();
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Vec<Option<f64>>>> = HashMap::new();
    for (id, values) in &frame.rows {
        if !groups.contains_key(id) {
            order.push(id.clone());
        }
        groups.entry(id.clone()).or_default().push(values);
    }
    order
        .into_iter()
        .map(|id| {
            let members = &groups[&id];
            let values = (0..width)
                .map(|j| {
                    let mut present = members.iter().filter_map(|r| r[j]);
                    match how {
                        IdDedupe::First => present.next(),
                        IdDedupe::Last | IdDedupe::None => present.last(),
                        IdDedupe::Mean => {
                            let vals: Vec<f64> = present.collect();
                            if vals.is_empty() {
                                None
                            } else {
                                Some(vals.iter().sum::<f64>() / vals.len() as f64)
                            }
                        }
                    }
                })
                .collect();
            (id, values)
        })
        .collect()
}

/// Classify every value of `frame` against its column × calendar-month
/// baseline and return the wide label table.
pub fn classify_monthly_deviation(
    frame: &NumericFrame,
    opts: &DeviationOptions,
) -> Result<LabelTable> {
    if frame.columns.is_empty() {
        bail!("no value columns to classify");
    }
    if let Some((id, values)) = frame
        .rows
        .iter()
        .find(|(_, values)| values.len() != frame.columns.len())
    {
        bail!(
            "row {:?} has {} values for {} columns",
            id,
            values.len(),
            frame.columns.len()
        );
    }
    let rows = dedupe_rows(frame, opts.dedupe);
    let dates: Vec<Option<NaiveDate>> = rows.iter().map(|(id, _)| normalize_time(id)).collect();
    let unparsed = dates.iter().filter(|d| d.is_none()).count();
    if unparsed > 0 {
        warn!(rows = unparsed, "ids that are not dates get no label");
    }

    // column → month → stats
    let mut stats: Vec<HashMap<u32, MonthStats>> = Vec::with_capacity(frame.columns.len());
    for j in 0..frame.columns.len() {
        let mut by_month: HashMap<u32, Vec<f64>> = HashMap::new();
        for ((_, values), date) in rows.iter().zip(&dates) {
            if let (Some(v), Some(d)) = (values[j], date) {
                by_month.entry(d.month()).or_default().push(v);
            }
        }
        stats.push(
            by_month
                .into_iter()
                .map(|(m, vals)| (m, month_stats(&vals)))
                .collect(),
        );
    }

    let labelled: Vec<(String, Vec<Option<String>>)> = rows
        .iter()
        .zip(&dates)
        .map(|((id, values), date)| {
            let labels = values
                .iter()
                .enumerate()
                .map(|(j, v)| {
                    let (v, month) = (v.as_ref()?, date.as_ref()?.month());
                    let st = stats[j].get(&month)?;
                    let dev = v - st.mean;
                    let label = match st.std {
                        Some(s) if st.has_spread() => label_for_z(dev / s),
                        _ => label_for_deviation(dev),
                    };
                    Some(if opts.uppercase {
                        label.to_ascii_uppercase().to_string()
                    } else {
                        label.to_string()
                    })
                })
                .collect();
            (id.clone(), labels)
        })
        .collect();

    // one row per id, last occurrence wins
    let mut by_id: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();
    let mut dupes = 0usize;
    for (id, labels) in labelled {
        if by_id.insert(id, labels).is_some() {
            dupes += 1;
        }
    }
    if dupes > 0 {
        debug!(dupes, "duplicate ids collapsed, keeping the last");
    }
    let mut out: Vec<(String, Vec<Option<String>>)> = by_id.into_iter().collect();

    if opts.sort != SortOrder::None {
        let desc = opts.sort == SortOrder::Desc;
        // stable; ids that are not dates go last either way
        out.sort_by(|a, b| match (normalize_time(&a.0), normalize_time(&b.0)) {
            (Some(x), Some(y)) if desc => y.cmp(&x),
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    let (column_map, id_column, columns) = sanitized_names(&frame.id_column, &frame.columns);
    info!(
        rows = out.len(),
        columns = columns.len(),
        "classified monthly deviation"
    );
    Ok(LabelTable {
        id_column,
        columns,
        rows: out,
        column_map,
    })
}

fn sanitized_names(
    id_column: &str,
    columns: &[String],
) -> (BTreeMap<String, String>, String, Vec<String>) {
    let mut taken: HashSet<String> = HashSet::new();
    let mut map = BTreeMap::new();
    let mut unique = |name: &str| {
        let base = sanitize_column_name(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while !taken.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        candidate
    };
    let id = unique(id_column);
    map.insert(id_column.to_string(), id.clone());
    let cols: Vec<String> = columns
        .iter()
        .map(|c| {
            let s = unique(c);
            map.insert(c.clone(), s.clone());
            s
        })
        .collect();
    (map, id, cols)
}
