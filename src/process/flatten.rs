// src/process/flatten.rs

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use super::axes::{AxisCodeMap, TAB_AXIS};
use super::date_parser::normalize_time;
use crate::fetch::types::ValueRecord;

/// Separates `<axis>-<code>` parts of a composite column key.
pub const KEY_SEPARATOR: char = ',';
/// Separates an axis name from its code inside one key part.
pub const AXIS_CODE_SEPARATOR: char = '-';

/// One observation in long form.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub time_raw: String,
    pub time: Option<NaiveDate>,
    pub column_key: String,
    pub value: Option<f64>,
}

/// `tab-<code>` then `<axis>-<code>` for every category axis with a non-empty
/// code, in the order given.
pub fn composite_key(record: &ValueRecord, category_axes: &[String]) -> String {
    let mut key = format!(
        "{}{}{}",
        TAB_AXIS,
        AXIS_CODE_SEPARATOR,
        record.code(TAB_AXIS).unwrap_or_default()
    );
    for axis in category_axes {
        if let Some(code) = record.code(axis).filter(|c| !c.is_empty()) {
            key.push(KEY_SEPARATOR);
            key.push_str(axis);
            key.push(AXIS_CODE_SEPARATOR);
            key.push_str(&code);
        }
    }
    key
}

/// Split a composite key back into `(axis, code)` pairs.
pub fn decode_key(key: &str) -> Vec<(String, String)> {
    key.split(KEY_SEPARATOR)
        .filter_map(|part| part.split_once(AXIS_CODE_SEPARATOR))
        .map(|(axis, code)| (axis.to_string(), code.to_string()))
        .collect()
}

/// Numeric value of a `$` field. Suppression markers (`-`, `***`, `x`, ...)
/// and anything else non-numeric become `None`.
pub fn parse_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

pub fn flatten_record(record: &ValueRecord, axes: &AxisCodeMap) -> FlatRecord {
    FlatRecord {
        time: normalize_time(&record.time),
        time_raw: record.time.clone(),
        column_key: composite_key(record, axes.category_axes()),
        value: parse_value(&record.value),
    }
}

pub fn flatten_records(records: &[ValueRecord], axes: &AxisCodeMap) -> Vec<FlatRecord> {
    let flat: Vec<FlatRecord> = records.iter().map(|r| flatten_record(r, axes)).collect();

    let nulls = flat.iter().filter(|f| f.value.is_none()).count();
    let bad_times = flat.iter().filter(|f| f.time.is_none()).count();
    if bad_times > 0 {
        warn!(bad_times, "records with unparseable time values");
    }
    debug!(records = flat.len(), null_values = nulls, "flattened records");
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fixtures::{sample_class_inf, sample_values};
    use serde_json::json;

    fn record(v: Value) -> ValueRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn key_uses_fixed_axis_order_and_skips_empty_codes() {
        let axes = vec!["cat01".to_string(), "cat02".to_string()];
        let r = record(json!({"@cat02": "20", "@tab": "100", "@cat01": "01", "@time": "2020", "$": "1"}));
        assert_eq!(composite_key(&r, &axes), "tab-100,cat01-01,cat02-20");

        let r = record(json!({"@tab": "100", "@cat01": "", "@cat02": "20", "@time": "2020", "$": "1"}));
        assert_eq!(composite_key(&r, &axes), "tab-100,cat02-20");
    }

    #[test]
    fn equal_codes_give_equal_keys() {
        let axes = vec!["cat01".to_string()];
        let a = record(json!({"@tab": "1", "@cat01": "7", "@time": "202001", "$": "1"}));
        let b = record(json!({"@tab": "1", "@cat01": "7", "@time": "202002", "$": "9"}));
        let c = record(json!({"@tab": "1", "@cat01": "8", "@time": "202001", "$": "1"}));
        assert_eq!(composite_key(&a, &axes), composite_key(&b, &axes));
        assert_ne!(composite_key(&a, &axes), composite_key(&c, &axes));
    }

    #[test]
    fn decoded_keys_map_back_to_display_names() {
        let axes = AxisCodeMap::from_class_inf(&sample_class_inf());
        for raw in sample_values() {
            let flat = flatten_record(&raw, &axes);
            for (axis, code) in decode_key(&flat.column_key) {
                let expected = raw.code(&axis).unwrap();
                assert_eq!(code, expected);
                assert!(axes.name(&axis, &code).is_some(), "{} {}", axis, code);
            }
        }
        let names: Vec<_> = decode_key("tab-100,cat01-01,cat02-20")
            .iter()
            .map(|(a, c)| axes.name(a, c).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["DI", "北海道", "企業"]);
    }

    #[test]
    fn non_numeric_values_become_null() {
        assert_eq!(parse_value(&json!("45.2")), Some(45.2));
        assert_eq!(parse_value(&json!("1,234")), Some(1234.0));
        assert_eq!(parse_value(&json!(7)), Some(7.0));
        assert_eq!(parse_value(&json!("-")), None);
        assert_eq!(parse_value(&json!("***")), None);
        assert_eq!(parse_value(&json!("x")), None);
        assert_eq!(parse_value(&json!(null)), None);
    }

    #[test]
    fn unparseable_time_is_kept_as_none() {
        let axes = AxisCodeMap::from_class_inf(&sample_class_inf());
        let r = record(json!({"@tab": "100", "@time": "FY?", "$": "3"}));
        let flat = flatten_record(&r, &axes);
        assert_eq!(flat.time, None);
        assert_eq!(flat.time_raw, "FY?");
        assert_eq!(flat.value, Some(3.0));
    }
}
