// src/process/axes.rs

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::fetch::types::ClassInf;

/// The table-item axis; always the first part of a composite key.
pub const TAB_AXIS: &str = "tab";

/// Category axes in key order. Only the ones a dataset carries are used.
pub const CATEGORY_AXIS_CANDIDATES: [&str; 10] = [
    "cat01", "cat02", "cat03", "cat04", "cat05", "cat06", "cat07", "cat08", "cat09", "cat10",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisCodes {
    /// The axis's own display name (`@name` of the class object).
    pub label: String,
    /// (code, name) in payload order.
    pub entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl AxisCodes {
    pub fn name(&self, code: &str) -> Option<&str> {
        self.index.get(code).map(|&i| self.entries[i].1.as_str())
    }

    /// `@code:name;@code:name` summary string.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|(c, n)| format!("@{}:{}", c, n))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// axis → code → display name, plus the category axes a dataset actually has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisCodeMap {
    axes: BTreeMap<String, AxisCodes>,
    category_axes: Vec<String>,
}

impl AxisCodeMap {
    /// Build from `CLASS_INF`. Axes that are absent are simply not present
    /// in the map.
    pub fn from_class_inf(class_inf: &ClassInf) -> Self {
        let mut axes: BTreeMap<String, AxisCodes> = BTreeMap::new();
        for obj in class_inf.class_obj.as_slice() {
            let axis = axes.entry(obj.id.clone()).or_default();
            if axis.label.is_empty() {
                axis.label = obj.name.clone();
            }
            for class in obj.classes.as_slice() {
                if axis.index.contains_key(&class.code) {
                    trace!(axis = %obj.id, code = %class.code, "duplicate code ignored");
                    continue;
                }
                axis.index.insert(class.code.clone(), axis.entries.len());
                axis.entries.push((class.code.clone(), class.name.clone()));
            }
        }

        let category_axes: Vec<String> = CATEGORY_AXIS_CANDIDATES
            .iter()
            .filter(|a| axes.contains_key(**a))
            .map(|a| a.to_string())
            .collect();
        debug!(axes = axes.len(), categories = ?category_axes, "built axis code map");

        Self {
            axes,
            category_axes,
        }
    }

    pub fn category_axes(&self) -> &[String] {
        &self.category_axes
    }

    pub fn axis(&self, axis: &str) -> Option<&AxisCodes> {
        self.axes.get(axis)
    }

    pub fn name(&self, axis: &str, code: &str) -> Option<&str> {
        self.axes.get(axis)?.name(code)
    }

    pub fn label(&self, axis: &str) -> Option<&str> {
        self.axes.get(axis).map(|a| a.label.as_str())
    }

    /// First code of the `tab` axis, which is what the summary table records.
    pub fn tab_code(&self) -> Option<&str> {
        self.axes
            .get(TAB_AXIS)?
            .entries
            .first()
            .map(|(c, _)| c.as_str())
    }

    /// axis → `@code:name;...` for every category axis.
    pub fn category_summary(&self) -> BTreeMap<String, String> {
        self.category_axes
            .iter()
            .filter_map(|a| Some((a.clone(), self.axes.get(a)?.summary())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use crate::process::fixtures::sample_class_inf;
    use serde_json::json;

    #[test]
    fn category_axes_follow_fixed_order() {
        let map = AxisCodeMap::from_class_inf(&sample_class_inf());
        assert_eq!(map.category_axes(), &["cat01".to_string(), "cat02".to_string()]);
        assert_eq!(map.name("cat01", "01"), Some("北海道"));
        assert_eq!(map.name("cat02", "20"), Some("企業"));
        assert_eq!(map.label("cat02"), Some("分野"));
        assert_eq!(map.tab_code(), Some("100"));
    }

    #[test]
    fn missing_axes_are_absent_not_errors() -> Result<()> {
        let ci: ClassInf = serde_json::from_value(json!({}))?;
        let map = AxisCodeMap::from_class_inf(&ci);
        assert!(map.category_axes().is_empty());
        assert_eq!(map.tab_code(), None);
        assert_eq!(map.name("cat01", "00"), None);
        Ok(())
    }

    #[test]
    fn summary_strings_keep_payload_order() {
        let map = AxisCodeMap::from_class_inf(&sample_class_inf());
        let summary = map.category_summary();
        assert_eq!(summary["cat01"], "@00:全国;@01:北海道");
        assert_eq!(summary["cat02"], "@10:家計;@20:企業");
    }
}
