// src/fetch/types.rs

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// e-Stat emits a bare object where a list has a single element.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => vec![t],
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => std::slice::from_ref(t),
        }
    }
}

/// Text that may arrive plain or as `{"@code": .., "$": ..}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TextNode {
    Plain(String),
    Tagged {
        #[serde(rename = "@code", default, deserialize_with = "lenient_opt_string")]
        code: Option<String>,
        #[serde(rename = "$", default, deserialize_with = "lenient_string")]
        text: String,
    },
}

impl Default for TextNode {
    fn default() -> Self {
        TextNode::Plain(String::new())
    }
}

impl TextNode {
    pub fn text(&self) -> &str {
        match self {
            TextNode::Plain(s) => s,
            TextNode::Tagged { text, .. } => text,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            TextNode::Plain(_) => None,
            TextNode::Tagged { code, .. } => code.as_deref(),
        }
    }
}

// ─── envelopes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetStatsDataResponse {
    #[serde(rename = "GET_STATS_DATA")]
    pub body: GetStatsData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GetStatsData {
    pub result: ApiResult,
    #[serde(default)]
    pub statistical_data: Option<StatisticalData>,
}

#[derive(Debug, Deserialize)]
pub struct GetStatsListResponse {
    #[serde(rename = "GET_STATS_LIST")]
    pub body: GetStatsList,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GetStatsList {
    pub result: ApiResult,
    #[serde(default)]
    pub datalist_inf: Option<DatalistInf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DatalistInf {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub number: u64,
    #[serde(default)]
    pub table_inf: OneOrMany<Value>,
}

/// `RESULT` block. STATUS 0 is success, 1..=99 are "normal end" variants
/// (e.g. no matching data), 100 and above are errors.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ApiResult {
    #[serde(deserialize_with = "lenient_i64")]
    pub status: i64,
    #[serde(default)]
    pub error_msg: String,
}

impl ApiResult {
    pub fn is_error(&self) -> bool {
        self.status >= 100
    }
}

// ─── STATISTICAL_DATA ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StatisticalData {
    #[serde(default)]
    pub result_inf: ResultInf,
    #[serde(default)]
    pub table_inf: TableInf,
    #[serde(default)]
    pub class_inf: ClassInf,
    #[serde(default)]
    pub data_inf: DataInf,
}

/// Pagination counters.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ResultInf {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_number: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub from_number: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub to_number: u64,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub next_key: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TableInf {
    #[serde(rename = "@id", default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub stat_name: TextNode,
    #[serde(default)]
    pub gov_org: TextNode,
    #[serde(default)]
    pub statistics_name: TextNode,
    #[serde(default)]
    pub title: TextNode,
    #[serde(default, deserialize_with = "lenient_string")]
    pub survey_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_date: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClassInf {
    #[serde(rename = "CLASS_OBJ", default)]
    pub class_obj: OneOrMany<ClassObj>,
}

/// One classification axis (`tab`, `cat01`, `area`, `time`, ...).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClassObj {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "CLASS", default)]
    pub classes: OneOrMany<ClassEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClassEntry {
    #[serde(rename = "@code", deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@level", default, deserialize_with = "lenient_opt_string")]
    pub level: Option<String>,
    #[serde(rename = "@unit", default)]
    pub unit: Option<String>,
    #[serde(rename = "@parentCode", default, deserialize_with = "lenient_opt_string")]
    pub parent_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataInf {
    #[serde(rename = "VALUE", default)]
    pub values: OneOrMany<ValueRecord>,
}

/// One raw observation. Axis codes stay in `attributes` under their `@` names.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ValueRecord {
    #[serde(rename = "@time", default, deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(rename = "$", default)]
    pub value: Value,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl ValueRecord {
    /// Code of `axis` (`"tab"`, `"cat01"`, ...) as a string, if present.
    pub fn code(&self, axis: &str) -> Option<String> {
        match self.attributes.get(&format!("@{}", axis))? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ─── lenient scalars ───────────────────────────────────────────────
// The API is inconsistent about quoting numbers; accept either shape.

fn value_to_string(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?))
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("bad integer {:?}: {}", s, e))),
        other => Err(D::Error::custom(format!("expected integer, got {}", other))),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(lenient_opt_u64(d)?.unwrap_or_default())
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("expected integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("bad integer {:?}: {}", s, e))),
        other => Err(D::Error::custom(format!("expected integer, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn single_objects_are_lists_of_one() -> Result<()> {
        let class_inf: ClassInf = serde_json::from_value(json!({
            "CLASS_OBJ": {
                "@id": "tab",
                "@name": "表章項目",
                "CLASS": {"@code": "100", "@name": "DI", "@level": "", "@unit": ""}
            }
        }))?;
        let objs = class_inf.class_obj.into_vec();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].id, "tab");
        assert_eq!(objs[0].classes.as_slice()[0].code, "100");
        Ok(())
    }

    #[test]
    fn value_record_keeps_axis_codes() -> Result<()> {
        let rec: ValueRecord = serde_json::from_value(json!({
            "@tab": "100", "@cat01": 110, "@time": "2020000101", "@unit": "", "$": "45.2"
        }))?;
        assert_eq!(rec.time, "2020000101");
        assert_eq!(rec.code("tab").as_deref(), Some("100"));
        assert_eq!(rec.code("cat01").as_deref(), Some("110"));
        assert_eq!(rec.code("cat02"), None);
        assert_eq!(rec.value, json!("45.2"));
        Ok(())
    }

    #[test]
    fn counters_accept_strings_and_numbers() -> Result<()> {
        let inf: ResultInf = serde_json::from_value(json!({
            "TOTAL_NUMBER": "4500", "FROM_NUMBER": 1, "TO_NUMBER": 2000, "NEXT_KEY": "2001"
        }))?;
        assert_eq!(
            inf,
            ResultInf {
                total_number: 4500,
                from_number: 1,
                to_number: 2000,
                next_key: Some(2001)
            }
        );
        Ok(())
    }

    #[test]
    fn table_inf_text_nodes() -> Result<()> {
        let t: TableInf = serde_json::from_value(json!({
            "@id": "0003348423",
            "STAT_NAME": {"@code": "00100", "$": "景気ウォッチャー調査"},
            "TITLE": "現状判断DI",
            "SURVEY_DATE": 0
        }))?;
        assert_eq!(t.stat_name.code(), Some("00100"));
        assert_eq!(t.stat_name.text(), "景気ウォッチャー調査");
        assert_eq!(t.title.text(), "現状判断DI");
        assert_eq!(t.survey_date, "0");
        Ok(())
    }
}
