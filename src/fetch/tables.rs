// src/fetch/tables.rs

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use super::types::GetStatsListResponse;
use super::{build_url, check_result, get_json};
use crate::config::ApiConfig;

/// Parameters for a `getStatsList` query.
#[derive(Debug, Clone, Default)]
pub struct TableSearch {
    pub search_word: Option<String>,
    pub survey_years: Option<String>,
    pub limit: Option<u64>,
    pub extra: BTreeMap<String, String>,
}

/// Query the table catalogue and return each `TABLE_INF` entry flattened to
/// `dotted.key → text`.
#[instrument(level = "info", skip(client, api))]
pub async fn search_tables(
    client: &Client,
    api: &ApiConfig,
    query: &TableSearch,
) -> Result<Vec<BTreeMap<String, String>>> {
    let limit = query.limit.map(|l| l.to_string());
    let mut params: Vec<(&str, &str)> = vec![("appId", api.app_id.as_str())];
    if let Some(w) = &query.search_word {
        params.push(("searchWord", w));
    }
    if let Some(y) = &query.survey_years {
        params.push(("surveyYears", y));
    }
    if let Some(l) = &limit {
        params.push(("limit", l));
    }
    params.extend(query.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let url = build_url(&api.list_url, params)?;
    let resp: GetStatsListResponse = get_json(client, &url).await?;
    check_result(&resp.body.result, &url)?;

    let rows: Vec<_> = resp
        .body
        .datalist_inf
        .unwrap_or_default()
        .table_inf
        .into_vec()
        .iter()
        .map(flatten_json)
        .collect();
    info!(tables = rows.len(), "table search complete");
    Ok(rows)
}

/// Flatten nested objects into one level, joining keys with `.`.
/// Arrays are kept as their JSON text; nulls are dropped.
pub fn flatten_json(value: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten_into(v, key, out);
            }
        }
        Value::Null => {}
        Value::String(s) => {
            out.insert(prefix, s.clone());
        }
        other => {
            out.insert(prefix, other.to_string());
        }
    }
}
