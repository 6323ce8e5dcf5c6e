// src/fetch/mod.rs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

pub mod pages;
pub mod tables;
pub mod types;

use types::ApiResult;

pub use pages::{collect_pages, fetch_stats_data, FetchOptions, StatsDataset};
pub use tables::{flatten_json, search_tables, TableSearch};

/// Build an API URL from `base` plus query pairs, in the given order.
pub fn build_url<'a, I>(base: &str, params: I) -> Result<Url>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    Url::parse_with_params(base, params).with_context(|| format!("parsing API URL {}", base))
}

/// GET `url` and decode the JSON body. Any non-2xx status is an error.
pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &Url) -> Result<T> {
    debug!(path = url.path(), "GET");
    client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", redact(url)))?
        .error_for_status()
        .with_context(|| format!("non-success status from {}", redact(url)))?
        .json::<T>()
        .await
        .with_context(|| format!("decoding JSON from {}", redact(url)))
}

/// Turn an API-level `RESULT` into an error when STATUS is 100 or more.
/// 1..=99 is a normal end with a notice, such as no matching data.
pub fn check_result(result: &ApiResult, url: &Url) -> Result<()> {
    if result.is_error() {
        bail!(
            "e-Stat API error {} for {}: {}",
            result.status,
            redact(url),
            result.error_msg
        );
    }
    if result.status != 0 {
        warn!(status = result.status, msg = %result.error_msg, "API returned a non-zero status");
    }
    Ok(())
}

/// The URL without its `appId` query value, for logs and error messages.
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "appId" { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}
