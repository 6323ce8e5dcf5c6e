// src/fetch/pages.rs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::types::{ClassInf, GetStatsDataResponse, StatisticalData, TableInf, ValueRecord};
use super::{build_url, check_result, get_json};
use crate::config::{ApiConfig, DatasetConfig, FetchConfig};

/// Query keys owned by the pagination loop; extra params may not override them.
const RESERVED_PARAMS: &[&str] = &["appId", "statsDataId", "startPosition", "limit"];

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub page_size: u64,
    pub max_records: Option<u64>,
    /// Courtesy pause between consecutive requests.
    pub delay: Duration,
}

impl From<&FetchConfig> for FetchOptions {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            page_size: cfg.page_size,
            max_records: cfg.max_records,
            delay: cfg.delay(),
        }
    }
}

/// Everything one dataset fetch produced: metadata from the first page and
/// every value record across all pages.
#[derive(Debug, Clone)]
pub struct StatsDataset {
    pub stats_data_id: String,
    pub table_inf: TableInf,
    pub class_inf: ClassInf,
    pub total_number: u64,
    pub values: Vec<ValueRecord>,
}

/// Drive the offset loop. `fetch_page(start, limit)` returns one page;
/// `start` is 1-based as the API expects.
pub async fn collect_pages<F, Fut>(
    stats_data_id: &str,
    opts: &FetchOptions,
    mut fetch_page: F,
) -> Result<StatsDataset>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<StatisticalData>>,
{
    if opts.page_size == 0 {
        bail!("page size must be positive");
    }

    let mut start = 1u64;
    let mut page_no = 0u32;
    let mut total = 0u64;
    let mut head: Option<(TableInf, ClassInf)> = None;
    let mut values: Vec<ValueRecord> = Vec::new();

    loop {
        let limit = match opts.max_records {
            Some(cap) => opts.page_size.min(cap.saturating_sub(values.len() as u64)),
            None => opts.page_size,
        };
        page_no += 1;

        let StatisticalData {
            result_inf,
            table_inf,
            class_inf,
            data_inf,
        } = fetch_page(start, limit)
            .await
            .with_context(|| format!("page {} of dataset {}", page_no, stats_data_id))?;

        let mut records = data_inf.values.into_vec();
        if records.is_empty() {
            if values.is_empty() {
                bail!("dataset {} returned no values", stats_data_id);
            }
            warn!(
                stats_data_id,
                page = page_no,
                got = values.len(),
                total,
                "empty page before the reported total; stopping"
            );
            break;
        }
        if head.is_none() {
            head = Some((table_inf, class_inf));
        }
        total = result_inf.total_number;

        // the cap is a hard ceiling even if the server ignores `limit`
        if records.len() as u64 > limit {
            records.truncate(limit as usize);
        }
        let got = records.len() as u64;
        values.extend(records);
        start += got;

        debug!(
            stats_data_id,
            page = page_no,
            got,
            to = result_inf.to_number,
            total,
            "page received"
        );

        if result_inf.to_number >= total || result_inf.next_key.is_none() {
            break;
        }
        if let Some(cap) = opts.max_records {
            if values.len() as u64 >= cap {
                info!(stats_data_id, cap, total, "record cap reached");
                break;
            }
        }
        if !opts.delay.is_zero() {
            sleep(opts.delay).await;
        }
    }

    let (table_inf, class_inf) = head.unwrap_or_default();
    info!(
        stats_data_id,
        pages = page_no,
        records = values.len(),
        total,
        "fetch complete"
    );
    Ok(StatsDataset {
        stats_data_id: stats_data_id.to_string(),
        table_inf,
        class_inf,
        total_number: total,
        values,
    })
}

/// Fetch every page of `dataset` from `getStatsData`.
#[instrument(level = "info", skip(client, api, dataset, opts), fields(stats_data_id = %dataset.stats_data_id))]
pub async fn fetch_stats_data(
    client: &Client,
    api: &ApiConfig,
    dataset: &DatasetConfig,
    opts: &FetchOptions,
) -> Result<StatsDataset> {
    for key in dataset.params.keys() {
        if RESERVED_PARAMS.contains(&key.as_str()) {
            warn!(param = %key, "ignoring extra parameter managed by the fetcher");
        }
    }

    collect_pages(&dataset.stats_data_id, opts, |start, limit| {
        let url = page_url(api, dataset, start, limit);
        async move { get_stats_page(client, &url?).await }
    })
    .await
}

fn page_url(api: &ApiConfig, dataset: &DatasetConfig, start: u64, limit: u64) -> Result<Url> {
    let start = start.to_string();
    let limit = limit.to_string();
    let mut params: Vec<(&str, &str)> = vec![
        ("appId", api.app_id.as_str()),
        ("statsDataId", dataset.stats_data_id.as_str()),
    ];
    params.extend(
        dataset
            .params
            .iter()
            .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    params.push(("startPosition", start.as_str()));
    params.push(("limit", limit.as_str()));
    build_url(&api.data_url, params)
}

async fn get_stats_page(client: &Client, url: &Url) -> Result<StatisticalData> {
    let resp: GetStatsDataResponse = get_json(client, url).await?;
    check_result(&resp.body.result, url)?;
    Ok(resp.body.statistical_data.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn page(from: u64, to: u64, total: u64, last: bool) -> StatisticalData {
        let values: Vec<_> = (from..=to)
            .map(|i| json!({"@tab": "01", "@time": "2020000101", "$": i.to_string()}))
            .collect();
        let next = if last { json!(null) } else { json!(to + 1) };
        serde_json::from_value(json!({
            "RESULT_INF": {"TOTAL_NUMBER": total, "FROM_NUMBER": from, "TO_NUMBER": to, "NEXT_KEY": next},
            "TABLE_INF": {"@id": "0000000001", "TITLE": "t"},
            "CLASS_INF": {"CLASS_OBJ": {"@id": "tab", "@name": "tab", "CLASS": {"@code": "01", "@name": "x"}}},
            "DATA_INF": {"VALUE": values}
        }))
        .unwrap()
    }

    fn opts(page_size: u64, max_records: Option<u64>) -> FetchOptions {
        FetchOptions {
            page_size,
            max_records,
            delay: Duration::ZERO,
        }
    }

    /// Serves canned pages in order and records each (start, limit) request.
    fn scripted(
        pages: Vec<Result<StatisticalData>>,
    ) -> (
        impl FnMut(u64, u64) -> std::future::Ready<Result<StatisticalData>>,
        Arc<Mutex<Vec<(u64, u64)>>>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let mut queue: VecDeque<_> = pages.into();
        let f = move |start, limit| {
            seen.lock().unwrap().push((start, limit));
            std::future::ready(
                queue
                    .pop_front()
                    .unwrap_or_else(|| Err(anyhow::anyhow!("unexpected extra request"))),
            )
        };
        (f, calls)
    }

    #[tokio::test]
    async fn advances_offset_until_total() -> Result<()> {
        crate::init_test_logging();
        let (f, calls) = scripted(vec![
            Ok(page(1, 3, 7, false)),
            Ok(page(4, 6, 7, false)),
            Ok(page(7, 7, 7, true)),
        ]);
        let ds = collect_pages("0000000001", &opts(3, None), f).await?;
        assert_eq!(ds.values.len(), 7);
        assert_eq!(ds.total_number, 7);
        assert_eq!(ds.table_inf.id, "0000000001");
        assert_eq!(*calls.lock().unwrap(), vec![(1, 3), (4, 3), (7, 3)]);
        Ok(())
    }

    #[tokio::test]
    async fn cap_limits_requests_and_records() -> Result<()> {
        let (f, calls) = scripted(vec![Ok(page(1, 3, 10, false)), Ok(page(4, 5, 10, false))]);
        let ds = collect_pages("0000000001", &opts(3, Some(5)), f).await?;
        assert_eq!(ds.values.len(), 5);
        // second request shrinks its limit to what the cap leaves
        assert_eq!(*calls.lock().unwrap(), vec![(1, 3), (4, 2)]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_first_page_is_fatal() {
        let empty: StatisticalData = serde_json::from_value(json!({
            "RESULT_INF": {"TOTAL_NUMBER": 0},
            "DATA_INF": {}
        }))
        .unwrap();
        let (f, _) = scripted(vec![Ok(empty)]);
        let err = collect_pages("0000000001", &opts(10, None), f)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no values"));
    }

    #[tokio::test]
    async fn request_failure_aborts_whole_fetch() {
        let (f, calls) = scripted(vec![
            Ok(page(1, 2, 6, false)),
            Err(anyhow::anyhow!("HTTP 503")),
        ]);
        let err = collect_pages("0000000001", &opts(2, None), f)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("HTTP 503"));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn page_url_forwards_extra_params() -> Result<()> {
        let api = ApiConfig {
            app_id: "key".into(),
            ..ApiConfig::default()
        };
        let mut ds = DatasetConfig::new("0003348423");
        ds.params.insert("cdCat01".into(), "100".into());
        ds.params.insert("limit".into(), "5".into());
        let url = page_url(&api, &ds, 2001, 2000)?;
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("cdCat01".into(), "100".into())));
        assert!(pairs.contains(&("startPosition".into(), "2001".into())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "limit").count(), 1);
        assert!(pairs.contains(&("limit".into(), "2000".into())));
        Ok(())
    }
}
