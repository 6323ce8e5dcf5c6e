// src/store/summary.rs

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::fetch::StatsDataset;
use crate::process::AxisCodeMap;

pub const SUMMARY_TABLE: &str = "estat_class_info";

/// One row per dataset describing what was fetched and how it is classified.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub stats_data_id: String,
    pub stat_code: Option<String>,
    pub stat_name: String,
    pub title: String,
    pub tab_code: Option<String>,
    /// JSON object: category axis → `@code:name;...`
    pub categories: String,
    pub total_number: u64,
    pub fetched_at: String,
}

impl ClassSummary {
    pub fn from_dataset(dataset: &StatsDataset, axes: &AxisCodeMap) -> Self {
        let inf = &dataset.table_inf;
        // BTreeMap<String, String> always serialises
        let categories =
            serde_json::to_string(&axes.category_summary()).unwrap_or_else(|_| "{}".to_string());
        Self {
            stats_data_id: dataset.stats_data_id.clone(),
            stat_code: inf.stat_name.code().map(str::to_string),
            stat_name: inf.stat_name.text().to_string(),
            title: inf.title.text().to_string(),
            tab_code: axes.tab_code().map(str::to_string),
            categories,
            total_number: dataset.total_number,
            fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            stats_data_id TEXT PRIMARY KEY,
            stat_code     TEXT,
            stat_name     TEXT,
            title         TEXT,
            tab_code      TEXT,
            categories    TEXT,
            total_number  INTEGER,
            fetched_at    TEXT
        );",
        SUMMARY_TABLE
    ))
    .context("creating summary table")
}

/// Insert or replace the row for `summary.stats_data_id`.
pub fn upsert_summary(conn: &Connection, summary: &ClassSummary) -> Result<()> {
    ensure_table(conn)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            SUMMARY_TABLE
        ),
        params![
            summary.stats_data_id,
            summary.stat_code,
            summary.stat_name,
            summary.title,
            summary.tab_code,
            summary.categories,
            summary.total_number as i64,
            summary.fetched_at,
        ],
    )
    .with_context(|| format!("upserting summary for {}", summary.stats_data_id))?;
    debug!(stats_data_id = %summary.stats_data_id, "summary row written");
    Ok(())
}

pub fn load_summary(conn: &Connection, stats_data_id: &str) -> Result<Option<ClassSummary>> {
    ensure_table(conn)?;
    conn.query_row(
        &format!(
            "SELECT stats_data_id, stat_code, stat_name, title, tab_code, categories,
                    total_number, fetched_at
             FROM {} WHERE stats_data_id = ?1",
            SUMMARY_TABLE
        ),
        params![stats_data_id],
        |r| {
            Ok(ClassSummary {
                stats_data_id: r.get(0)?,
                stat_code: r.get(1)?,
                stat_name: r.get(2)?,
                title: r.get(3)?,
                tab_code: r.get(4)?,
                categories: r.get(5)?,
                total_number: r.get::<_, i64>(6)?.max(0) as u64,
                fetched_at: r.get(7)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("reading summary for {}", stats_data_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fixtures::sample_dataset;
    use crate::store::open;
    use tempfile::tempdir;

    #[test]
    fn summary_describes_dataset() {
        let ds = sample_dataset();
        let s = ClassSummary::from_dataset(&ds, &AxisCodeMap::from_class_inf(&ds.class_inf));
        assert_eq!(s.stat_code.as_deref(), Some("00100"));
        assert_eq!(s.stat_name, "景気ウォッチャー調査");
        assert_eq!(s.title, "現状判断DI");
        assert_eq!(s.tab_code.as_deref(), Some("100"));
        let cats: serde_json::Value = serde_json::from_str(&s.categories).unwrap();
        assert_eq!(cats["cat02"], "@10:家計;@20:企業");
    }

    #[test]
    fn upsert_replaces_by_id() -> Result<()> {
        let tmp = tempdir()?;
        let conn = open(tmp.path().join("t.db"))?;
        let ds = sample_dataset();
        let mut s = ClassSummary::from_dataset(&ds, &AxisCodeMap::from_class_inf(&ds.class_inf));
        upsert_summary(&conn, &s)?;
        s.total_number = 99;
        upsert_summary(&conn, &s)?;

        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", SUMMARY_TABLE),
            [],
            |r| r.get(0),
        )?;
        assert_eq!(n, 1);
        assert_eq!(load_summary(&conn, "0003348423")?, Some(s));
        assert_eq!(load_summary(&conn, "missing")?, None);
        Ok(())
    }
}
