// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

/// Environment variable that overrides `api.app_id`.
pub const APP_ID_ENV: &str = "ESTAT_APP_ID";

pub const DEFAULT_DATA_URL: &str = "https://api.e-stat.go.jp/rest/3.0/app/json/getStatsData";
pub const DEFAULT_LIST_URL: &str = "https://api.e-stat.go.jp/rest/3.0/app/json/getStatsList";
pub const DEFAULT_VALUES_TABLE: &str = "estat_values";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub db: DbConfig,
    pub fetch: FetchConfig,
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub app_id: String,
    pub data_url: String,
    pub list_url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub page_size: u64,
    pub max_records: Option<u64>,
    pub delay_ms: u64,
}

/// One `statsDataId` to pull and where its wide table lives.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatasetConfig {
    pub stats_data_id: String,
    #[serde(default = "default_values_table")]
    pub table: String,
    /// Forwarded verbatim as query parameters (e.g. `cdCat01`, `cdTimeFrom`).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_values_table() -> String {
    DEFAULT_VALUES_TABLE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            db: DbConfig::default(),
            fetch: FetchConfig::default(),
            datasets: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            data_url: DEFAULT_DATA_URL.to_string(),
            list_url: DEFAULT_LIST_URL.to_string(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("estat_data.db"),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 2000,
            max_records: None,
            delay_ms: 1000,
        }
    }
}

impl FetchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl DatasetConfig {
    pub fn new(stats_data_id: impl Into<String>) -> Self {
        Self {
            stats_data_id: stats_data_id.into(),
            table: default_values_table(),
            params: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Read `path` if it exists (defaults otherwise), then apply `ESTAT_APP_ID`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path, std::env::var(APP_ID_ENV).ok())
    }

    /// `load` with the `ESTAT_APP_ID` value passed in. A blank value leaves
    /// the file's app id alone.
    pub fn load_with_env(path: impl AsRef<Path>, app_id_env: Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        if let Some(app_id) = app_id_env.as_deref().map(str::trim) {
            if !app_id.is_empty() {
                cfg.api.app_id = app_id.to_string();
            }
        }
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // an empty file deserialises to unit, not a map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Fails when no application id is available for API calls.
    pub fn require_app_id(&self) -> Result<&str> {
        if self.api.app_id.trim().is_empty() {
            bail!(
                "no e-Stat application id: set api.app_id in the config or {}",
                APP_ID_ENV
            );
        }
        Ok(&self.api.app_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.page_size == 0 {
            bail!("fetch.page_size must be positive");
        }
        if self.fetch.max_records == Some(0) {
            bail!("fetch.max_records must be positive when set");
        }
        for ds in &self.datasets {
            if ds.stats_data_id.trim().is_empty() {
                bail!("dataset with empty stats_data_id");
            }
            if ds.table.trim().is_empty() {
                bail!("dataset {} has an empty table name", ds.stats_data_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_fill_missing_sections() -> Result<()> {
        let cfg = Config::from_yaml("db:\n  path: other.db\n")?;
        assert_eq!(cfg.db.path, PathBuf::from("other.db"));
        assert_eq!(cfg.api.data_url, DEFAULT_DATA_URL);
        assert_eq!(cfg.fetch.page_size, 2000);
        assert_eq!(cfg.fetch.delay(), Duration::from_secs(1));
        assert!(cfg.datasets.is_empty());
        Ok(())
    }

    #[test]
    fn datasets_and_params_parse() -> Result<()> {
        let yaml = r#"
api:
  app_id: abc
fetch:
  page_size: 500
  max_records: 1200
  delay_ms: 0
datasets:
  - stats_data_id: "0003348423"
  - stats_data_id: "0003423953"
    table: machinery_orders
    params:
      cdCat01: "100"
"#;
        let cfg = Config::from_yaml(yaml)?;
        cfg.validate()?;
        assert_eq!(cfg.require_app_id()?, "abc");
        assert_eq!(cfg.fetch.max_records, Some(1200));
        assert_eq!(cfg.datasets.len(), 2);
        assert_eq!(cfg.datasets[0].table, DEFAULT_VALUES_TABLE);
        assert_eq!(cfg.datasets[1].table, "machinery_orders");
        assert_eq!(cfg.datasets[1].params.get("cdCat01").map(String::as_str), Some("100"));
        Ok(())
    }

    #[test]
    fn empty_file_and_missing_app_id() -> Result<()> {
        let cfg = Config::from_yaml("")?;
        assert_eq!(cfg, Config::default());
        assert!(cfg.require_app_id().is_err());
        Ok(())
    }

    #[test]
    fn zero_page_size_is_rejected() -> Result<()> {
        let cfg = Config::from_yaml("fetch:\n  page_size: 0\n")?;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn load_reads_file_from_disk() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "db:\n  path: from_file.db")?;
        let cfg = Config::load(tmp.path())?;
        assert_eq!(cfg.db.path, PathBuf::from("from_file.db"));
        Ok(())
    }

    #[test]
    fn env_app_id_overrides_file() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "api:\n  app_id: file")?;

        let cfg = Config::load_with_env(tmp.path(), Some(" from-env ".into()))?;
        assert_eq!(cfg.require_app_id()?, "from-env");

        let cfg = Config::load_with_env(tmp.path(), Some("   ".into()))?;
        assert_eq!(cfg.require_app_id()?, "file");

        let cfg = Config::load_with_env(tmp.path(), None)?;
        assert_eq!(cfg.require_app_id()?, "file");

        let missing = tmp.path().with_extension("absent.yaml");
        let cfg = Config::load_with_env(&missing, Some("only-env".into()))?;
        assert_eq!(cfg.require_app_id()?, "only-env");
        Ok(())
    }
}
