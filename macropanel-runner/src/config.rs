//! Pipeline configuration: TOML file, environment overrides, credentials.
//!
//! Every section is optional; a missing file or section falls back to the
//! built-in defaults (standard catalog, parquet under `./data`).
//!
//! ```toml
//! data_root = "/srv/macro/data"
//! format = "csv"
//! history_start = "2010-01-01"
//!
//! [windows]
//! zscore = 252
//!
//! [http.retry]
//! max_attempts = 5
//!
//! [source_http.bls]
//! max_concurrency = 1
//!
//! [[sources]]
//! source = "fred"
//! adapter = "fred"
//! series = [{ name = "DGS10", upstream_id = "DGS10", required = true }]
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use macropanel_core::data::{
    Catalog, CatalogError, HttpSettings, SourceCatalog, StorageFormat, DEFAULT_BATCH_SIZE,
};
use macropanel_core::indicators::{InputColumns, WindowConfig};

pub const DATA_ROOT_ENV: &str = "MACROPANEL_DATA_ROOT";
pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";
pub const BLS_API_KEY_ENV: &str = "BLS_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Store root holding the raw, curated and indicator tiers.
    pub data_root: PathBuf,
    pub format: StorageFormat,
    /// Earliest date requested from providers; `None` asks for full history.
    pub history_start: Option<NaiveDate>,
    /// Series per `fetch_many` call.
    pub batch_size: usize,
    /// Root for file-drop sources. Defaults to `<data_root>/drops`.
    pub drop_dir: Option<PathBuf>,
    /// HTTP settings shared by every web adapter.
    pub http: HttpSettings,
    /// Per-source replacements for `http`, keyed by source tag.
    pub source_http: BTreeMap<String, HttpSettings>,
    pub windows: WindowConfig,
    pub inputs: InputColumns,
    /// Collected sources, in assembly order.
    pub sources: Vec<SourceCatalog>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            format: StorageFormat::default(),
            history_start: NaiveDate::from_ymd_opt(2000, 1, 1),
            batch_size: DEFAULT_BATCH_SIZE,
            drop_dir: None,
            http: HttpSettings::default(),
            source_http: BTreeMap::new(),
            windows: WindowConfig::default(),
            inputs: InputColumns::default(),
            sources: Catalog::standard().sources,
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, then apply environment overrides
    /// (`.env` included) and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Environment overrides, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(DATA_ROOT_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(data_root = %root, "data root overridden from environment");
            self.data_root = PathBuf::from(root);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        let w = &self.windows;
        if w.zscore < 2 {
            return Err(ConfigError::invalid("windows.zscore", "must be at least 2"));
        }
        if w.spread_vol < 2 || w.equity_vol < 2 {
            return Err(ConfigError::invalid("windows", "volatility windows must be at least 2"));
        }
        if w.equity_ma == 0 {
            return Err(ConfigError::invalid("windows.equity_ma", "must be at least 1"));
        }
        if !(w.annualization.is_finite() && w.annualization > 0.0) {
            return Err(ConfigError::invalid("windows.annualization", "must be positive"));
        }
        for (tag, settings) in std::iter::once(("http", &self.http))
            .chain(self.source_http.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if settings.max_concurrency == 0 {
                return Err(ConfigError::invalid(
                    "max_concurrency",
                    format!("[{tag}] must be at least 1"),
                ));
            }
            if settings.retry.max_attempts == 0 {
                return Err(ConfigError::invalid(
                    "retry.max_attempts",
                    format!("[{tag}] must be at least 1"),
                ));
            }
        }
        self.catalog().validate()?;
        Ok(())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            sources: self.sources.clone(),
        }
    }

    /// HTTP settings for one source.
    pub fn http_for(&self, source: &str) -> &HttpSettings {
        self.source_http.get(source).unwrap_or(&self.http)
    }

    pub fn resolved_drop_dir(&self) -> PathBuf {
        self.drop_dir
            .clone()
            .unwrap_or_else(|| self.data_root.join("drops"))
    }
}

/// API keys. `Debug` never prints the secrets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub fred_api_key: Option<String>,
    pub bls_api_key: Option<String>,
}

impl Credentials {
    /// Read keys from the process environment (after `.env` is loaded).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            fred_api_key: read(FRED_API_KEY_ENV),
            bls_api_key: read(BLS_API_KEY_ENV),
        }
    }

    /// Credential by environment variable name.
    pub fn get(&self, var: &str) -> Option<&str> {
        match var {
            FRED_API_KEY_ENV => self.fred_api_key.as_deref(),
            BLS_API_KEY_ENV => self.bls_api_key.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("fred_api_key", &redact(&self.fred_api_key))
            .field("bls_api_key", &redact(&self.bls_api_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macropanel_core::data::AdapterKind;

    #[test]
    fn empty_toml_is_default() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        config.validate().unwrap();
        assert!(config.catalog().source("fred").is_some());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            format = "csv"
            history_start = "2015-06-01"

            [windows]
            zscore = 60

            [http.retry]
            max_attempts = 5

            [source_http.bls]
            max_concurrency = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.format, StorageFormat::Csv);
        assert_eq!(config.history_start, NaiveDate::from_ymd_opt(2015, 6, 1));
        assert_eq!(config.windows.zscore, 60);
        assert_eq!(config.windows.equity_ma, 200);
        assert_eq!(config.http.retry.max_attempts, 5);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http_for("bls").max_concurrency, 1);
        assert_eq!(config.http_for("fred"), &config.http);
    }

    #[test]
    fn custom_sources_replace_standard_catalog() {
        let config = PipelineConfig::from_toml(
            r#"
            [[sources]]
            source = "ofr"
            adapter = "file_drop"
            series = [
                { name = "OFR_FSI", upstream_id = "fsi.csv:OFR FSI", required = true },
                { name = "OFR_CREDIT", upstream_id = "fsi.csv:Credit", enabled = false },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(config.sources.len(), 1);
        let ofr = &config.sources[0];
        assert_eq!(ofr.adapter, AdapterKind::FileDrop);
        assert!(ofr.series[0].required);
        assert!(ofr.series[0].enabled);
        assert!(!ofr.series[1].enabled);
    }

    #[test]
    fn env_overrides_data_root() {
        let mut config = PipelineConfig::default();
        config.apply_env(|key| (key == DATA_ROOT_ENV).then(|| "/tmp/macro".to_string()));
        assert_eq!(config.data_root, PathBuf::from("/tmp/macro"));
        assert_eq!(config.resolved_drop_dir(), PathBuf::from("/tmp/macro/drops"));

        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config.data_root, PathBuf::from("/tmp/macro"));
    }

    #[test]
    fn invalid_values_rejected() {
        let config = PipelineConfig::from_toml("batch_size = 0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "batch_size", .. })
        ));

        let config = PipelineConfig::from_toml("[windows]\nzscore = 1").unwrap();
        assert!(config.validate().is_err());

        assert!(matches!(
            PipelineConfig::from_toml("format = \"xlsx\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn duplicate_source_rejected() {
        let mut config = PipelineConfig::default();
        let fred = config.sources[0].clone();
        config.sources.push(fred);
        assert!(matches!(config.validate(), Err(ConfigError::Catalog(_))));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::from_lookup(|key| match key {
            FRED_API_KEY_ENV => Some("abc123secret".into()),
            BLS_API_KEY_ENV => Some("   ".into()),
            _ => None,
        });
        assert_eq!(creds.get(FRED_API_KEY_ENV), Some("abc123secret"));
        assert_eq!(creds.bls_api_key, None);
        let printed = format!("{creds:?}");
        assert!(!printed.contains("abc123secret"));
        assert!(printed.contains("<redacted>"));
    }
}
