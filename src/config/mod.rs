//! Configuration management for safegate
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Upstream rejects `start + rows` beyond this window
pub const UPSTREAM_MAX_WINDOW: u32 = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream dataset being mirrored
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Delta sync limits
    #[serde(default)]
    pub sync: SyncConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Scheduled trigger
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Manual trigger and check API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Product safety check
    #[serde(default)]
    pub check: CheckConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Dataset configuration
///
/// One loader serves any Opendatasoft dataset shaped like the Safety Gate
/// export; everything dataset-specific lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Opendatasoft dataset id
    #[serde(default = "default_dataset_id")]
    pub id: String,

    /// Records search endpoint
    #[serde(default = "default_dataset_base_url")]
    pub base_url: String,

    /// Field carrying the alert date (YYYY-MM-DD)
    #[serde(default = "default_alert_date_field")]
    pub alert_date_field: String,

    /// Facets requested alongside records
    #[serde(default)]
    pub facets: Vec<String>,

    /// Environment variable holding the API key (empty = anonymous access)
    #[serde(default = "default_dataset_api_key_env")]
    pub api_key_env: String,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records requested per page
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: u32,

    /// Maximum pages consumed by one run
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Trailing window loaded when no watermark exists
    #[serde(default = "default_bootstrap_days")]
    pub bootstrap_days: u32,

    /// Documents written per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fail the run if pages are not newest-first
    #[serde(default = "default_verify_sort_order")]
    pub verify_sort_order: bool,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Retries for network errors and 5xx/429 responses
    #[serde(default = "default_http_retries")]
    pub retries: u32,
}

/// Scheduled trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,

    /// Cron expression with a leading seconds field
    #[serde(default = "default_schedule_cron")]
    pub cron: String,

    /// IANA timezone the cron expression is evaluated in
    #[serde(default = "default_schedule_timezone")]
    pub timezone: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

/// Safety check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Days of alerts compared against a product
    #[serde(default = "default_check_lookback_days")]
    pub lookback_days: u32,

    /// Maximum candidates sent to the matcher
    #[serde(default = "default_check_candidate_limit")]
    pub candidate_limit: u32,

    /// Similarity (0-100) a match must exceed to become a warning
    #[serde(default = "default_check_min_similarity")]
    pub min_similarity: f64,

    /// Similarity matcher backend URL
    #[serde(default = "default_matcher_url")]
    pub matcher_url: String,

    /// Matcher request timeout in seconds
    #[serde(default = "default_matcher_timeout")]
    pub matcher_timeout_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for safegate data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            sync: SyncConfig::default(),
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
            server: ServerConfig::default(),
            check: CheckConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            id: default_dataset_id(),
            base_url: default_dataset_base_url(),
            alert_date_field: default_alert_date_field(),
            facets: Vec::new(),
            api_key_env: default_dataset_api_key_env(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rows_per_page: default_rows_per_page(),
            max_pages: default_max_pages(),
            bootstrap_days: default_bootstrap_days(),
            batch_size: default_batch_size(),
            verify_sort_order: default_verify_sort_order(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout(),
            retries: default_http_retries(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            cron: default_schedule_cron(),
            timezone: default_schedule_timezone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_check_lookback_days(),
            candidate_limit: default_check_candidate_limit(),
            min_similarity: default_check_min_similarity(),
            matcher_url: default_matcher_url(),
            matcher_timeout_secs: default_matcher_timeout(),
        }
    }
}

impl DatasetConfig {
    /// Get the dataset API key from environment
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Sort expression delivering records newest-first
    pub fn sort_expression(&self) -> String {
        format!("-{},-record_timestamp", self.alert_date_field)
    }
}

impl ScheduleConfig {
    /// Parse the configured timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("Invalid schedule.timezone '{}': {}", self.timezone, e)))
    }
}

impl Config {
    /// Get the default base directory for safegate (~/.safegate)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".safegate")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("safegate.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("safegate.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if safegate is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.dataset.id.trim().is_empty() {
            return Err(Error::Config("dataset.id must not be empty".to_string()));
        }

        Url::parse(&self.dataset.base_url).map_err(|e| {
            Error::Config(format!(
                "dataset.base_url '{}' is not a valid URL: {}",
                self.dataset.base_url, e
            ))
        })?;

        if self.dataset.alert_date_field.trim().is_empty() {
            return Err(Error::Config(
                "dataset.alert_date_field must not be empty".to_string(),
            ));
        }

        if self.sync.rows_per_page == 0 || self.sync.rows_per_page > UPSTREAM_MAX_WINDOW {
            return Err(Error::Config(format!(
                "sync.rows_per_page must be between 1 and {}",
                UPSTREAM_MAX_WINDOW
            )));
        }

        if self.sync.max_pages == 0 {
            return Err(Error::Config("sync.max_pages must be positive".to_string()));
        }

        if u64::from(self.sync.rows_per_page) * u64::from(self.sync.max_pages)
            > u64::from(UPSTREAM_MAX_WINDOW)
        {
            return Err(Error::Config(format!(
                "sync.rows_per_page * sync.max_pages must not exceed {}",
                UPSTREAM_MAX_WINDOW
            )));
        }

        if self.sync.bootstrap_days == 0 {
            return Err(Error::Config(
                "sync.bootstrap_days must be positive".to_string(),
            ));
        }

        if self.sync.batch_size == 0 {
            return Err(Error::Config("sync.batch_size must be positive".to_string()));
        }

        if self.http.timeout_secs == 0 {
            return Err(Error::Config("http.timeout_secs must be positive".to_string()));
        }

        if self.schedule.cron.trim().is_empty() {
            return Err(Error::Config("schedule.cron must not be empty".to_string()));
        }

        self.schedule.tz()?;

        if !(0.0..=100.0).contains(&self.check.min_similarity) {
            return Err(Error::Config(
                "check.min_similarity must be between 0 and 100".to_string(),
            ));
        }

        if self.check.lookback_days == 0 || self.check.candidate_limit == 0 {
            return Err(Error::Config(
                "check.lookback_days and check.candidate_limit must be positive".to_string(),
            ));
        }

        if !self.check.matcher_url.is_empty() {
            Url::parse(&self.check.matcher_url).map_err(|e| {
                Error::Config(format!("check.matcher_url is not a valid URL: {}", e))
            })?;
        }

        Ok(())
    }
}
