//! Settings for the sync engine
//!
//! Built-in defaults are overlaid by `config.toml` (see
//! [`Config::config_file_path`]) and then by `FITSYNC_*` variables, so a
//! variable always beats the file. Every table in the file is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "FITSYNC";

/// Which durable storage backend holds the snapshot and the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per key in the data directory
    #[default]
    File,
    /// Key/value table in `fitsync.db`
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => anyhow::bail!("storage must be `file` or `sqlite`, got `{}`", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for durable storage (snapshot, queue, SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the coaching API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Application identifier; keys the persisted snapshot
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Durable storage backend
    #[serde(default)]
    pub storage: StorageBackend,

    /// Optional log file for long-running commands
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

/// Reachability monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Path of the health endpoint, relative to `api_url`
    pub health_path: String,
    /// Periodic evaluation interval; evaluations closer than half of it are throttled
    pub poll_interval_secs: u64,
    /// Upper bound on a single probe
    pub probe_timeout_secs: u64,
    /// Downlink below this (Mbps) counts as a slow connection
    pub slow_downlink_mbps: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_path: "/api/health".to_string(),
            poll_interval_secs: 30,
            probe_timeout_secs: 5,
            slow_downlink_mbps: 0.5,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Minimum gap between two evaluations that actually probe
    pub fn min_evaluation_gap(&self) -> Duration {
        self.poll_interval() / 2
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Exponential backoff settings shared by the monitor and the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Maximum number of doublings
    pub max_exponent: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_exponent: 5,
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// `base * 2^min(exponent, max_exponent)`, doubled again on a slow link
    pub fn delay_for(&self, exponent: u32, slow: bool) -> Duration {
        let factor = 2u32.saturating_pow(exponent.min(self.max_exponent));
        let delay = self.base_delay().saturating_mul(factor);
        if slow {
            delay.saturating_mul(2)
        } else {
            delay
        }
    }
}

/// Mutation queue settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Handler invocations allowed for an entry before it is marked failed
    pub retry_ceiling: u32,
    /// Timeout applied to each replayed request
    pub request_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 5,
            request_timeout_secs: 30,
        }
    }
}

impl QueueConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            app_id: default_app_id(),
            storage: StorageBackend::default(),
            log_file: None,
            monitor: MonitorConfig::default(),
            backoff: BackoffConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl Config {
    /// Read `config.toml` from its usual place, then apply the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// `--config <path>` when given, otherwise [`Config::load`]
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Read settings from `path`; a missing file means all defaults.
    ///
    /// Also creates `data_dir` so storage can open right away.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("{} is not valid settings TOML", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };

        config.apply_env_overrides()?;
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;
        Ok(config)
    }

    /// Parse settings from TOML text; the data directory is left alone
    pub fn load_from_str(text: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(text).context("settings TOML is invalid")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(dir) = env_value("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        // an empty URL would make every probe fail, ignore it
        if let Some(url) = env_value("API_URL").filter(|url| !url.is_empty()) {
            self.api_url = url;
        }
        if let Some(backend) = env_value("STORAGE") {
            self.storage = backend
                .parse()
                .with_context(|| format!("{}_STORAGE", ENV_PREFIX))?;
        }
        if let Some(secs) = env_value("POLL_INTERVAL_SECS") {
            self.monitor.poll_interval_secs = secs
                .parse()
                .with_context(|| format!("{}_POLL_INTERVAL_SECS must be whole seconds", ENV_PREFIX))?;
        }
        Ok(())
    }

    /// Write settings to the usual `config.toml`
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("cannot encode settings")?;
        std::fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))
    }

    /// `$FITSYNC_CONFIG`, or `<config dir>/fitsync/config.toml`
    pub fn config_file_path() -> PathBuf {
        env_value("CONFIG").map(PathBuf::from).unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fitsync/config.toml")
        })
    }

    /// Full URL of the health endpoint probed by the monitor
    pub fn health_url(&self) -> String {
        join_url(&self.api_url, &self.monitor.health_path)
    }

    /// Storage key of the persisted state snapshot
    pub fn snapshot_key(&self) -> String {
        self.app_id.clone()
    }

    /// Storage key of the persisted mutation queue
    pub fn queue_key(&self) -> String {
        format!("{}-sync-queue", self.app_id)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("fitsync.db")
    }
}

/// Join a base URL and a path without doubling or dropping the slash
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn env_value(suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fitsync")
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_app_id() -> String {
    "fitfusion".to_string()
}
