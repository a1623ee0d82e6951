use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::DEFAULT_MAX_WORKERS;
use crate::retry::RetryPolicy;
use crate::transport::HttpClient;

/// Where and how files are written (`[download]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Worker threads per downloader.
    pub max_workers: usize,
    /// Directory files are saved under. Defaults to `$XDG_DATA_HOME/bowerbird`.
    pub root_dir: Option<PathBuf>,
    /// Re-download files that already exist.
    pub overwrite: bool,
    /// Also replace characters Windows rejects in filenames.
    pub windows_safe_names: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            root_dir: None,
            overwrite: false,
            windows_safe_names: cfg!(windows),
        }
    }
}

impl DownloadConfig {
    /// Configured root directory, or the XDG data directory.
    pub fn root_dir_or_default(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.root_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("bowerbird")?;
        Ok(xdg_dirs.get_data_home())
    }
}

/// Retry and HTTP client settings (`[network]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Maximum number of attempts per file (including the first).
    pub tries_max: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub retry_wait_min_secs: f64,
    /// Maximum backoff delay in seconds.
    pub retry_wait_max_secs: u64,
    /// Proxy for all outgoing traffic (`http://`, `socks5://`, ...).
    pub global_proxy: Option<String>,
    /// Proxy for file downloads only; takes precedence over `global_proxy`.
    pub downloader_proxy: Option<String>,
    pub user_agent: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tries_max: 5,
            retry_wait_min_secs: 1.0,
            retry_wait_max_secs: 10,
            global_proxy: None,
            downloader_proxy: None,
            user_agent: None,
            connect_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    /// Retry policy with the default backoff. Negative or non-finite waits
    /// fall back to zero.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            tries_max: self.tries_max.max(1),
            wait_min: Duration::try_from_secs_f64(self.retry_wait_min_secs).unwrap_or(Duration::ZERO),
            wait_max: Duration::from_secs(self.retry_wait_max_secs),
            ..RetryPolicy::default()
        }
    }

    pub fn http_client(&self) -> HttpClient {
        HttpClient {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..HttpClient::default()
        }
        .with_proxy([self.downloader_proxy.as_deref(), self.global_proxy.as_deref()])
    }
}

/// Global configuration loaded from `~/.config/bowerbird/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BowerbirdConfig {
    pub download: DownloadConfig,
    pub network: NetworkConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bowerbird")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BowerbirdConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BowerbirdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BowerbirdConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}
