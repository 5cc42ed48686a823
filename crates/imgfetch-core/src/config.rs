use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::headers::DEFAULT_ACCEPT;

/// Default number of transfers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 6;

/// Default per-operation deadline in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: f64 = 15.0;

/// Tie-break among pending operations of the same priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    /// Queue style: earliest submission starts first.
    #[default]
    Fifo,
    /// Stack style: latest submission starts first.
    Lifo,
}

/// Configuration loaded from `~/.config/imgfetch/config.toml`.
///
/// Every field is optional in the file; missing fields take the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Maximum number of transfers running at once (clamped to at least 1).
    pub max_concurrent_downloads: usize,
    /// Per-operation deadline in seconds. Zero or negative means the default.
    pub download_timeout_secs: f64,
    /// "fifo" (default) or "lifo".
    pub execution_order: ExecutionOrder,
    /// Basic-auth user, used together with `password`.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Headers sent with every request. An empty `[headers]` table sends none.
    pub headers: BTreeMap<String, String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), DEFAULT_ACCEPT.to_string());
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            execution_order: ExecutionOrder::Fifo,
            username: None,
            password: None,
            headers,
        }
    }
}

impl FetcherConfig {
    /// Deadline as a Duration; invalid values fall back to the default.
    pub fn download_timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.download_timeout_secs) {
            Ok(d) if !d.is_zero() => d,
            _ => Duration::from_secs_f64(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("imgfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetcherConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Like [`load_or_init`] but for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<FetcherConfig> {
    if !path.exists() {
        let default_cfg = FetcherConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write config {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: FetcherConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
