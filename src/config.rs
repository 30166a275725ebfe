use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::MIN_REFRESH_MS;
use crate::report::{DEFAULT_NAME_WIDTH, StatsRequest};
use crate::system::history::DEFAULT_CAPACITY;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub procfs: ProcfsConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub refresh_rate_ms: u64,
    pub history_length: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate_ms: 1000,
            history_length: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProcfsConfig {
    pub root: PathBuf,
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        ProcfsConfig {
            root: PathBuf::from("/proc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub default_nprocs: usize,
    pub default_sort: String,
    pub descending: bool,
    pub name_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            default_nprocs: 20,
            default_sort: "memory".to_string(),
            descending: true,
            name_width: DEFAULT_NAME_WIDTH,
        }
    }
}

impl Config {
    /// Refresh cadence, never faster than [`MIN_REFRESH_MS`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.general.refresh_rate_ms.max(MIN_REFRESH_MS))
    }

    /// A `show_stats` request pre-filled from the `[report]` section.
    pub fn stats_request(&self) -> StatsRequest {
        StatsRequest {
            nprocs: self.report.default_nprocs,
            sort_by: self.report.default_sort.clone(),
            descending: self.report.descending,
            ..Default::default()
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sysdeck").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "invalid config; using defaults");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}
