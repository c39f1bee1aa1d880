use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::CredtrackError;

const DEFAULT_CONFIG_FILE: &str = "credtrack.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Lock files of the one-shot jobs.
    pub run_dir: PathBuf,
    /// A job lock older than this is considered abandoned.
    pub lock_stale_secs: u64,
}

impl BasicConfig {
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite:data/credtrack.sqlite".to_string(),
            loglevel: "info".to_string(),
            run_dir: PathBuf::from("storage/run"),
            lock_stale_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the `daily`, `audit` and `security` channel files.
    /// When unset only stdout logging is enabled.
    pub dir: Option<PathBuf>,
    /// Number of files kept per channel.
    pub retain: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("storage/logs")),
            retain: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub keep: usize,
    /// Dump utility; its stdout becomes the backup file.
    pub dump_program: String,
    /// Arguments for the dump utility. `{database}` expands to the SQLite file path.
    pub dump_args: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("storage/backups"),
            keep: 5,
            dump_program: "sqlite3".to_string(),
            dump_args: vec!["{database}".to_string(), ".dump".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub dir: PathBuf,
    pub keep: usize,
    pub expiring_window_days: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("storage/metrics"),
            keep: 30,
            expiring_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub default_days: u32,
    pub webhook_url: Option<Url>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_days: 30,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub basic: BasicConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    /// Defaults, then `credtrack.toml` (or `$CREDTRACK_CONFIG`), then `CREDTRACK_*` env vars.
    pub fn load() -> Result<Self, CredtrackError> {
        let path = std::env::var("CREDTRACK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let cfg = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CREDTRACK_").split("__"))
            .extract()?;
        Ok(cfg)
    }

    /// SQLite file path behind `database_url`, if it points at a file.
    pub fn database_path(&self) -> Option<PathBuf> {
        let url = self.basic.database_url.as_str();
        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path.starts_with(":memory:") {
            return None;
        }
        Some(PathBuf::from(path))
    }
}
