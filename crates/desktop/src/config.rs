//! Desktop configuration: defaults plus `STOCKROOM_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use stockroom_inventory::DEFAULT_LARGE_CHANGE_THRESHOLD;
use stockroom_observability::LogFormat;

use crate::scan::ScanConfig;

pub const ENV_DATABASE_URL: &str = "STOCKROOM_DATABASE_URL";
pub const ENV_LARGE_CHANGE_THRESHOLD: &str = "STOCKROOM_LARGE_CHANGE_THRESHOLD";
pub const ENV_SCAN_COOLDOWN_MS: &str = "STOCKROOM_SCAN_COOLDOWN_MS";
pub const ENV_SCAN_POLL_MS: &str = "STOCKROOM_SCAN_POLL_MS";
pub const ENV_SCANNER_DEVICE: &str = "STOCKROOM_SCANNER_DEVICE";
pub const ENV_LOG_FORMAT: &str = "STOCKROOM_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to create data directory {path:?}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesktopConfig {
    pub database_url: String,
    /// Magnitude at or above which Add/Remove asks for confirmation.
    pub large_change_threshold: f64,
    /// Pause after a successful scan before the scan session ends.
    pub scan_cooldown: Duration,
    /// Wait between frame reads when nothing was detected.
    pub scan_poll_interval: Duration,
    /// Line-oriented scanner device; scanning is disabled when unset.
    pub scanner_device: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            large_change_threshold: DEFAULT_LARGE_CHANGE_THRESHOLD,
            scan_cooldown: Duration::from_millis(5_000),
            scan_poll_interval: Duration::from_millis(50),
            scanner_device: None,
            log_format: LogFormat::Json,
        }
    }
}

impl DesktopConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            config.database_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_LARGE_CHANGE_THRESHOLD) {
            config.large_change_threshold = parse_threshold(&raw)?;
        }
        if let Some(raw) = lookup(ENV_SCAN_COOLDOWN_MS) {
            config.scan_cooldown = parse_millis(ENV_SCAN_COOLDOWN_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SCAN_POLL_MS) {
            config.scan_poll_interval = parse_millis(ENV_SCAN_POLL_MS, &raw)?;
        }
        if let Some(device) = lookup(ENV_SCANNER_DEVICE).filter(|v| !v.trim().is_empty()) {
            config.scanner_device = Some(PathBuf::from(device.trim()));
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            config.log_format = raw.parse().map_err(|e| ConfigError::Invalid {
                var: ENV_LOG_FORMAT,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }

        Ok(config)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_large_change_threshold(mut self, threshold: f64) -> Self {
        self.large_change_threshold = threshold;
        self
    }

    pub fn with_scan_cooldown(mut self, cooldown: Duration) -> Self {
        self.scan_cooldown = cooldown;
        self
    }

    pub fn with_scan_poll_interval(mut self, interval: Duration) -> Self {
        self.scan_poll_interval = interval;
        self
    }

    pub fn with_scanner_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.scanner_device = Some(device.into());
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            poll_interval: self.scan_poll_interval,
            cooldown: self.scan_cooldown,
        }
    }

    /// Path of the database file, when the URL names one.
    pub fn database_path(&self) -> Option<PathBuf> {
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(PathBuf::from(path))
    }

    /// Create the directory holding the database file if it is missing.
    pub fn prepare_storage(&self) -> Result<(), ConfigError> {
        let Some(parent) = self.database_path().and_then(|p| p.parent().map(Path::to_path_buf))
        else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&parent).map_err(|source| ConfigError::DataDir {
            path: parent,
            source,
        })
    }
}

/// `sqlite://{data_dir}/stockroom/stockroom.db`, falling back to
/// `~/.local/share` and finally to the working directory.
fn default_database_url() -> String {
    let base = dirs::data_dir().or_else(|| {
        dirs::home_dir().map(|mut h| {
            h.push(".local");
            h.push("share");
            h
        })
    });

    match base {
        Some(mut dir) => {
            dir.push("stockroom");
            dir.push("stockroom.db");
            format!("sqlite://{}", dir.to_string_lossy())
        }
        None => "sqlite://stockroom.db".to_string(),
    }
}

fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var: ENV_LARGE_CHANGE_THRESHOLD,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid("must be a finite number >= 0"));
    }
    Ok(value)
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = DesktopConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.large_change_threshold, 100.0);
        assert_eq!(config.scan_cooldown, Duration::from_secs(5));
        assert_eq!(config.scan_poll_interval, Duration::from_millis(50));
        assert_eq!(config.scanner_device, None);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.database_url.starts_with("sqlite://"));
        assert!(config.database_url.ends_with("stockroom.db"));
    }

    #[test]
    fn environment_overrides() {
        let config = DesktopConfig::from_lookup(lookup(&[
            (ENV_DATABASE_URL, "sqlite:///tmp/shop.db"),
            (ENV_LARGE_CHANGE_THRESHOLD, "250"),
            (ENV_SCAN_COOLDOWN_MS, "10"),
            (ENV_SCAN_POLL_MS, "5"),
            (ENV_SCANNER_DEVICE, "/dev/ttyACM0"),
            (ENV_LOG_FORMAT, "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite:///tmp/shop.db");
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/shop.db")));
        assert_eq!(config.large_change_threshold, 250.0);
        assert_eq!(config.scan_config().cooldown, Duration::from_millis(10));
        assert_eq!(config.scan_config().poll_interval, Duration::from_millis(5));
        assert_eq!(config.scanner_device, Some(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = DesktopConfig::from_lookup(lookup(&[(ENV_LARGE_CHANGE_THRESHOLD, "-1")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: ENV_LARGE_CHANGE_THRESHOLD,
                ..
            }
        ));

        assert!(DesktopConfig::from_lookup(lookup(&[(ENV_SCAN_POLL_MS, "fast")])).is_err());
        assert!(DesktopConfig::from_lookup(lookup(&[(ENV_LOG_FORMAT, "xml")])).is_err());
    }

    #[test]
    fn in_memory_url_has_no_path() {
        let config = DesktopConfig::default().with_database_url("sqlite::memory:");
        assert_eq!(config.database_path(), None);
        config.prepare_storage().unwrap();
    }

    #[test]
    fn prepare_storage_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("nested").join("stock.db");
        let config =
            DesktopConfig::default().with_database_url(format!("sqlite://{}", db.display()));

        config.prepare_storage().unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
