//! Configuration file handling.
//!
//! The config is a JSON document, by default at
//! `<data dir>/photo-indexer/config.json`. Every field is optional; a missing
//! file is written out with defaults on first start.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "PHOTO_INDEXER_CONFIG";

const APP_DIR: &str = "photo-indexer";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not access config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Directory trees to scan and watch
    pub photo_roots: Vec<PathBuf>,
    /// Run a full scan right after startup
    pub initial_scan: bool,
    pub watch: WatchConfig,
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: app_data_dir().join("photo_indexer.db"),
            photo_roots: Vec::new(),
            initial_scan: false,
            watch: WatchConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

/// Live change monitor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Quiet period before a changed path is reconciled
    pub debounce_ms: u64,
    /// Longest a continuously changing path may be held back
    pub max_wait_ms: u64,
    /// Notifications buffered between the watcher and the debouncer
    pub queue_capacity: usize,
    /// Distinct paths the debouncer may hold at once
    pub max_pending: usize,
    /// Reconciliations running at once
    pub max_concurrent: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            enabled: true,
            debounce_ms: 250,
            max_wait_ms: 2000,
            queue_capacity: 1024,
            max_pending: 4096,
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Walked entries between job progress writes
    pub progress_interval: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            progress_interval: 100,
        }
    }
}

impl Config {
    /// Load the config from `$PHOTO_INDEXER_CONFIG` or the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);
        Self::load_from(&path)
    }

    /// Load the config at `path`, creating it with defaults if it doesn't exist.
    /// Relative photo roots are resolved against the working directory.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut config = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let config = Config::default();
                config.save(path)?;
                info!(path = %path.display(), "Wrote default config");
                config
            }
            Err(err) => return Err(io_err(err)),
        };

        let cwd = env::current_dir().map_err(io_err)?;
        config.resolve_roots(&cwd);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)
    }

    fn resolve_roots(&mut self, base: &Path) {
        for root in &mut self.photo_roots {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
    }
}

/// Get the application data directory.
/// Linux: ~/.local/share/photo-indexer
/// macOS: ~/Library/Application Support/photo-indexer
/// Windows: %APPDATA%\photo-indexer
fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(APP_DIR))
}

pub fn default_config_path() -> PathBuf {
    app_data_dir().join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_written_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "photo_roots": ["/srv/photos"], "initial_scan": true, "watch": { "debounce_ms": 50 } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.photo_roots, vec![PathBuf::from("/srv/photos")]);
        assert!(config.initial_scan);
        assert_eq!(config.watch.debounce_ms, 50);
        assert_eq!(config.watch.max_wait_ms, 2000);
        assert_eq!(config.scan.progress_interval, 100);
    }

    #[test]
    fn test_relative_roots_are_resolved() {
        let mut config = Config {
            photo_roots: vec![PathBuf::from("pictures"), PathBuf::from("/abs")],
            ..Config::default()
        };
        config.resolve_roots(Path::new("/home/me"));
        assert_eq!(
            config.photo_roots,
            vec![PathBuf::from("/home/me/pictures"), PathBuf::from("/abs")]
        );
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }
}
