//! Configuration loading and resolution
//!
//! Every setting is resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: defaults are used and a warning is logged.
//! A TOML file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_DATABASE: &str = "KPL_DATABASE";
pub const ENV_NAMESPACE: &str = "KPL_NAMESPACE";
pub const ENV_CHANNEL: &str = "KPL_CHANNEL";
pub const ENV_MANIFEST_BASE_URL: &str = "KPL_MANIFEST_BASE_URL";
pub const ENV_MEDIACMS_URL: &str = "KPL_MEDIACMS_URL";
pub const ENV_EXECUTOR_URL: &str = "KPL_EXECUTOR_URL";
pub const ENV_POLL_INTERVAL: &str = "KPL_POLL_INTERVAL";
pub const ENV_LOG_LEVEL: &str = "KPL_LOG_LEVEL";

const DEFAULT_NAMESPACE: &str = "kryten_playlist";
const DEFAULT_CHANNEL: &str = "lounge";
const DEFAULT_MANIFEST_BASE_URL: &str = "https://www.420grindhouse.com";
const DEFAULT_EXECUTOR_URL: &str = "http://127.0.0.1:8089";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub database_path: Option<PathBuf>,
    pub namespace: Option<String>,
    pub channel: Option<String>,
    pub manifest_base_url: Option<String>,
    pub mediacms_base_url: Option<String>,
    pub executor_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Load a TOML config file
    ///
    /// Returns defaults (all `None`) when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

        debug!("Loaded config file {}", path.display());
        Ok(config)
    }
}

/// Values supplied on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub namespace: Option<String>,
    pub channel: Option<String>,
    pub manifest_base_url: Option<String>,
    pub mediacms_base_url: Option<String>,
    pub executor_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// SQLite file holding the catalog rows and the document table
    pub database_path: PathBuf,
    /// Prefix for this service's document buckets
    pub namespace: String,
    /// Room whose live queue is reconciled
    pub channel: String,
    /// Base URL the executor resolves media manifests against
    pub manifest_base_url: String,
    /// MediaCMS instance the catalog is ingested from
    pub mediacms_base_url: String,
    /// HTTP endpoint of the external executor
    pub executor_url: String,
    /// Refresh-marker polling interval in seconds
    pub poll_interval_secs: u64,
    pub log_level: String,
}

impl SyncConfig {
    /// Resolve configuration from CLI overrides, environment, and a TOML file
    ///
    /// `config_file` of `None` means the platform default location.
    pub fn resolve(overrides: &ConfigOverrides, config_file: Option<&Path>) -> Result<Self> {
        let toml_config = match config_file {
            Some(path) => TomlConfig::load(path)?,
            None => match default_config_file() {
                Some(path) => TomlConfig::load(&path)?,
                None => TomlConfig::default(),
            },
        };

        Self::from_sources(overrides, &toml_config)
    }

    /// Resolve configuration from already-loaded sources
    pub fn from_sources(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let database_path = overrides
            .database_path
            .clone()
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or_else(|| toml_config.database_path.clone())
            .unwrap_or_else(default_database_path);

        let manifest_base_url = pick_string(
            &overrides.manifest_base_url,
            ENV_MANIFEST_BASE_URL,
            &toml_config.manifest_base_url,
            DEFAULT_MANIFEST_BASE_URL,
        );

        // MediaCMS usually serves the manifests too
        let mediacms_base_url = pick_string(
            &overrides.mediacms_base_url,
            ENV_MEDIACMS_URL,
            &toml_config.mediacms_base_url,
            &manifest_base_url,
        );

        let poll_interval_secs = match overrides.poll_interval_secs {
            Some(secs) => secs,
            None => match std::env::var(ENV_POLL_INTERVAL) {
                Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    Error::Config(format!("{} must be a whole number of seconds, got '{}'", ENV_POLL_INTERVAL, raw))
                })?,
                Err(_) => toml_config.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            },
        };

        let config = Self {
            database_path,
            namespace: pick_string(&overrides.namespace, ENV_NAMESPACE, &toml_config.namespace, DEFAULT_NAMESPACE),
            channel: pick_string(&overrides.channel, ENV_CHANNEL, &toml_config.channel, DEFAULT_CHANNEL),
            manifest_base_url,
            mediacms_base_url,
            executor_url: pick_string(
                &overrides.executor_url,
                ENV_EXECUTOR_URL,
                &toml_config.executor_url,
                DEFAULT_EXECUTOR_URL,
            ),
            poll_interval_secs,
            log_level: pick_string(&overrides.log_level, ENV_LOG_LEVEL, &toml_config.log_level, DEFAULT_LOG_LEVEL),
        };

        config.validate()?;
        Ok(config)
    }

    /// Polling interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be greater than zero".to_string()));
        }
        if self.channel.trim().is_empty() {
            return Err(Error::Config("channel must not be empty".to_string()));
        }
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("namespace must not be empty".to_string()));
        }
        for (name, url) in [
            ("manifest_base_url", &self.manifest_base_url),
            ("mediacms_base_url", &self.mediacms_base_url),
            ("executor_url", &self.executor_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("{} must be an http(s) URL, got '{}'", name, url)));
            }
        }
        Ok(())
    }
}

fn pick_string(cli: &Option<String>, env_var: &str, toml_value: &Option<String>, default: &str) -> String {
    if let Some(value) = cli {
        return value.clone();
    }
    if let Ok(value) = std::env::var(env_var) {
        return value;
    }
    if let Some(value) = toml_value {
        return value.clone();
    }
    default.to_string()
}

/// Default config file location: `~/.config/kpl/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kpl").join("config.toml"))
}

/// OS-dependent default database path
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("kpl"))
        .unwrap_or_else(|| PathBuf::from("./kpl_data"))
        .join("catalog.db")
}
