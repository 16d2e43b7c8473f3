//! Configuration management for lapwatchd.
//!
//! Loads settings from a TOML file (explicit path, or `lapwatch.toml` in the
//! working directory) and applies environment overrides, read from the
//! process environment first and a `.env` file second. Only the upstream
//! base URL is required.

use crate::drivers::DEFAULT_MAPPING_PATH;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "lapwatch.toml";

/// Dotenv file looked up in the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Environment variable carrying the upstream API base URL
pub const ENV_BASE_URL: &str = "BASE_URL";
pub const ENV_LISTEN_ADDR: &str = "LAPWATCH_LISTEN_ADDR";
pub const ENV_DRIVER_MAPPING: &str = "LAPWATCH_DRIVER_MAPPING";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid env file {path:?}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("Upstream base URL not set (use [upstream] base_url or the BASE_URL environment variable)")]
    MissingBaseUrl,

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Upstream timing API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API base, e.g. `https://api.openf1.org/v1`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Timeout for the session descriptor lookup
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Timeout for each telemetry resource fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_session_timeout() -> u64 {
    5
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            session_timeout_secs: default_session_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Poll cadence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Sleep after a race or sprint cycle
    #[serde(default = "default_race_interval")]
    pub race_interval_secs: u64,

    /// Sleep after any other cycle
    #[serde(default = "default_idle_interval")]
    pub idle_interval_secs: u64,

    /// Delay between session lookups while waiting at startup
    #[serde(default = "default_startup_retry")]
    pub startup_retry_secs: u64,

    /// How long a resolved session type is reused without a lookup
    #[serde(default = "default_session_cache_ttl")]
    pub session_cache_ttl_secs: u64,

    /// Re-resolve the session type every N cycles. 0 keeps the type
    /// resolved at startup for the whole run.
    #[serde(default)]
    pub session_refresh_cycles: u32,
}

fn default_race_interval() -> u64 {
    2
}

fn default_idle_interval() -> u64 {
    10
}

fn default_startup_retry() -> u64 {
    10
}

fn default_session_cache_ttl() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            race_interval_secs: default_race_interval(),
            idle_interval_secs: default_idle_interval(),
            startup_retry_secs: default_startup_retry(),
            session_cache_ttl_secs: default_session_cache_ttl(),
            session_refresh_cycles: 0,
        }
    }
}

impl PollingConfig {
    pub fn race_interval(&self) -> Duration {
        Duration::from_secs(self.race_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn startup_retry(&self) -> Duration {
        Duration::from_secs(self.startup_retry_secs)
    }

    pub fn session_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.session_cache_ttl_secs)
    }
}

/// Exposition endpoint and static data settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_driver_mapping")]
    pub driver_mapping: PathBuf,
}

fn default_listen_addr() -> String {
    "0.0.0.0:18000".to_string()
}

fn default_driver_mapping() -> PathBuf {
    PathBuf::from(DEFAULT_MAPPING_PATH)
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            driver_mapping: default_driver_mapping(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub exporter: ExporterSection,
}

impl ExporterConfig {
    /// Load config, apply environment overrides and validate.
    ///
    /// An explicit path must exist; without one, `lapwatch.toml` is used
    /// when present and defaults otherwise. Overrides come from the process
    /// environment, then `.env` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env_file(path, Path::new(DEFAULT_ENV_FILE))
    }

    /// Same as [`ExporterConfig::load`] with an explicit dotenv file
    pub fn load_with_env_file(path: Option<&Path>, env_file: &Path) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_path(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            }
        };
        let dotenv = read_env_file(env_file)?;
        config.apply_overrides(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| dotenv.get(key).cloned())
        });
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExporterConfig = toml::from_str(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.upstream.base_url = Some(url);
        }
        if let Some(addr) = lookup(ENV_LISTEN_ADDR).filter(|v| !v.trim().is_empty()) {
            self.exporter.listen_addr = addr;
        }
        if let Some(path) = lookup(ENV_DRIVER_MAPPING).filter(|v| !v.trim().is_empty()) {
            self.exporter.driver_mapping = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.polling.race_interval_secs == 0 || self.polling.idle_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "polling",
                reason: "poll intervals must be at least 1 second".to_string(),
            });
        }
        if self.upstream.session_timeout_secs == 0 || self.upstream.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "upstream",
                reason: "timeouts must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> Result<&str, ConfigError> {
        self.upstream
            .base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingBaseUrl)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.session_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.fetch_timeout_secs)
    }
}

/// Read `KEY=value` pairs from a dotenv file without touching the process
/// environment. A missing file yields no pairs.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let env_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };
    let vars = dotenvy::from_path_iter(path)
        .map_err(env_error)?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(env_error)?;
    info!("Loaded {} variables from {:?}", vars.len(), path);
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.upstream.session_timeout_secs, 5);
        assert_eq!(config.upstream.fetch_timeout_secs, 10);
        assert_eq!(config.polling.race_interval_secs, 2);
        assert_eq!(config.polling.idle_interval_secs, 10);
        assert_eq!(config.polling.session_cache_ttl_secs, 30);
        assert_eq!(config.polling.session_refresh_cycles, 0);
        assert_eq!(config.exporter.listen_addr, "0.0.0.0:18000");
    }

    #[test]
    fn test_missing_base_url_is_fatal() {
        let config = ExporterConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingBaseUrl)));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[upstream]
base_url = "https://api.openf1.org/v1/"

[polling]
race_interval_secs = 3
session_refresh_cycles = 20
"#;
        let config: ExporterConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.base_url().unwrap(), "https://api.openf1.org/v1");
        assert_eq!(config.polling.race_interval_secs, 3);
        assert_eq!(config.polling.session_refresh_cycles, 20);
        // Defaults for missing fields
        assert_eq!(config.polling.idle_interval_secs, 10);
        assert_eq!(config.upstream.fetch_timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, "http://localhost:9000"),
            (ENV_LISTEN_ADDR, "127.0.0.1:9100"),
        ]
        .into_iter()
        .collect();

        let mut config = ExporterConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url().unwrap(), "http://localhost:9000");
        assert_eq!(config.exporter.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.exporter.driver_mapping, PathBuf::from(DEFAULT_MAPPING_PATH));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = ExporterConfig::default();
        config.upstream.base_url = Some("http://x".to_string());
        config.polling.race_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_from_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lapwatch.toml");
        fs::write(&path, "[upstream]\nbase_url = \"http://upstream\"\n").unwrap();

        let config = ExporterConfig::load_from_path(&path).unwrap();
        assert_eq!(config.base_url().unwrap(), "http://upstream");

        let err = ExporterConfig::load_from_path(&tmp.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_base_url_from_env_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".env");
        fs::write(&path, "# upstream\nBASE_URL=http://dotenv-upstream/v1/\n").unwrap();

        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get(ENV_BASE_URL).map(String::as_str), Some("http://dotenv-upstream/v1/"));

        let mut config = ExporterConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        assert_eq!(config.base_url().unwrap(), "http://dotenv-upstream/v1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_env_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_env_file(&tmp.path().join(".env")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_env_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".env");
        fs::write(&path, "BASE_URL='unterminated\n").unwrap();
        assert!(matches!(read_env_file(&path), Err(ConfigError::EnvFile { .. })));
    }
}
