use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::poll::PollingIntervals;
use crate::remote::RetryPolicy;

pub const API_KEY_ENV: &str = "HOMEDECK_API_KEY";

/// Per-user data directory for the store and the logs.
pub fn data_dir() -> Result<PathBuf> {
  resolve_data_dir(dirs::data_dir(), dirs::home_dir())
    .map(|dir| dir.join("homedeck"))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}

fn resolve_data_dir(data: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
  data.or_else(|| home.map(|p| p.join(".local/share")))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
  pub remote: RemoteConfig,
  pub polling: PollingConfig,
  pub autosave: AutosaveConfig,
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
  pub base_url: String,
  /// Sent as `X-API-Key`; `HOMEDECK_API_KEY` takes precedence
  pub api_key: Option<String>,
  /// Per attempt
  pub timeout_secs: u64,
  pub retry_attempts: u32,
  /// Attempt `n` waits `n * retry_delay_ms` before retrying
  pub retry_delay_ms: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080/api".to_string(),
      api_key: None,
      timeout_secs: 10,
      retry_attempts: 3,
      retry_delay_ms: 1000,
    }
  }
}

impl RemoteConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.base_url).map_err(|e| eyre!("Invalid remote.base_url '{}': {}", self.base_url, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::linear(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
  }
}

/// Poll periods in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
  pub system_metrics_secs: u64,
  pub services_secs: u64,
  pub network_devices_secs: u64,
  pub storage_secs: u64,
  pub automation_rules_secs: u64,
  pub security_alerts_secs: u64,
  pub recovery_probe_secs: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      system_metrics_secs: 5,
      services_secs: 30,
      network_devices_secs: 60,
      storage_secs: 60,
      automation_rules_secs: 60,
      security_alerts_secs: 30,
      recovery_probe_secs: 30,
    }
  }
}

impl PollingConfig {
  pub fn intervals(&self) -> PollingIntervals {
    // tokio intervals panic on a zero period
    let secs = |s: u64| Duration::from_secs(s.max(1));
    PollingIntervals {
      system_metrics: secs(self.system_metrics_secs),
      services: secs(self.services_secs),
      network_devices: secs(self.network_devices_secs),
      storage: secs(self.storage_secs),
      automation_rules: secs(self.automation_rules_secs),
      security_alerts: secs(self.security_alerts_secs),
      recovery_probe: secs(self.recovery_probe_secs),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
  pub interval_secs: u64,
}

impl Default for AutosaveConfig {
  fn default() -> Self {
    Self { interval_secs: 60 }
  }
}

impl AutosaveConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite file; defaults to the platform data directory
  pub path: Option<PathBuf>,
  pub cache_ttl_secs: i64,
  pub error_log_capacity: usize,
  /// Largest value the backend accepts, in bytes
  pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      path: None,
      cache_ttl_secs: 300,
      error_log_capacity: 100,
      quota_bytes: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./homedeck.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/homedeck/config.yaml
  ///
  /// Without a file every setting takes its default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::info!("no config file found, using defaults");
        Self::default()
      }
    };

    Ok(config.with_api_key_override(std::env::var(API_KEY_ENV).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("homedeck.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("homedeck").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config = Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
    tracing::info!(path = %path.display(), "loaded config");

    Ok(config)
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file parses as null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// A non-empty key from the environment replaces the file's.
  pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
    if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
      self.remote.api_key = Some(key);
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_file_is_all_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.remote.base_url, "http://localhost:8080/api");
    assert_eq!(config.polling.intervals(), PollingIntervals::default());
  }

  #[test]
  fn test_partial_sections_keep_other_defaults() {
    let config = Config::from_yaml(
      "remote:\n  base_url: https://lab.example.net/api\n  retry_attempts: 5\npolling:\n  system_metrics_secs: 2\n",
    )
    .unwrap();
    assert_eq!(config.remote.retry_attempts, 5);
    assert_eq!(config.remote.timeout_secs, 10);
    assert_eq!(config.polling.intervals().system_metrics, Duration::from_secs(2));
    assert_eq!(config.polling.services_secs, 30);
    assert_eq!(config.autosave.interval(), Duration::from_secs(60));
    assert_eq!(config.remote.base_url().unwrap().host_str(), Some("lab.example.net"));
  }

  #[test]
  fn test_env_key_overrides_file() {
    let config = Config::from_yaml("remote:\n  api_key: from-file\n").unwrap();
    let config = config.with_api_key_override(Some("from-env".to_string()));
    assert_eq!(config.remote.api_key.as_deref(), Some("from-env"));

    let config = config.with_api_key_override(Some("  ".to_string()));
    assert_eq!(config.remote.api_key.as_deref(), Some("from-env"));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());

    let path = dir.path().join("homedeck.yaml");
    std::fs::write(&path, "autosave:\n  interval_secs: 15\n").unwrap();
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.autosave.interval_secs, 15);
  }

  #[test]
  fn test_data_dir_falls_back_to_home() {
    let home = PathBuf::from("/home/lab");
    assert_eq!(
      resolve_data_dir(None, Some(home.clone())),
      Some(PathBuf::from("/home/lab/.local/share"))
    );
    assert_eq!(
      resolve_data_dir(Some(PathBuf::from("/data")), Some(home)),
      Some(PathBuf::from("/data"))
    );
    assert_eq!(resolve_data_dir(None, None), None);
  }

  #[test]
  fn test_invalid_base_url() {
    let config = Config::from_yaml("remote:\n  base_url: not a url\n").unwrap();
    assert!(config.remote.base_url().is_err());
  }
}
