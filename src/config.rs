use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ApiTarget, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://track.onestepgps.com/v3/api/public";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub refresh_interval_secs: u64,
    pub error_clear_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub debounce_ms: u64,
    pub request_timeout_secs: u64,
    pub latest_point_only: bool,
    pub device_query: Option<String>,
    pub preferences_db: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_interval_secs: 20,
            error_clear_secs: 3,
            max_retries: 3,
            retry_base_delay_ms: 2_000,
            debounce_ms: 500,
            request_timeout_secs: 30,
            latest_point_only: true,
            device_query: None,
            preferences_db: "./tracker_preferences.db".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let api_key = env::var("FLEET_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("FLEET_API_KEY is not set, requests will be rejected by the API");
        }

        Ok(Config {
            api_key,
            base_url: env::var("FLEET_BASE_URL").unwrap_or(defaults.base_url),
            refresh_interval_secs: get_env_var("REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs),
            error_clear_secs: get_env_var("ERROR_CLEAR_SECS", defaults.error_clear_secs),
            max_retries: get_env_var("MAX_RETRIES", defaults.max_retries),
            retry_base_delay_ms: get_env_var("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            debounce_ms: get_env_var("DEBOUNCE_MS", defaults.debounce_ms),
            request_timeout_secs: get_env_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            latest_point_only: get_env_var("LATEST_POINT_ONLY", defaults.latest_point_only),
            device_query: env::var("DEVICE_QUERY").ok().filter(|q| !q.is_empty()),
            preferences_db: env::var("PREFERENCES_DB").unwrap_or(defaults.preferences_db),
        })
    }

    fn get_config_file_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(config_dir).join("tracker_config.json")
    }

    /// Loads `CONFIG_DIR/tracker_config.json` if present, else the environment.
    pub fn load() -> Result<Self> {
        let path = Self::get_config_file_path();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Self::from_env()
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config from {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).with_context(|| format!("parsing config at {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self) -> Result<()> {
        self.save_to_path(&Self::get_config_file_path())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure the directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    pub fn api_target(&self) -> ApiTarget {
        ApiTarget {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn error_clear_delay(&self) -> Duration {
        Duration::from_secs(self.error_clear_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn get_env_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}
