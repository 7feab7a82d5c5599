use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::service::QuotaConfig;
use crate::upload::{UploadLimits, DEFAULT_EXTENSIONS, DEFAULT_MAX_FILE_SIZE};
use crate::watch::{
    WatchConfig, DEFAULT_DETAIL_INTERVAL, DEFAULT_LIST_INTERVAL, DEFAULT_MAX_CONSECUTIVE_ERRORS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub upload_directory: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for Config {
    fn default() -> Self {
        let upload_directory = dirs::home_dir()
            .map(|home| home.join(".archiparse").join("uploads"))
            .unwrap_or_else(|| PathBuf::from("uploads"));
        Self {
            version: "1.0".to_string(),
            upload_directory: upload_directory.to_string_lossy().into_owned(),
            database_path: None,
            max_file_size: default_max_file_size(),
            allowed_extensions: default_extensions(),
            worker_count: default_worker_count(),
            polling: PollingConfig::default(),
            api: ApiConfig::default(),
            quota: QuotaConfig::default(),
        }
    }
}

impl Config {
    /// Upload acceptance limits, extensions lower-cased.
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_size: self.max_file_size,
            allowed_extensions: self
                .allowed_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// Configured database file, or `~/.archiparse/data/archiparse.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_list_interval_ms")]
    pub list_interval_ms: u64,
    #[serde(default = "default_detail_interval_ms")]
    pub detail_interval_ms: u64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_list_interval_ms() -> u64 {
    DEFAULT_LIST_INTERVAL.as_millis() as u64
}

fn default_detail_interval_ms() -> u64 {
    DEFAULT_DETAIL_INTERVAL.as_millis() as u64
}

fn default_max_consecutive_errors() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_ERRORS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            list_interval_ms: default_list_interval_ms(),
            detail_interval_ms: default_detail_interval_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl PollingConfig {
    pub fn list_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.list_interval_ms)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            interval: std::time::Duration::from_millis(self.detail_interval_ms),
            max_consecutive_errors: self.max_consecutive_errors,
        }
    }
}

/// REST API connection settings.
///
/// The password is resolved through [`crate::secrets::resolve_secret`]: a
/// direct value, then a file, then an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub password_env_var: Option<String>,
}

fn default_base_url() -> String {
    crate::client::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            email: None,
            password: None,
            password_file: None,
            password_env_var: None,
        }
    }
}

impl ApiConfig {
    pub fn has_password_source(&self) -> bool {
        crate::secrets::has_secret_source(
            self.password.as_deref(),
            self.password_file.as_deref(),
            self.password_env_var.as_deref(),
        )
    }
}
