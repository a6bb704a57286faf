//! Application configuration management.
//!
//! This module handles loading the configuration, which picks the
//! API host, where the credential is stored, and an optional request timeout.
//!
//! Configuration is stored at `~/.config/authsession/config.json`. The
//! `API_BASE_URL` environment variable overrides the configured host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::auth::{FileStore, KeyValueStore, KeyringStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "authsession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable naming the API host
pub const API_BASE_URL_ENV: &str = "API_BASE_URL";

/// Host used when neither the environment nor the config file names one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost";

/// Where the credential is persisted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed credential store
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// API host: environment, then config file, then the built-in default
    pub fn api_base_url(&self) -> String {
        self.resolve_api_base_url(std::env::var(API_BASE_URL_ENV).ok())
    }

    fn resolve_api_base_url(&self, env_value: Option<String>) -> String {
        env_value
            .filter(|v| !v.is_empty())
            .or_else(|| self.api_base_url.clone().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::with_timeout(self.api_base_url(), self.request_timeout())
            .context("Failed to build HTTP client")
    }

    /// Open the configured credential store
    pub fn open_store(&self) -> Result<Box<dyn KeyValueStore>> {
        Ok(match self.storage {
            StorageBackend::File => Box::new(FileStore::new(self.data_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringStore::default()),
        })
    }
}
