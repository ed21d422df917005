//! Configuration loading from TOML files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings file for memcload
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Device category → memcached address, merged over the built-in map
    pub stores: BTreeMap<String, String>,
    pub connection: ConnectionConfig,
    pub workers: WorkersConfig,
    pub retry: RetryConfig,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connect and read/write timeout for each store call
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: memcload::store::DEFAULT_STORE_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default: memcload::config::default_workers(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: memcload_core::retry::DEFAULT_MAX_ATTEMPTS,
            delay_ms: memcload_core::retry::DEFAULT_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub max_error_rate: f64,
    /// Rename files over the error threshold like any other
    pub mark_breached: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_error_rate: memcload::processor::DEFAULT_MAX_ERROR_RATE,
            mark_breached: true,
        }
    }
}

impl FileConfig {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./memcload.toml (current directory)
    /// 2. ~/.config/memcload/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("memcload.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "memcload") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Built-in store map with this file's entries on top
    pub fn store_addresses(&self) -> BTreeMap<String, String> {
        let mut stores = memcload::config::default_stores();
        stores.extend(self.stores.clone());
        stores
    }
}
