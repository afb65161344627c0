//! Configuration for signify-keystrokes

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("signify-keystrokes")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Events returned per replay page
    #[serde(default = "default_replay_page_size")]
    pub replay_page_size: u32,

    /// Largest keystroke batch accepted in one request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Posts returned per public listing page
    #[serde(default = "default_listing_page_size")]
    pub listing_page_size: u32,

    /// SQLite connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8095
}

fn default_replay_page_size() -> u32 {
    1000
}

fn default_max_batch_size() -> usize {
    5000
}

fn default_listing_page_size() -> u32 {
    20
}

fn default_pool_size() -> u32 {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            replay_page_size: default_replay_page_size(),
            max_batch_size: default_max_batch_size(),
            listing_page_size: default_listing_page_size(),
            pool_size: default_pool_size(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StorageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.replay_page_size == 0 {
            return Err(StorageError::Config("replay_page_size must be > 0".into()));
        }
        if self.listing_page_size == 0 {
            return Err(StorageError::Config("listing_page_size must be > 0".into()));
        }
        if self.max_batch_size == 0 {
            return Err(StorageError::Config("max_batch_size must be > 0".into()));
        }
        if self.pool_size == 0 {
            return Err(StorageError::Config("pool_size must be > 0".into()));
        }
        Ok(())
    }

    /// Get SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("keystrokes.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
