use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::storage::{BUFFER_POOL_SIZE, MAX_PAGES, PAGE_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for a buffer pool and its backing file.
///
/// Stored as JSON; fields missing from the file keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Path of the database file
    pub db_path: PathBuf,
    /// Page size in bytes
    pub page_size: usize,
    /// Number of frames in the pool
    pub pool_size: usize,
    /// Page ids at or above this bound are rejected
    pub max_pages: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("pagecache.db"),
            page_size: PAGE_SIZE,
            pool_size: BUFFER_POOL_SIZE,
            max_pages: MAX_PAGES,
        }
    }
}

impl PoolConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be positive".to_string()));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be positive".to_string()));
        }
        Ok(())
    }
}
