//! Configuration types.

use crate::service::DEFAULT_SERVICES_ROOT;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
}

/// Where the tree store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Store node under which each service gets its own subtree.
    #[serde(default = "default_services_root")]
    pub services_root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            services_root: default_services_root(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("jones/jones.db")
}

fn default_services_root() -> String {
    DEFAULT_SERVICES_ROOT.to_string()
}

impl Config {
    /// Load a single config file, ignoring tiers.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Empty or comment-only YAML parses as null
        let config: Option<Config> = serde_yaml::from_str(&content)?;
        Ok(config.unwrap_or_default())
    }

    /// Ensure the directory holding the database exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.store.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
