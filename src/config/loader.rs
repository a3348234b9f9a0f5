//! Configuration loader with tier-based merging.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the config file looked up in each tier directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Compiled-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/jones/)
    Project = 1,
    /// User-level config (~/.jones/)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for each file-based tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover tier directories from the environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var("JONES_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".jones")));

        let project_dir = std::env::var("JONES_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("jones")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Loads and merges configuration tiers.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority config file that contributed, if any
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit tier directories.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Ok(explicit_path) = std::env::var("JONES_CONFIG_PATH") {
            return Self::load_explicit(paths, PathBuf::from(explicit_path));
        }

        let mut configs: Vec<Value> = Vec::new();
        let mut config_path = None;

        configs.push(serde_json::to_value(Config::default())?);

        let tiers = [
            (ConfigTier::Project, paths.project_dir.as_deref()),
            (ConfigTier::User, paths.user_dir.as_deref()),
        ];
        for (tier, dir) in tiers {
            let Some(dir) = dir else { continue };
            if let Some(value) = read_tier(&dir.join(CONFIG_FILE)) {
                debug!(tier = %tier, dir = %dir.display(), "config tier loaded");
                configs.push(value);
                config_path = Some(dir.join(CONFIG_FILE));
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config =
            serde_json::from_value(merged).context("merged configuration is invalid")?;
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Load a single file named by `JONES_CONFIG_PATH` (or `--config`).
    fn load_explicit(paths: ConfigPaths, path: PathBuf) -> Result<Self> {
        let mut config = Config::load(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        Self::apply_env_overrides(&mut config);
        Ok(Self {
            paths,
            config,
            config_path: Some(path),
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("JONES_DB_PATH") {
            config.store.db_path = PathBuf::from(db_path);
        }

        if let Ok(root) = std::env::var("JONES_SERVICES_ROOT") {
            config.store.services_root = root;
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// The config file that was used, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Parse one tier's YAML file. Missing files are skipped silently; unreadable
/// or invalid ones are skipped with a warning.
fn read_tier(file: &Path) -> Option<Value> {
    if !file.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(err) => {
            warn!(file = %file.display(), error = %err, "config file unreadable");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(file = %file.display(), error = %err, "config file is not valid YAML");
            None
        }
    }
}
