//! jones command-line tool.
//!
//! Opens the SQLite-backed tree store named by the configuration and runs a
//! single command against it.

use anyhow::{Context, Result};
use clap::Parser;
use jones::cli::{Cli, execute};
use jones::config::ConfigLoader;
use jones::logging::{self, LogTarget};
use jones::store::{SqliteStore, TreeStore};
use std::sync::Arc;
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    // SAFETY: single-threaded at this point, before any store or logging threads exist
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("JONES_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    let config_path_used = loader
        .config_path()
        .map(|p| p.to_string_lossy().to_string());

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.store.db_path = db_path.into();
    }
    if let Some(root) = &cli.root {
        config.store.services_root = root.clone();
    }
    debug!(
        config_file = ?config_path_used,
        db_path = %config.store.db_path.display(),
        services_root = %config.store.services_root,
        "configuration loaded"
    );

    config.ensure_db_dir()?;
    let store: Arc<dyn TreeStore> = Arc::new(
        SqliteStore::open(&config.store.db_path).with_context(|| {
            format!("failed to open store {}", config.store.db_path.display())
        })?,
    );

    if let Some(output) = execute(&cli.command, store, &config.store.services_root)? {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}
