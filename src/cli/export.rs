//! Export subcommand: dump a service as JSON.

use crate::service::ServiceSnapshot;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Service to export
    #[arg(short, long)]
    pub service: String,

    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    /// Write the snapshot to `--output`. Returns false when it should go to
    /// stdout instead.
    pub fn write(&self, snapshot: &ServiceSnapshot) -> Result<bool> {
        let Some(path) = &self.output else {
            return Ok(false);
        };
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(true)
    }
}
