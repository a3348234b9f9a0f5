//! Config payload input for `create` and `set`.

use crate::service::validate_config;
use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

/// Where a config payload comes from. Exactly one source is required.
#[derive(Args, Debug, Clone)]
pub struct PayloadArgs {
    /// Inline JSON object
    #[arg(long, value_name = "JSON", conflicts_with = "file")]
    pub json: Option<String>,

    /// File holding a JSON (or YAML, by extension) object
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    /// Read and validate the payload as a string-keyed mapping.
    pub fn read(&self) -> Result<Value> {
        let value = match (&self.json, &self.file) {
            (Some(json), None) => {
                serde_json::from_str::<Value>(json).context("--json is not valid JSON")?
            }
            (None, Some(file)) => read_file(file)?,
            _ => bail!("exactly one of --json or --file is required"),
        };
        validate_config(&value)?;
        Ok(value)
    }
}

fn read_file(file: &PathBuf) -> Result<Value> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let is_yaml = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("{} is not valid YAML", file.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", file.display()))
    }
}
