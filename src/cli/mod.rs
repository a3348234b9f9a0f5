//! CLI command definitions for jones.
//!
//! The `Cli` struct holds global options; each subcommand maps onto one
//! `ConfigService` operation and produces a JSON value for stdout.

pub mod export;
pub mod payload;

use crate::env::EnvPath;
use crate::service::{ConfigService, list_services};
use crate::store::{TreeStore, Version};
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use export::ExportArgs;
use payload::PayloadArgs;
use serde_json::{Value, json};
use std::sync::Arc;

/// Hierarchical service configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to store database (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Store node holding all services (overrides config)
    #[arg(long, global = true)]
    pub root: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// A service and one of its environments.
#[derive(Args, Debug, Clone)]
pub struct EnvTarget {
    /// Service name
    #[arg(short, long)]
    pub service: String,

    /// Environment, e.g. `prod/us` (default: root)
    #[arg(short, long)]
    pub env: Option<String>,
}

impl EnvTarget {
    fn env(&self) -> Result<EnvPath> {
        Ok(EnvPath::from_option(self.env.as_deref())?)
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List services in the store
    Services,

    /// Create an environment's config
    Create {
        #[command(flatten)]
        target: EnvTarget,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Replace an environment's config and recompute descendant views
    Set {
        #[command(flatten)]
        target: EnvTarget,
        #[command(flatten)]
        payload: PayloadArgs,
        /// Version the config must still be at
        #[arg(long)]
        expected: Version,
    },

    /// Delete an environment's config and view
    Delete {
        #[command(flatten)]
        target: EnvTarget,
        /// Version the config must still be at
        #[arg(long)]
        expected: Version,
    },

    /// Show an environment's own config and version
    Show {
        #[command(flatten)]
        target: EnvTarget,
    },

    /// Show an environment's merged view
    View {
        #[command(flatten)]
        target: EnvTarget,
    },

    /// Show the effective config for a host
    Host {
        #[arg(short, long)]
        service: String,
        hostname: String,
    },

    /// Associate a host with an environment
    Assoc {
        #[command(flatten)]
        target: EnvTarget,
        hostname: String,
    },

    /// List hosts associated with an environment
    Associations {
        #[command(flatten)]
        target: EnvTarget,
    },

    /// Remove a host's association
    Unassoc {
        #[arg(short, long)]
        service: String,
        hostname: String,
    },

    /// Check whether a service has a root config
    Exists {
        #[arg(short, long)]
        service: String,
    },

    /// Delete a service and everything under it
    Destroy {
        #[arg(short, long)]
        service: String,
        /// Required confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List environments below an environment
    Children {
        #[command(flatten)]
        target: EnvTarget,
    },

    /// List every environment of a service
    Envs {
        #[arg(short, long)]
        service: String,
    },

    /// Recompute views of an environment and its descendants
    Refresh {
        #[command(flatten)]
        target: EnvTarget,
    },

    /// Export a service as JSON
    Export(ExportArgs),
}

/// Run one command against `store`. Returns the value to print, or `None`
/// when there is nothing to print.
pub fn execute(
    command: &Command,
    store: Arc<dyn TreeStore>,
    services_root: &str,
) -> Result<Option<Value>> {
    let open = |service: &str| ConfigService::with_root(Arc::clone(&store), services_root, service);

    let output = match command {
        Command::Services => json!(list_services(store.as_ref(), services_root)?),
        Command::Create { target, payload } => {
            let env = target.env()?;
            open(&target.service)?.create_config(&env, &payload.read()?)?;
            json!({ "created": env })
        }
        Command::Set {
            target,
            payload,
            expected,
        } => {
            let env = target.env()?;
            open(&target.service)?.set_config(&env, &payload.read()?, *expected)?;
            json!({ "updated": env })
        }
        Command::Delete { target, expected } => {
            let env = target.env()?;
            open(&target.service)?.delete_config(&env, *expected)?;
            json!({ "deleted": env })
        }
        Command::Show { target } => {
            let (version, config) = open(&target.service)?.get_config_by_env(&target.env()?)?;
            json!({ "version": version, "config": config })
        }
        Command::View { target } => {
            json!(open(&target.service)?.get_view_by_env(&target.env()?)?)
        }
        Command::Host { service, hostname } => json!(open(service)?.get_config(hostname)?),
        Command::Assoc { target, hostname } => {
            let env = target.env()?;
            open(&target.service)?.assoc_host(hostname, &env)?;
            json!({ "host": hostname, "env": env })
        }
        Command::Associations { target } => {
            json!(open(&target.service)?.get_associations(&target.env()?)?)
        }
        Command::Unassoc { service, hostname } => {
            open(service)?.delete_association(hostname)?;
            json!({ "unassociated": hostname })
        }
        Command::Exists { service } => json!(open(service)?.exists()?),
        Command::Destroy { service, yes } => {
            if !yes {
                bail!("refusing to delete service '{}' without --yes", service);
            }
            open(service)?.delete_all()?;
            json!({ "destroyed": service })
        }
        Command::Children { target } => {
            json!(open(&target.service)?.get_child_envs(&target.env()?)?)
        }
        Command::Envs { service } => json!(open(service)?.list_envs()?),
        Command::Refresh { target } => {
            let env = target.env()?;
            open(&target.service)?.refresh_views(&env)?;
            json!({ "refreshed": env })
        }
        Command::Export(args) => {
            let snapshot = open(&args.service)?.export()?;
            if args.write(&snapshot)? {
                return Ok(None);
            }
            serde_json::to_value(&snapshot)?
        }
    };

    Ok(Some(output))
}
