//! Hierarchical service configuration.
//!
//! Each service owns a tree of environments (`prod`, `prod/us`, ...). An
//! environment's view is its own config overlaid on every ancestor's, from the
//! root down. Hosts are associated with an environment and read its view.
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use jones::{ConfigService, EnvPath, MemoryStore};
//!
//! let svc = ConfigService::new(Arc::new(MemoryStore::new()), "web").unwrap();
//! svc.create_config(&EnvPath::root(), &json!({"timeout": 30})).unwrap();
//! let prod = EnvPath::new("prod").unwrap();
//! svc.create_config(&prod, &json!({"region": "na"})).unwrap();
//! svc.assoc_host("web01", &prod).unwrap();
//!
//! let conf = svc.get_config("web01").unwrap();
//! assert_eq!(conf["timeout"], 30);
//! assert_eq!(conf["region"], "na");
//! ```

pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod nodemap;
pub mod service;
pub mod store;

pub use env::EnvPath;
pub use error::{ErrorCode, JonesError, Result};
pub use nodemap::NodeMap;
pub use service::{ConfigMap, ConfigService};
pub use store::{MemoryStore, SqliteStore, TreeStore};
