//! Tool configuration.
//!
//! Consolidates configuration from tiers with field-by-field YAML merging:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/jones/config.yaml`
//! 3. **User** - `~/.jones/config.yaml`
//! 4. **Environment** - variables below
//!
//! ## Environment Variables
//! - `JONES_CONFIG_PATH` - Explicit config file (overrides all tiers)
//! - `JONES_DB_PATH` - Store database path
//! - `JONES_SERVICES_ROOT` - Store node that holds all services
//! - `JONES_USER_DIR` - User config dir (default: `~/.jones`)
//! - `JONES_PROJECT_DIR` - Project config dir (default: `./jones`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
