//! Per-service configuration tree.
//!
//! Layout under `<services_root>/<service>`:
//!
//! ```text
//! conf/<env>    authored config for each environment (JSON object)
//! views/<env>   merged config, root overlaid down to <env> (derived)
//! nodemaps      hostname -> view path associations
//! ```
//!
//! The root environment maps to `conf` and `views` themselves.
//!
//! A view is recomputed whenever its own config or any ancestor's config is
//! written. Each view write is its own compare-and-set; a cascade that fails
//! partway leaves earlier views updated and later ones stale until the next
//! write (or [`ConfigService::refresh_views`]) reaches them.

use crate::env::EnvPath;
use crate::error::{ErrorCode, JonesError, Result};
use crate::nodemap::{Associations, NodeMap};
use crate::store::{self, TreeStore, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default parent node for all services.
pub const DEFAULT_SERVICES_ROOT: &str = "/services";

/// A string-keyed configuration mapping.
pub type ConfigMap = Map<String, Value>;

/// Require `conf` to be a JSON object.
pub fn validate_config(conf: &Value) -> Result<&ConfigMap> {
    conf.as_object().ok_or_else(|| {
        JonesError::validation(format!(
            "conf must be a string-keyed mapping, got {}",
            value_kind(conf)
        ))
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Overlay `layer` onto `base`: keys in `layer` replace keys in `base`.
///
/// The overlay is shallow. A nested object in `layer` replaces the one in
/// `base` wholesale.
pub fn overlay(base: &mut ConfigMap, layer: ConfigMap) {
    for (key, value) in layer {
        base.insert(key, value);
    }
}

/// Names of all services under `services_root`.
pub fn list_services(store: &dyn TreeStore, services_root: &str) -> Result<Vec<String>> {
    if !store.exists(services_root)? {
        return Ok(Vec::new());
    }
    store.children(services_root)
}

/// One environment in an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub env: EnvPath,
    pub version: Version,
    pub config: ConfigMap,
    /// `None` if the view node is missing or unreadable.
    pub view: Option<ConfigMap>,
}

/// Point-in-time dump of a whole service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service: String,
    pub exported_at: String,
    pub envs: Vec<EnvSnapshot>,
    pub associations: Associations,
}

/// Configuration operations for one service.
#[derive(Clone)]
pub struct ConfigService {
    store: Arc<dyn TreeStore>,
    service: String,
    root: String,
    conf_root: String,
    view_root: String,
    associations: NodeMap,
}

impl ConfigService {
    /// Open `service` under [`DEFAULT_SERVICES_ROOT`].
    pub fn new(store: Arc<dyn TreeStore>, service: &str) -> Result<Self> {
        Self::with_root(store, DEFAULT_SERVICES_ROOT, service)
    }

    /// Open `service` under an explicit services root.
    ///
    /// Creates the association node if missing; configs and views are only
    /// created by `create_config`.
    pub fn with_root(store: Arc<dyn TreeStore>, services_root: &str, service: &str) -> Result<Self> {
        store::validate_path(services_root)?;
        if service.is_empty() || service.contains('/') {
            return Err(JonesError::validation(format!(
                "Invalid service name '{}'",
                service
            )));
        }

        let root = store::join(services_root, service);
        let conf_root = store::join(&root, "conf");
        let view_root = store::join(&root, "views");
        let associations = NodeMap::new(Arc::clone(&store), store::join(&root, "nodemaps"))?;

        Ok(Self {
            store,
            service: service.to_string(),
            root,
            conf_root,
            view_root,
            associations,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Store path of the service subtree.
    pub fn root_path(&self) -> &str {
        &self.root
    }

    /// Store path of `env`'s config node.
    pub fn conf_path(&self, env: &EnvPath) -> String {
        store::join(&self.conf_root, env.as_str())
    }

    /// Store path of `env`'s view node.
    pub fn view_path(&self, env: &EnvPath) -> String {
        store::join(&self.view_root, env.as_str())
    }

    /// Create the config for `env` and materialize its view.
    ///
    /// The parent environment must already be configured.
    pub fn create_config(&self, env: &EnvPath, conf: &Value) -> Result<()> {
        let conf = validate_config(conf)?;

        self.store.ensure_path(&self.view_root)?;
        let path = self.conf_path(env);
        self.store.create(&path, &serde_json::to_vec(conf)?)?;
        info!(service = %self.service, env = %env, "config created");

        self.update_view(env)
    }

    /// Replace `env`'s config if its version is still `version`, then
    /// recompute the views of `env` and all of its descendants.
    pub fn set_config(&self, env: &EnvPath, conf: &Value, version: Version) -> Result<()> {
        let conf = validate_config(conf)?;

        let path = self.conf_path(env);
        let stat = self
            .store
            .set(&path, &serde_json::to_vec(conf)?, Some(version))?;
        info!(
            service = %self.service,
            env = %env,
            version = stat.version,
            "config updated"
        );

        self.cascade(env)
    }

    /// Delete `env`'s config (at `version`) and its view.
    ///
    /// Descendant configs and views are not touched; an environment with
    /// children fails `NotEmpty`.
    pub fn delete_config(&self, env: &EnvPath, version: Version) -> Result<()> {
        self.store.delete(&self.conf_path(env), Some(version), false)?;
        self.store.delete(&self.view_path(env), None, false)?;
        info!(service = %self.service, env = %env, "config deleted");
        Ok(())
    }

    /// Effective configuration for `hostname`, via its association.
    pub fn get_config(&self, hostname: &str) -> Result<ConfigMap> {
        let dest = self.associations.get(hostname).map_err(|err| {
            if err.is(ErrorCode::NotFound) {
                JonesError::no_association(hostname)
            } else {
                err
            }
        })?;
        Ok(self.read_mapping(&dest)?.1)
    }

    /// `(version, config)` of `env`'s authored config.
    pub fn get_config_by_env(&self, env: &EnvPath) -> Result<(Version, ConfigMap)> {
        self.read_mapping(&self.conf_path(env))
    }

    /// Last materialized view of `env`.
    pub fn get_view_by_env(&self, env: &EnvPath) -> Result<ConfigMap> {
        Ok(self.read_mapping(&self.view_path(env))?.1)
    }

    /// Point `hostname` at `env`'s view. The environment is not checked.
    pub fn assoc_host(&self, hostname: &str, env: &EnvPath) -> Result<()> {
        self.associations.set(hostname, &self.view_path(env))?;
        info!(service = %self.service, host = %hostname, env = %env, "host associated");
        Ok(())
    }

    /// Hostnames associated with `env`, sorted. Always `None` for root.
    pub fn get_associations(&self, env: &EnvPath) -> Result<Option<Vec<String>>> {
        if env.is_root() {
            return Ok(None);
        }

        let dest = self.view_path(env);
        let hosts = self
            .associations
            .get_all()?
            .into_iter()
            .filter(|(_, d)| *d == dest)
            .map(|(host, _)| host)
            .collect();
        Ok(Some(hosts))
    }

    /// Full hostname -> view path map.
    pub fn get_all_associations(&self) -> Result<Associations> {
        self.associations.get_all()
    }

    pub fn delete_association(&self, hostname: &str) -> Result<()> {
        self.associations.delete(hostname)?;
        info!(service = %self.service, host = %hostname, "association deleted");
        Ok(())
    }

    /// Whether the service has a root config.
    pub fn exists(&self) -> Result<bool> {
        self.store.exists(&self.conf_path(&EnvPath::root()))
    }

    /// Remove the whole service subtree.
    pub fn delete_all(&self) -> Result<()> {
        self.store.delete(&self.root, None, true)?;
        warn!(service = %self.service, "service deleted");
        Ok(())
    }

    /// Descendants of `env`, relative to it, pre-order. `env` itself is
    /// excluded.
    pub fn get_child_envs(&self, env: &EnvPath) -> Result<Vec<EnvPath>> {
        Ok(self
            .descendants(env)?
            .into_iter()
            .filter_map(|d| d.relative_to(env))
            .filter(|rel| !rel.is_root())
            .collect())
    }

    /// Every configured environment, pre-order from root.
    pub fn list_envs(&self) -> Result<Vec<EnvPath>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        self.descendants(&EnvPath::root())
    }

    /// Recompute the views of `env` and its descendants without touching any
    /// config. Resumes a cascade that stopped partway.
    pub fn refresh_views(&self, env: &EnvPath) -> Result<()> {
        self.cascade(env)
    }

    /// Dump every environment with its config, view and the associations.
    pub fn export(&self) -> Result<ServiceSnapshot> {
        let mut envs = Vec::new();
        for env in self.list_envs()? {
            let (version, config) = self.get_config_by_env(&env)?;
            let view = match self.get_view_by_env(&env) {
                Ok(view) => Some(view),
                Err(err) if err.is(ErrorCode::NotFound) || err.is(ErrorCode::MalformedData) => {
                    None
                }
                Err(err) => return Err(err),
            };
            envs.push(EnvSnapshot {
                env,
                version,
                config,
                view,
            });
        }

        let associations = if self.store.exists(self.associations.path())? {
            self.associations.get_all()?
        } else {
            Associations::new()
        };

        Ok(ServiceSnapshot {
            service: self.service.clone(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            envs,
            associations,
        })
    }

    /// `env` and all configured environments below it, pre-order.
    fn descendants(&self, env: &EnvPath) -> Result<Vec<EnvPath>> {
        let base = self.conf_path(env);
        self.store
            .walk(&base)?
            .iter()
            .map(|path| self.env_for_conf_path(path))
            .collect()
    }

    fn env_for_conf_path(&self, path: &str) -> Result<EnvPath> {
        let rel = path
            .strip_prefix(&self.conf_root)
            .map(|rest| rest.trim_start_matches('/'))
            .ok_or_else(|| {
                JonesError::internal(format!("{} is outside {}", path, self.conf_root))
            })?;
        EnvPath::new(rel)
    }

    /// Recompute the view of `env` and every descendant, in pre-order.
    fn cascade(&self, env: &EnvPath) -> Result<()> {
        let targets = self.descendants(env)?;
        let total = targets.len();

        for (done, target) in targets.iter().enumerate() {
            if let Err(err) = self.update_view(target) {
                warn!(
                    service = %self.service,
                    env = %target,
                    updated = done,
                    total,
                    error = %err,
                    "view cascade stopped"
                );
                return Err(err);
            }
        }

        info!(service = %self.service, env = %env, views = total, "views recomputed");
        Ok(())
    }

    /// Merge configs from root down to `env`.
    fn flatten_from_root(&self, env: &EnvPath) -> Result<ConfigMap> {
        let mut data = ConfigMap::new();
        for ancestor in env.ancestors() {
            let (_, conf) = self.get_config_by_env(&ancestor)?;
            overlay(&mut data, conf);
        }
        Ok(data)
    }

    fn update_view(&self, env: &EnvPath) -> Result<()> {
        let dest = self.view_path(env);
        if !self.store.exists(&dest)? {
            self.store.ensure_path(&dest)?;
        }

        // Version read before merging so a racing writer makes us fail, not clobber
        let (_, stat) = self.store.get(&dest)?;
        let view = self.flatten_from_root(env)?;
        self.store
            .set(&dest, &serde_json::to_vec(&view)?, Some(stat.version))?;
        debug!(service = %self.service, env = %env, keys = view.len(), "view written");
        Ok(())
    }

    fn read_mapping(&self, path: &str) -> Result<(Version, ConfigMap)> {
        let (raw, stat) = self.store.get(path)?;
        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok((stat.version, map)),
            Ok(other) => Err(JonesError::malformed(
                path,
                format!("expected a mapping, found {}", value_kind(&other)),
            )),
            Err(err) => Err(JonesError::malformed(path, err)),
        }
    }
}
