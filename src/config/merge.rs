//! Deep merge for tiered tool configuration.
//!
//! Used only for the tool's own YAML tiers. Environment views use the shallow
//! overlay in [`crate::service::overlay`].

use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects merge key by key, recursively
/// - Any other value in `overlay` replaces `base`
/// - A null in `overlay` keeps `base` (the tier left it unset)
///
/// # Example
/// ```
/// use serde_json::json;
/// use jones::config::deep_merge;
///
/// let defaults = json!({"store": {"db_path": "jones/jones.db", "services_root": "/services"}});
/// let user = json!({"store": {"services_root": "/jones"}});
/// let merged = deep_merge(defaults, user);
/// assert_eq!(merged["store"]["db_path"], "jones/jones.db");
/// assert_eq!(merged["store"]["services_root"], "/jones");
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge tiers in order, later tiers winning.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
