//! Environment variable overrides.
//!
//! Each leaf key of the default config maps to one variable:
//! `server.port` with prefix `APP_` reads `APP_SERVER_PORT`. Values arrive
//! as strings; register casts to normalize them.

use resconf_core::{ConfigResult, KeyPath, NestedMap, Node, Value};
use std::collections::HashMap;

/// The variable name for `path`.
pub fn env_key(prefix: &str, path: &KeyPath) -> String {
    format!("{prefix}{}", path.join("_").to_uppercase())
}

/// Collect overrides for the leaf keys of `default` from the process
/// environment.
pub fn from_env(default: &NestedMap, prefix: &str) -> ConfigResult<NestedMap> {
    from_vars(default, prefix, std::env::vars())
}

/// Collect overrides for the leaf keys of `default` from `vars`.
pub fn from_vars<I, K, V>(default: &NestedMap, prefix: &str, vars: I) -> ConfigResult<NestedMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars: HashMap<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    let mut out = NestedMap::new();
    for path in default.allkeys() {
        if let Some(value) = vars.get(&env_key(prefix, &path)) {
            out.set(path, Node::Leaf(Value::String(value.clone())), true)?;
        }
    }
    Ok(out)
}
