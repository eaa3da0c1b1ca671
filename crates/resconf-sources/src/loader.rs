//! Layered config loading.
//!
//! Precedence, lowest first: defaults, files, environment, arguments.
//! Environment and argument overrides only apply to keys that exist in the
//! defaults. An override is skipped when a file has replaced one of its
//! parent maps with a plain value.

use crate::env;
use crate::error::SourceResult;
use crate::files::read_files;
use resconf_core::merge::merge_into;
use resconf_core::{ConfigError, ConfigStore, ConfigStoreBuilder, NestedMap};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
enum EnvSource {
    Disabled,
    Process(String),
    Vars(String, HashMap<String, String>),
}

/// Builds the initial config of a store from layered sources.
#[derive(Debug, Clone)]
pub struct Loader {
    default: NestedMap,
    files: Vec<PathBuf>,
    merge_files: bool,
    env: EnvSource,
    args: NestedMap,
}

impl Loader {
    pub fn new(default: NestedMap) -> Self {
        Self {
            default,
            files: Vec::new(),
            merge_files: false,
            env: EnvSource::Disabled,
            args: NestedMap::new(),
        }
    }

    /// Candidate config files, see [`read_files`].
    pub fn files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Merge all existing files instead of reading only the first one.
    pub fn merge_files(mut self, merge: bool) -> Self {
        self.merge_files = merge;
        self
    }

    /// Read overrides from the process environment, with `prefix` prepended
    /// to every variable name.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = EnvSource::Process(prefix.into());
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn env_vars<I, K, V>(mut self, prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.env = EnvSource::Vars(prefix.into(), vars);
        self
    }

    /// Argument overrides, typically from [`ArgMap::collect`](crate::ArgMap::collect).
    pub fn args(mut self, args: NestedMap) -> Self {
        self.args = args;
        self
    }

    pub fn default_config(&self) -> &NestedMap {
        &self.default
    }

    /// Compose the layered config without touching any store.
    pub fn prepare(&self) -> SourceResult<NestedMap> {
        let mut config = self.default.clone();

        if !self.files.is_empty() {
            merge_into(&mut config, read_files(self.files.as_slice(), self.merge_files)?);
        }

        let env = match &self.env {
            EnvSource::Disabled => NestedMap::new(),
            EnvSource::Process(prefix) => env::from_env(&self.default, prefix)?,
            EnvSource::Vars(prefix, vars) => env::from_vars(&self.default, prefix, vars.clone())?,
        };

        let mut overrides = 0;
        for path in self.default.allkeys() {
            for layer in [&env, &self.args] {
                let Ok(node) = layer.get(&path) else {
                    continue;
                };
                match config.set(&path, node.clone(), true) {
                    Ok(_) => overrides += 1,
                    Err(ConfigError::TypeMismatch(at)) => {
                        debug!(key = %path, blocked_by = %at, "skipping override below a plain value");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        debug!(files = self.files.len(), overrides, "prepared layered config");
        Ok(config)
    }

    /// Replace the current config of `store` with the layered config.
    pub fn load(&self, store: &mut ConfigStore) -> SourceResult<()> {
        let config = self.prepare()?;
        store.replace(config)?;
        Ok(())
    }

    /// Build a store from `builder` with these defaults, then load the
    /// layered config into it. Watchers registered on `builder` observe
    /// the load.
    pub fn build(&self, builder: ConfigStoreBuilder) -> SourceResult<ConfigStore> {
        let mut store = builder
            .defaults(self.default.clone())
            .load_on_init(false)
            .build()?;
        self.load(&mut store)?;
        Ok(store)
    }
}
