//! Command-line argument overrides.
//!
//! [`ArgMap`] adds one long option per leaf key of the default config to a
//! `clap` command: `server.port` becomes `--server-port`, or
//! `--app-server-port` with the prefix `app`. After parsing, only options
//! actually given on the command line are collected into a [`NestedMap`].

use clap::parser::ValueSource;
use clap::{Arg, ArgMatches, Command};
use resconf_core::{ConfigResult, KeyPath, NestedMap, Node, Value};
use std::collections::HashSet;
use tracing::debug;

/// Maps config keys to long command-line options and back.
#[derive(Debug, Clone, Default)]
pub struct ArgMap {
    prefix: Option<String>,
    ignore: HashSet<KeyPath>,
    keymap: Vec<(String, KeyPath)>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to every generated option name.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Do not generate an option for `key`.
    pub fn ignore(mut self, key: impl Into<KeyPath>) -> Self {
        self.ignore.insert(key.into());
        self
    }

    /// Read the argument with id `arg_id`, defined by the caller, into `key`.
    /// The argument must hold a `String` value.
    pub fn keymap(mut self, arg_id: impl Into<String>, key: impl Into<KeyPath>) -> Self {
        self.keymap.push((arg_id.into(), key.into()));
        self
    }

    /// The long option name (without `--`) for `path`.
    pub fn long_name(&self, path: &KeyPath) -> String {
        let name = path.join("-");
        match &self.prefix {
            Some(prefix) => format!("{prefix}-{name}"),
            None => name,
        }
    }

    fn options<'a>(&'a self, default: &'a NestedMap) -> impl Iterator<Item = (String, KeyPath)> + 'a {
        default
            .allkeys()
            .filter(move |path| !self.ignore.contains(path))
            .filter(|path| path.segments().iter().all(|s| !s.is_empty()))
            .map(move |path| (self.long_name(&path), path))
    }

    /// Add an option for every leaf key of `default` to `cmd`. Keys whose
    /// option name is already taken are skipped.
    pub fn augment(&self, mut cmd: Command, default: &NestedMap) -> Command {
        for (long, path) in self.options(default) {
            let taken = cmd
                .get_arguments()
                .any(|arg| arg.get_id() == long.as_str() || arg.get_long() == Some(long.as_str()));
            if taken || long == "help" || long == "version" {
                debug!(option = %long, key = %path, "option name taken, skipping");
                continue;
            }
            let current = default
                .get(&path)
                .map(|node| node.to_value().to_string())
                .unwrap_or_default();
            cmd = cmd.arg(
                Arg::new(long.clone())
                    .long(long)
                    .value_name("VALUE")
                    .help(format!("Override '{path}' (default: {current})"))
                    .help_heading("Config"),
            );
        }
        cmd
    }

    /// Collect the options given on the command line into a nested map.
    /// Keymapped arguments are applied last and only for keys in `default`.
    pub fn collect(&self, matches: &ArgMatches, default: &NestedMap) -> ConfigResult<NestedMap> {
        let mapped = self
            .keymap
            .iter()
            .filter(|(_, key)| default.contains(key))
            .cloned();

        let mut out = NestedMap::new();
        for (id, path) in self.options(default).chain(mapped) {
            if let Some(value) = given_value(matches, &id) {
                out.set(path, Node::Leaf(value), true)?;
            }
        }
        Ok(out)
    }
}

fn given_value(matches: &ArgMatches, id: &str) -> Option<Value> {
    let value = matches.try_get_one::<String>(id).ok().flatten()?;
    (matches.value_source(id) == Some(ValueSource::CommandLine)).then(|| Value::String(value.clone()))
}
