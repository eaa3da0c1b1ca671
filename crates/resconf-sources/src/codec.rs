//! Config file codecs.
//!
//! Every format decodes into a literal [`NestedMap`]: nesting in the file is
//! the nesting of the tree, and a key containing a dot stays one segment.
//!
//! INI files hold at most two levels. Sections become the first level and
//! their options become string leaves; options before any section header
//! are top-level leaves.

use crate::error::{SourceError, SourceResult};
use ini::Ini;
use resconf_core::{KeyPath, NestedMap, Node, Value};
use std::path::Path;

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ini,
    Json,
    Toml,
    Yaml,
}

impl Format {
    /// Infer the format from a file extension (`ini`, `json`, `toml`, `yaml`, `yml`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ini" => Some(Format::Ini),
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> SourceResult<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
            .ok_or_else(|| SourceError::UnsupportedFormat(path.to_path_buf()))
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ini => "ini",
            Format::Json => "json",
            Format::Toml => "toml",
            Format::Yaml => "yaml",
        }
    }

    /// Decode `input`. Blank input yields an empty map; a document whose
    /// top level is not a mapping is rejected.
    pub fn load(self, input: &str) -> SourceResult<NestedMap> {
        if input.trim().is_empty() {
            return Ok(NestedMap::new());
        }
        let value = match self {
            Format::Ini => return ini_load(input),
            Format::Json => serde_json::from_str::<Value>(input)?,
            Format::Toml => toml_to_json(toml::Value::Table(toml::from_str::<toml::Table>(input)?)),
            Format::Yaml => match serde_yaml::from_str::<Value>(input)? {
                Value::Null => return Ok(NestedMap::new()),
                value => value,
            },
        };
        Ok(NestedMap::try_from(value)?)
    }

    /// Encode `map` as a document in this format.
    pub fn dump(self, map: &NestedMap) -> SourceResult<String> {
        let text = match self {
            Format::Ini => ini_dump(map)?,
            Format::Json => {
                let mut text = serde_json::to_string_pretty(map)?;
                text.push('\n');
                text
            }
            Format::Toml => toml::to_string(map)?,
            Format::Yaml => serde_yaml::to_string(map)?,
        };
        Ok(text)
    }
}

fn ini_load(input: &str) -> SourceResult<NestedMap> {
    let ini = Ini::load_from_str(input)?;
    let mut map = NestedMap::new();
    for (section, props) in ini.iter() {
        let target = match section {
            None => &mut map,
            Some(name) => {
                if !matches!(map.get_entry(name), Some(Node::Map(_))) {
                    map.insert(name, NestedMap::new());
                }
                match map.get_entry_mut(name) {
                    Some(Node::Map(sub)) => sub,
                    _ => continue,
                }
            }
        };
        for (key, value) in props.iter() {
            target.insert(key, Value::String(value.to_string()));
        }
    }
    Ok(map)
}

fn ini_dump(map: &NestedMap) -> SourceResult<String> {
    let mut ini = Ini::new();
    for (key, node) in map {
        match node {
            Node::Leaf(value) => {
                ini.with_general_section().set(key.as_str(), ini_text(value));
            }
            Node::Map(section) => {
                let props = ini.entry(Some(key.clone())).or_insert_with(Default::default);
                for (option, child) in section {
                    match child {
                        Node::Leaf(value) => {
                            props.insert(option.as_str(), ini_text(value));
                        }
                        Node::Map(_) => {
                            return Err(SourceError::IniNesting(KeyPath::from_segments([key, option])))
                        }
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    ini.write_to(&mut out).map_err(SourceError::IniWrite)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

// Strings are written bare, `null` as an empty value, everything else as JSON.
fn ini_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// TOML datetimes become RFC 3339 strings; the `Datetime` cast reads them back.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}
