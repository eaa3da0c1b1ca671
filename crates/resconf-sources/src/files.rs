//! Reading and writing config files.

use crate::codec::Format;
use crate::error::{SourceError, SourceResult};
use resconf_core::merge::merge_into;
use resconf_core::{ConfigStore, NestedMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Expand a leading `~` to the value of `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Load one file, choosing the codec from its extension.
pub fn load_file(path: impl AsRef<Path>) -> SourceResult<NestedMap> {
    let path = expand_home(path.as_ref());
    let format = Format::from_path(&path)?;
    let text = std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
        path: path.clone(),
        source,
    })?;
    let map = format.load(&text)?;
    debug!(path = %path.display(), ?format, keys = map.len(), "loaded config file");
    Ok(map)
}

/// Write `map` to a file, choosing the codec from its extension.
pub fn save_file(path: impl AsRef<Path>, map: &NestedMap) -> SourceResult<()> {
    let path = expand_home(path.as_ref());
    let text = Format::from_path(&path)?.dump(map)?;
    std::fs::write(&path, text).map_err(|source| SourceError::Io {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "saved config file");
    Ok(())
}

/// Read config from a list of candidate files.
///
/// With `merge`, every existing file is read, last to first, and deep-merged,
/// so earlier paths take precedence. Without it, only the first existing
/// file is read. Missing files are skipped.
pub fn read_files<P: AsRef<Path>>(paths: &[P], merge: bool) -> SourceResult<NestedMap> {
    let mut out = NestedMap::new();
    let mut found = false;

    let ordered: Vec<&P> = if merge {
        paths.iter().rev().collect()
    } else {
        paths.iter().collect()
    };
    for path in ordered {
        let expanded = expand_home(path.as_ref());
        if !expanded.is_file() {
            debug!(path = %expanded.display(), "config file not found, skipping");
            continue;
        }
        merge_into(&mut out, load_file(&expanded)?);
        found = true;
        if !merge {
            break;
        }
    }

    if !found && !paths.is_empty() {
        warn!(count = paths.len(), "none of the config files exist");
    }
    Ok(out)
}

/// File helpers for [`ConfigStore`].
pub trait StoreFileExt {
    /// `update` the store from one file.
    fn update_from_file(&mut self, path: impl AsRef<Path>) -> SourceResult<()>;

    /// `update` the store from [`read_files`].
    fn update_from_files<P: AsRef<Path>>(&mut self, paths: &[P], merge: bool) -> SourceResult<()>;

    /// Write the current config to a file.
    fn save_to_file(&self, path: impl AsRef<Path>) -> SourceResult<()>;
}

impl StoreFileExt for ConfigStore {
    fn update_from_file(&mut self, path: impl AsRef<Path>) -> SourceResult<()> {
        let map = load_file(path)?;
        self.update(map)?;
        Ok(())
    }

    fn update_from_files<P: AsRef<Path>>(&mut self, paths: &[P], merge: bool) -> SourceResult<()> {
        let map = read_files(paths, merge)?;
        self.update(map)?;
        Ok(())
    }

    fn save_to_file(&self, path: impl AsRef<Path>) -> SourceResult<()> {
        save_file(path, self.as_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(
            expand_home(Path::new("~/conf/app.toml")),
            PathBuf::from(home).join("conf/app.toml")
        );
        assert_eq!(expand_home(Path::new("/etc/app.toml")), PathBuf::from("/etc/app.toml"));
        assert_eq!(expand_home(Path::new("a/~/b")), PathBuf::from("a/~/b"));
    }

    #[test]
    fn test_read_files_with_no_existing_file() {
        let map = read_files(&["/nonexistent/a.json", "/nonexistent/b.toml"], true).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_load_file_unsupported_extension() {
        assert!(matches!(
            load_file("/nonexistent/app.cfg"),
            Err(SourceError::UnsupportedFormat(_))
        ));
    }
}
