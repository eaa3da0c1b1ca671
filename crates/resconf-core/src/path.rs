//! Key path parsing.
//!
//! Config keys are dot-separated strings like "server.http.port", or an
//! explicit list of segments. A dot preceded by a backslash (`\.`) is part of
//! the segment, so "hosts.db\.local" addresses the key "db.local" under
//! "hosts". A doubled backslash (`\\`) is one literal backslash.

use std::fmt::{self, Write};

/// A parsed config key path.
///
/// Segments are stored unescaped; [`fmt::Display`] re-escapes literal dots and
/// backslashes so the dotted form always parses back to the same segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The empty path, addressing the whole tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted key, honoring `\.` and `\\` escapes. Any other
    /// backslash is kept as is.
    pub fn parse(key: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = key.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some('.' | '\\')) => {
                    current.extend(chars.next());
                }
                '.' => segments.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        segments.push(current);

        Self { segments }
    }

    /// Build a path from pre-split segments. Segments are taken literally.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Get the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    /// The first `len` segments.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    /// Check if this path starts with a given prefix.
    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        if prefix.segments.len() > self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(prefix.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// Join the raw segments with `sep`, without escaping.
    ///
    /// Used to derive environment variable names and option names.
    pub fn join(&self, sep: &str) -> String {
        self.segments.join(sep)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            for c in segment.chars() {
                if matches!(c, '.' | '\\') {
                    f.write_char('\\')?;
                }
                f.write_char(c)?;
            }
        }
        Ok(())
    }
}

impl From<&str> for KeyPath {
    fn from(s: &str) -> Self {
        KeyPath::parse(s)
    }
}

impl From<String> for KeyPath {
    fn from(s: String) -> Self {
        KeyPath::parse(&s)
    }
}

impl From<&String> for KeyPath {
    fn from(s: &String) -> Self {
        KeyPath::parse(s)
    }
}

impl From<&KeyPath> for KeyPath {
    fn from(path: &KeyPath) -> Self {
        path.clone()
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(segments: [&str; N]) -> Self {
        KeyPath::from_segments(segments)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(segments: Vec<&str>) -> Self {
        KeyPath::from_segments(segments)
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}
