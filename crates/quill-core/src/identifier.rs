//! Dotted names.

use std::fmt;

/// A dotted name such as `Std.Console` or `Write`.
///
/// Segments are compared one by one; `A.B` and `A.B` built from different
/// sources are the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Identifier {
    segments: Vec<String>,
}

impl Identifier {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a dotted path. Empty segments are dropped.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('.').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether this is a plain name without a namespace qualifier.
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    /// Whether `prefix` is a strict leading part of this identifier.
    pub fn has_proper_prefix(&self, prefix: &Identifier) -> bool {
        prefix.len() < self.len() && self.segments.starts_with(&prefix.segments)
    }

    /// The segments that follow `prefix`, or `None` if `prefix` is not a
    /// strict leading part.
    pub fn strip_prefix(&self, prefix: &Identifier) -> Option<Identifier> {
        self.has_proper_prefix(prefix).then(|| Identifier {
            segments: self.segments[prefix.len()..].to_vec(),
        })
    }

    /// Segments joined with `sep`.
    pub fn join(&self, sep: &str) -> String {
        self.segments.join(sep)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join("."))
    }
}

impl From<&str> for Identifier {
    fn from(path: &str) -> Self {
        Identifier::parse(path)
    }
}

impl From<String> for Identifier {
    fn from(path: String) -> Self {
        Identifier::parse(&path)
    }
}
