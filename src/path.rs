//! Dot-separated field paths into messages.
//!
//! Filter criteria and Map both address nested values with paths such as
//! `config.gateway`. Navigation is an iterative walk: every step must land on an
//! object holding the next segment.

use std::fmt;

use serde_json::Value;

/// A path to a field in a message
///
/// # Examples
///
/// - `name` - top-level field
/// - `config.gateway` - field `gateway` of the object under `config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<String>,
}

impl FieldPath {
    /// Parse a field path with a given delimiter.
    ///
    /// Empty segments are kept: `a..b` addresses the key `""` under `a`.
    pub fn parse(path: &str, delimiter: &str) -> Self {
        Self {
            raw: path.to_string(),
            segments: path.split(delimiter).map(str::to_string).collect(),
        }
    }

    /// Create a field path from a dotted string (common format)
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }

    /// Resolve this path against `message`.
    ///
    /// # Returns
    /// `Some(value)` if every segment was found, `None` if navigation failed
    /// because an intermediate value is not an object or lacks the key.
    pub fn resolve<'a>(&self, message: &'a Value) -> Option<&'a Value> {
        dive(message, &self.segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Walk `selectors` down from `data`.
///
/// An empty selector list resolves to `data` itself.
pub fn dive<'a, S: AsRef<str>>(data: &'a Value, selectors: &[S]) -> Option<&'a Value> {
    let mut current = data;
    for selector in selectors {
        current = current.as_object()?.get(selector.as_ref())?;
    }
    Some(current)
}
