//! Key paths and the accessor operations that walk a config tree with them.
//!
//! A key path addresses map keys only; list indexing (`a[0].b`) is not
//! supported and such a segment is treated as a literal key.

use crate::ConfigError;
use log::debug;
use serde_json::{Map, Value};
use std::fmt;

/// Default segment separator for key paths.
pub const DEFAULT_SEPARATOR: &str = "__";
/// Separator tried when the primary separator does not occur in a path.
pub const DOT_SEPARATOR: &str = ".";

/// An ordered, non-empty list of map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
    separator: String,
}

impl KeyPath {
    /// Parse with the default separator and dot fallback.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        Self::parse(path, DEFAULT_SEPARATOR, true)
    }

    /// Parse a path string, dropping empty segments.
    ///
    /// When `path` does not contain `separator` and `dot_fallback` is set,
    /// the path is split on `"."` instead.
    pub fn parse(path: &str, separator: &str, dot_fallback: bool) -> Result<Self, ConfigError> {
        let use_dot = dot_fallback && separator != DOT_SEPARATOR && !path.contains(separator);
        let split_on = if use_dot || separator.is_empty() {
            DOT_SEPARATOR
        } else {
            separator
        };
        let segments: Vec<String> = path
            .split(split_on)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(ConfigError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(Self {
            segments,
            separator: separator.to_string(),
        })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments
            .into_iter()
            .map(Into::into)
            .filter(|segment: &String| !segment.trim().is_empty())
            .collect();
        if segments.is_empty() {
            return Err(ConfigError::InvalidPath {
                path: String::new(),
            });
        }
        Ok(Self {
            segments,
            separator: DEFAULT_SEPARATOR.to_string(),
        })
    }

    /// Segments in root-to-leaf order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; at least one for a parsed path.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Never true for a parsed path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final segment of the path.
    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Path without its final segment, or `None` for a single segment.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            separator: self.separator.clone(),
        })
    }

    /// Return a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            segments,
            separator: self.separator.clone(),
        }
    }

    /// Append a segment in place.
    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(&self.separator))
    }
}

/// Return the value at `path`, or `None` if any step is missing or not a map.
pub fn lookup<'a>(tree: &'a Value, path: &KeyPath) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn lookup_mut<'a>(tree: &'a mut Value, path: &KeyPath) -> Option<&'a mut Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = node.as_object_mut()?.get_mut(segment)?;
    }
    Some(node)
}

/// Return a copy of the value at `path`, or `default` when absent.
pub fn get(tree: &Value, path: &KeyPath, default: Value) -> Value {
    lookup(tree, path).cloned().unwrap_or(default)
}

/// Return a copy of the value at `path`, failing with `MissingPath`.
pub fn get_strict(tree: &Value, path: &KeyPath) -> Result<Value, ConfigError> {
    lookup(tree, path)
        .cloned()
        .ok_or_else(|| ConfigError::MissingPath {
            path: path.to_string(),
            at: None,
        })
}

/// Whether a value exists at `path`.
pub fn exists(tree: &Value, path: &KeyPath) -> bool {
    lookup(tree, path).is_some()
}

/// Walk to the parent map of `path`, creating maps along the way.
///
/// Non-map intermediates (including a non-map root) are replaced by empty maps.
fn parent_map_mut<'a>(tree: &'a mut Value, path: &KeyPath) -> &'a mut Map<String, Value> {
    let mut node = tree;
    let parents = &path.segments()[..path.len() - 1];
    for segment in parents {
        let map = force_map(node, segment);
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    force_map(node, path.last())
}

fn force_map<'a>(node: &'a mut Value, segment: &str) -> &'a mut Map<String, Value> {
    if !node.is_object() {
        debug!("replacing non-map node with map (segment={segment})");
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with a map"),
    }
}

/// Set `value` at `path`, creating intermediate maps as needed.
pub fn set(tree: &mut Value, path: &KeyPath, value: Value) {
    parent_map_mut(tree, path).insert(path.last().to_string(), value);
}

/// Remove and return the value at `path`.
pub fn take(tree: &mut Value, path: &KeyPath) -> Option<Value> {
    let parent = match path.parent() {
        Some(parent) => lookup_mut(tree, &parent)?,
        None => tree,
    };
    parent.as_object_mut()?.remove(path.last())
}

/// Delete the value at `path`.
///
/// With `ignore_missing=false` an absent path is a `MissingPath` error.
pub fn delete(tree: &mut Value, path: &KeyPath, ignore_missing: bool) -> Result<(), ConfigError> {
    match take(tree, path) {
        Some(_) => Ok(()),
        None if ignore_missing => Ok(()),
        None => Err(ConfigError::MissingPath {
            path: path.to_string(),
            at: None,
        }),
    }
}

/// Return the value at `path`, inserting `factory()` first when absent.
pub fn ensure<'a, F>(tree: &'a mut Value, path: &KeyPath, factory: F) -> &'a mut Value
where
    F: FnOnce() -> Value,
{
    parent_map_mut(tree, path)
        .entry(path.last().to_string())
        .or_insert_with(factory)
}
