//! Environment variables as a config source.

use crate::keypath::{self, KeyPath, DEFAULT_SEPARATOR};
use crate::parser::{ConfigFormat, TreeParser};
use crate::ConfigError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A frozen view of environment variables.
///
/// Loads read the environment through a snapshot so that every stage of one
/// load sees the same values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment (non-UTF-8 entries skipped).
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Value of `name`, if set.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// All variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of captured variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Which variables an environment source collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSelector {
    /// Every variable.
    All,
    /// Exactly these names; unset names are skipped.
    Names(Vec<String>),
    /// Names matching any of these glob patterns (e.g. `APP_*`).
    Matching(Vec<String>),
}

/// Options for an environment source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSource {
    /// Variables to collect.
    pub selector: EnvSelector,
    /// Parse values naming an existing config file into subtrees.
    pub expand_files: bool,
    /// Split names on `__` into nested maps.
    pub nest_keys: bool,
}

impl EnvSource {
    /// Source collecting `selector`, with values kept as plain strings.
    pub fn new(selector: EnvSelector) -> Self {
        Self {
            selector,
            expand_files: false,
            nest_keys: false,
        }
    }

    /// See [`EnvSource::expand_files`].
    pub fn with_expand_files(mut self, expand: bool) -> Self {
        self.expand_files = expand;
        self
    }

    /// See [`EnvSource::nest_keys`].
    pub fn with_nest_keys(mut self, nest: bool) -> Self {
        self.nest_keys = nest;
        self
    }

    /// Short description used in logs and errors.
    pub fn describe(&self) -> String {
        match &self.selector {
            EnvSelector::All => "env(all)".to_string(),
            EnvSelector::Names(names) => format!("env({})", names.join(",")),
            EnvSelector::Matching(patterns) => format!("env(~{})", patterns.join(",")),
        }
    }

    /// Collect the selected variables into a tree.
    pub fn collect(
        &self,
        env: &EnvSnapshot,
        parser: &dyn TreeParser,
    ) -> Result<Value, ConfigError> {
        let matcher = match &self.selector {
            EnvSelector::Matching(patterns) => Some(build_globset(patterns)?),
            _ => None,
        };
        let mut tree = Value::Object(Map::new());
        for (name, raw) in env.iter() {
            let selected = match &self.selector {
                EnvSelector::All => true,
                EnvSelector::Names(names) => names.iter().any(|candidate| candidate == name),
                EnvSelector::Matching(_) => matcher.as_ref().is_some_and(|set| set.is_match(name)),
            };
            if !selected {
                continue;
            }
            let value = if self.expand_files {
                expand_file_value(raw, parser)?
            } else {
                Value::String(raw.to_string())
            };
            let path = if self.nest_keys {
                KeyPath::parse(name, DEFAULT_SEPARATOR, false)
            } else {
                KeyPath::from_segments([name])
            };
            match path {
                Ok(path) => {
                    if let Some(key) = nesting_conflict(&tree, &path) {
                        warn!(
                            "env var replaces an earlier value at nested key (name={name}, key={key})"
                        );
                    }
                    keypath::set(&mut tree, &path, value)
                }
                Err(_) => debug!("skipping env var without usable key (name={name})"),
            }
        }
        Ok(tree)
    }
}

/// Key whose existing value setting `path` would replace with a different shape:
/// a scalar on the way down, or a map at the end of the path.
fn nesting_conflict(tree: &Value, path: &KeyPath) -> Option<String> {
    let mut node = tree;
    let last = path.len() - 1;
    for (depth, segment) in path.segments().iter().enumerate() {
        let child = node.get(segment)?;
        if (depth < last) != child.is_object() {
            return Some(path.segments()[..=depth].join(DEFAULT_SEPARATOR));
        }
        node = child;
    }
    None
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| ConfigError::InvalidPattern(err.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| ConfigError::InvalidPattern(err.to_string()))
}

/// Parse `raw` as a config file when it names one; otherwise keep the text.
fn expand_file_value(raw: &str, parser: &dyn TreeParser) -> Result<Value, ConfigError> {
    let path = Path::new(raw.trim());
    let Some(format) = ConfigFormat::from_path(path) else {
        return Ok(Value::String(raw.to_string()));
    };
    if !path.is_file() {
        return Ok(Value::String(raw.to_string()));
    }
    debug!("expanding env value from file (path={})", path.display());
    let contents = std::fs::read_to_string(path)?;
    parser.parse(&contents, format)
}
