//! IO helpers for reading file-backed sources.

use crate::parser::TreeParser;
use crate::ConfigError;
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Read and parse a config file.
pub(super) fn read_tree(path: &Path, parser: &dyn TreeParser) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingSource {
            path: path.to_path_buf(),
        });
    }
    debug!("loading config source (path={})", path.display());
    let contents = fs::read_to_string(path)?;
    parser.parse_path(&contents, path)
}

/// Errors that an optional source turns into a warning.
pub(super) fn is_skippable(err: &ConfigError) -> bool {
    matches!(
        err,
        ConfigError::MissingSource { .. } | ConfigError::ParseFailed { .. }
    )
}

/// Wrap `value` as `{section: value}`.
pub(super) fn nest_value(section: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(section.to_string(), value);
    Value::Object(map)
}
