//! The config tree container.
//!
//! `ConfigTree` wraps a map-rooted `serde_json::Value` and exposes accessor,
//! merge, override, and normalization operations over it. Normalizing
//! operations are pure visits that build a new tree rather than mutating
//! nodes while walking them.

use crate::keypath::{self, KeyPath};
use crate::merge;
use crate::overrides::{self, OverrideOutcome};
use crate::policy::{KeyCase, MergePolicy, NormalizePolicy, OverridePolicy};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Placeholder path used in errors about the tree root.
pub(crate) const ROOT_PATH: &str = "<root>";

/// A nested, string-keyed configuration map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ConfigTree {
    root: Value,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Value> for ConfigTree {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<ConfigTree> for Value {
    fn from(tree: ConfigTree) -> Self {
        tree.root
    }
}

impl From<Map<String, Value>> for ConfigTree {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(map),
        }
    }
}

impl ConfigTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wrap a value; the root must be a map.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(_) => Ok(Self { root: value }),
            _ => Err(ConfigError::NotAMap {
                path: ROOT_PATH.to_string(),
            }),
        }
    }

    /// The tree as a JSON value; always an object.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Consume the tree into its root value.
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Root map of the tree.
    pub fn as_map(&self) -> &Map<String, Value> {
        match &self.root {
            Value::Object(map) => map,
            _ => unreachable!("config tree root is always a map"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_map().is_empty()
    }

    /// Top-level keys in display order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.as_map().keys()
    }

    /// Borrow the value at a parsed path.
    pub fn lookup(&self, path: &KeyPath) -> Option<&Value> {
        keypath::lookup(&self.root, path)
    }

    /// Value at `path`, or `default` when absent.
    pub fn get(&self, path: &str, default: Value) -> Result<Value, ConfigError> {
        Ok(keypath::get(&self.root, &KeyPath::new(path)?, default))
    }

    /// Value at `path`, failing with `MissingPath` when absent.
    pub fn get_strict(&self, path: &str) -> Result<Value, ConfigError> {
        keypath::get_strict(&self.root, &KeyPath::new(path)?)
    }

    /// Whether any value, including `null`, is stored at `path`.
    pub fn exists(&self, path: &str) -> Result<bool, ConfigError> {
        Ok(keypath::exists(&self.root, &KeyPath::new(path)?))
    }

    /// Set a value, creating intermediate maps.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), ConfigError> {
        keypath::set(&mut self.root, &KeyPath::new(path)?, value);
        Ok(())
    }

    /// Remove the value at `path`; see [`keypath::delete`].
    pub fn delete(&mut self, path: &str, ignore_missing: bool) -> Result<(), ConfigError> {
        keypath::delete(&mut self.root, &KeyPath::new(path)?, ignore_missing)
    }

    /// Existing value at `path`, or the one produced by `factory`.
    pub fn ensure<F>(&mut self, path: &str, factory: F) -> Result<&mut Value, ConfigError>
    where
        F: FnOnce() -> Value,
    {
        let path = KeyPath::new(path)?;
        Ok(keypath::ensure(&mut self.root, &path, factory))
    }

    /// Merge `patch` according to `policy`.
    ///
    /// With `policy.inplace` the receiver is updated and a copy of it is
    /// returned; otherwise the receiver is left untouched.
    pub fn merge(&mut self, patch: &ConfigTree, policy: &MergePolicy) -> ConfigTree {
        if policy.inplace {
            merge::merge_into(&mut self.root, &patch.root, policy);
            self.clone()
        } else {
            ConfigTree {
                root: merge::merge(&self.root, &patch.root, policy),
            }
        }
    }

    /// Merge an arbitrary value into the tree in place.
    pub(crate) fn merge_value(&mut self, patch: &Value, policy: &MergePolicy) {
        merge::merge_into(&mut self.root, patch, policy);
        if !self.root.is_object() {
            // a non-map patch cannot become the root
            self.root = Value::Object(Map::new());
        }
    }

    /// Apply an override payload; only keys already present are touched.
    pub fn apply_override(
        &mut self,
        section: Option<&str>,
        payload: &Value,
        known_sections: &BTreeSet<String>,
        policy: &OverridePolicy,
    ) -> Result<OverrideOutcome, ConfigError> {
        overrides::apply(&mut self.root, section, payload, known_sections, policy)
    }

    /// Move the value at `from` to `to`.
    ///
    /// Returns false when `from` does not exist. When both the moved value
    /// and the value already at `to` are maps they are deep-merged.
    pub fn rekey(&mut self, from: &str, to: &str) -> Result<bool, ConfigError> {
        let from = KeyPath::new(from)?;
        let to = KeyPath::new(to)?;
        let Some(moved) = keypath::take(&mut self.root, &from) else {
            return Ok(false);
        };
        let slot = keypath::ensure(&mut self.root, &to, || Value::Null);
        if slot.is_object() && moved.is_object() {
            merge::deep_merge(slot, &moved, true);
        } else {
            *slot = moved;
        }
        Ok(true)
    }

    /// Wrap the whole tree under `section`.
    pub fn nest(self, section: &str) -> ConfigTree {
        let mut map = Map::new();
        map.insert(section.to_string(), self.root);
        ConfigTree::from(map)
    }

    /// Value stored under a top-level key.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.as_map().get(name)
    }

    /// Top-level keys holding maps.
    pub fn sections(&self) -> BTreeSet<String> {
        section_names(&self.root)
    }

    /// Copy without null, empty-string, empty-list, or empty-map values.
    ///
    /// `0` and `false` are kept. Maps and lists emptied by the pruning are
    /// dropped as well, and blank list elements are removed.
    pub fn drop_blanks(&self) -> ConfigTree {
        ConfigTree {
            root: clean_blanks(self.root.clone()),
        }
    }

    /// Copy with keys trimmed and re-cased per `policy`.
    ///
    /// Keys that collide after rewriting are deep-merged in key order.
    pub fn normalize_keys(&self, policy: &NormalizePolicy) -> ConfigTree {
        ConfigTree {
            root: rewrite_keys(self.root.clone(), policy),
        }
    }

    /// Apply every clean-up `policy` asks for.
    pub fn normalized(&self, policy: &NormalizePolicy) -> ConfigTree {
        let mut tree = self.clone();
        if policy.drop_blanks {
            tree = tree.drop_blanks();
        }
        if policy.rewrites_keys() {
            tree = tree.normalize_keys(policy);
        }
        tree
    }

    /// Leaf path and value pairs, joined with `separator`.
    pub fn flatten(&self, separator: &str) -> Vec<(String, Value)> {
        let mut leaves = Vec::new();
        flatten_into(&self.root, "", separator, &mut leaves);
        leaves
    }
}

/// Names of top-level keys whose values are maps.
pub(crate) fn section_names(value: &Value) -> BTreeSet<String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, value)| value.is_object())
                .map(|(key, _)| key.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Returns `None` when the value should be removed from its parent.
fn prune_blanks(value: Value) -> Option<Value> {
    let cleaned = clean_blanks(value);
    (!is_blank(&cleaned)).then_some(cleaned)
}

fn clean_blanks(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter_map(|(key, value)| prune_blanks(value).map(|value| (key, value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().filter_map(prune_blanks).collect()),
        other => other,
    }
}

fn rewrite_key(key: &str, policy: &NormalizePolicy) -> String {
    let key = if policy.trim_keys { key.trim() } else { key };
    match policy.key_case {
        KeyCase::Preserve => key.to_string(),
        KeyCase::Lower => key.to_lowercase(),
        KeyCase::Upper => key.to_uppercase(),
    }
}

fn rewrite_keys(value: Value, policy: &NormalizePolicy) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                let key = rewrite_key(&key, policy);
                let value = rewrite_keys(value, policy);
                match out.get_mut(&key) {
                    Some(existing) => merge::deep_merge(existing, &value, true),
                    None => {
                        out.insert(key, value);
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| rewrite_keys(item, policy))
                .collect(),
        ),
        other => other,
    }
}

fn flatten_into(value: &Value, prefix: &str, separator: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{separator}{key}")
                };
                flatten_into(value, &path, separator, out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.push((prefix.to_string(), leaf.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(value: Value) -> ConfigTree {
        ConfigTree::from_value(value).expect("tree")
    }

    #[test]
    fn rejects_non_map_root() {
        assert!(matches!(
            ConfigTree::from_value(json!([1, 2])),
            Err(ConfigError::NotAMap { .. })
        ));
    }

    #[test]
    fn accessor_round_trip() {
        let mut config = ConfigTree::new();
        config.set("db__host", json!("localhost")).expect("set");
        config.set("db.port", json!(5432)).expect("set");
        assert_eq!(config.get("db__host", Value::Null).expect("get"), json!("localhost"));
        assert_eq!(config.get_strict("db__port").expect("get"), json!(5432));
        assert!(config.exists("db").expect("exists"));
        config.delete("db__port", false).expect("delete");
        assert!(!config.exists("db__port").expect("exists"));
        assert!(config.set("", json!(1)).is_err());
    }

    #[test]
    fn merge_respects_inplace_flag() {
        let mut base = tree(json!({"a": {"b": 1}}));
        let patch = tree(json!({"a": {"c": 2}}));

        let copy = base.merge(&patch, &MergePolicy::default());
        assert_eq!(copy.as_value(), &json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(base.as_value(), &json!({"a": {"b": 1}}));

        let policy = MergePolicy {
            inplace: true,
            ..MergePolicy::default()
        };
        base.merge(&patch, &policy);
        assert_eq!(base.as_value(), &json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn drop_blanks_keeps_zero_and_false() {
        let config = tree(json!({"a": 1, "b": "", "c": null, "d": {}, "e": 0, "f": false}));
        assert_eq!(
            config.drop_blanks().as_value(),
            &json!({"a": 1, "e": 0, "f": false})
        );
    }

    #[test]
    fn drop_blanks_removes_maps_emptied_by_pruning() {
        let config = tree(json!({"outer": {"inner": {"x": null}}, "list": [], "keep": [{"y": ""}, 0]}));
        assert_eq!(config.drop_blanks().as_value(), &json!({"keep": [0]}));
    }

    #[test]
    fn drop_blanks_removes_blank_list_elements() {
        let config = tree(json!({"a": [null, "", {}], "b": [[]], "c": [false, "x", [null, 1]]}));
        assert_eq!(
            config.drop_blanks().as_value(),
            &json!({"c": [false, "x", [1]]})
        );
    }

    #[test]
    fn rekey_moves_and_merges() {
        let mut config = tree(json!({"old": {"a": 1}, "new": {"b": 2}}));
        assert!(config.rekey("old", "new").expect("rekey"));
        assert_eq!(config.as_value(), &json!({"new": {"a": 1, "b": 2}}));
        assert!(!config.rekey("missing", "new").expect("rekey"));

        assert!(config.rekey("new__a", "flat").expect("rekey"));
        assert_eq!(config.as_value(), &json!({"new": {"b": 2}, "flat": 1}));
    }

    #[test]
    fn normalize_keys_lowercases_and_merges_collisions() {
        let config = tree(json!({" Image ": {"Max": 1}, "image": {"min": 0}}));
        let policy = NormalizePolicy {
            key_case: KeyCase::Lower,
            trim_keys: true,
            ..NormalizePolicy::default()
        };
        assert_eq!(
            config.normalize_keys(&policy).as_value(),
            &json!({"image": {"max": 1, "min": 0}})
        );
    }

    #[test]
    fn nest_and_sections() {
        let config = tree(json!({"max_width": 1024})).nest("image");
        assert_eq!(config.as_value(), &json!({"image": {"max_width": 1024}}));
        let mut with_scalar = config.clone();
        with_scalar.set("debug", json!(true)).expect("set");
        assert_eq!(
            with_scalar.sections().into_iter().collect::<Vec<_>>(),
            vec!["image".to_string()]
        );
    }

    #[test]
    fn flatten_lists_leaf_paths() {
        let config = tree(json!({"a": {"b": 1, "c": {}}, "d": [1]}));
        assert_eq!(
            config.flatten("__"),
            vec![
                ("a__b".to_string(), json!(1)),
                ("a__c".to_string(), json!({})),
                ("d".to_string(), json!([1])),
            ]
        );
    }
}
