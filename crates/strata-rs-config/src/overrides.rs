//! Override sources: tune existing settings without adding new ones.
//!
//! An override payload is walked against the tree. Keys already present are
//! replaced (maps on both sides are walked further); keys the tree does not
//! have are dropped and reported, never inserted.

use crate::policy::OverridePolicy;
use crate::tree::ROOT_PATH;
use crate::ConfigError;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Which payload keys an override applied and which it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideOutcome {
    /// Dotted paths whose values were replaced.
    pub applied: Vec<String>,
    /// Dotted paths that do not exist in the tree.
    pub dropped: Vec<String>,
}

impl OverrideOutcome {
    fn drop_all(payload: &Map<String, Value>, prefix: &str) -> Self {
        Self {
            applied: Vec::new(),
            dropped: payload.keys().map(|key| join_path(prefix, key)).collect(),
        }
    }
}

/// Apply `payload` to `tree` at `section` (or the root).
///
/// `known_sections` holds the sections established by base sources so far.
/// A root-level payload names its sections by its top-level map keys, so those
/// are checked the same way as an explicit `section`.
pub(crate) fn apply(
    tree: &mut Value,
    section: Option<&str>,
    payload: &Value,
    known_sections: &BTreeSet<String>,
    policy: &OverridePolicy,
) -> Result<OverrideOutcome, ConfigError> {
    if policy.require_base_section {
        check_sections(tree, section, payload, known_sections)?;
    }

    let prefix = section.unwrap_or_default();
    let Value::Object(payload) = payload else {
        return Err(ConfigError::NotAMap {
            path: section.unwrap_or(ROOT_PATH).to_string(),
        });
    };
    let Value::Object(root) = tree else {
        return Err(ConfigError::NotAMap {
            path: ROOT_PATH.to_string(),
        });
    };

    let target = match section {
        Some(section) => match root.get_mut(section) {
            Some(Value::Object(map)) => map,
            _ => {
                warn!("override section absent from tree; dropping payload (section={section})");
                return Ok(OverrideOutcome::drop_all(payload, prefix));
            }
        },
        None => root,
    };

    let mut outcome = OverrideOutcome::default();
    apply_existing(target, payload, prefix, &mut outcome);
    if !outcome.dropped.is_empty() {
        debug!(
            "override dropped unknown keys (section={}, keys={})",
            section.unwrap_or(ROOT_PATH),
            outcome.dropped.join(",")
        );
    }
    Ok(outcome)
}

fn check_sections(
    tree: &Value,
    section: Option<&str>,
    payload: &Value,
    known_sections: &BTreeSet<String>,
) -> Result<(), ConfigError> {
    let unknown = match (section, payload) {
        (Some(section), _) => (!known_sections.contains(section)).then_some(section),
        (None, Value::Object(payload)) => payload
            .iter()
            .filter(|(key, value)| value.is_object() && !known_sections.contains(*key))
            .map(|(key, _)| key.as_str())
            .find(|key| tree.get(*key).is_none()),
        (None, _) => None,
    };
    match unknown {
        Some(section) => Err(ConfigError::UnknownOverrideSection {
            section: section.to_string(),
        }),
        None => Ok(()),
    }
}

fn apply_existing(
    target: &mut Map<String, Value>,
    payload: &Map<String, Value>,
    prefix: &str,
    outcome: &mut OverrideOutcome,
) {
    for (key, value) in payload {
        let path = join_path(prefix, key);
        match (target.get_mut(key), value) {
            (None, _) => outcome.dropped.push(path),
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                apply_existing(existing, nested, &path, outcome);
            }
            (Some(existing), value) => {
                *existing = value.clone();
                outcome.applied.push(path);
            }
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
