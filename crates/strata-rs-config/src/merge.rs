//! Deep and shallow merge of config trees.

use crate::policy::MergePolicy;
use serde_json::{Map, Value};

/// Merge `patch` into `base`, recursing where both sides are maps.
///
/// Any other combination replaces the base value with a copy of the patch
/// value, including type changes (a list may replace a map). Lists are
/// replaced unless `overwrite_lists` is false, in which case the patch
/// elements are appended.
pub fn deep_merge(base: &mut Value, patch: &Value, overwrite_lists: bool) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value, overwrite_lists),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(patch_items)) if !overwrite_lists => {
            base_items.extend(patch_items.iter().cloned());
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

/// Replace whole values at the top-level keys of `base`.
///
/// A non-map on either side replaces `base` entirely.
pub fn shallow_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                base_map.insert(key.clone(), value.clone());
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

/// Merge `patch` into `base` in place according to `policy`.
pub fn merge_into(base: &mut Value, patch: &Value, policy: &MergePolicy) {
    if policy.deep {
        deep_merge(base, patch, policy.overwrite_lists);
    } else {
        shallow_merge(base, patch);
    }
}

/// Return a merged copy, leaving `base` untouched.
pub fn merge(base: &Value, patch: &Value, policy: &MergePolicy) -> Value {
    let mut merged = base.clone();
    merge_into(&mut merged, patch, policy);
    merged
}

/// Fold trees left to right starting from an empty map.
///
/// The result at any leaf path holds the value of the last tree defining it.
pub fn merge_sequence<'a, I>(trees: I, policy: &MergePolicy) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    trees
        .into_iter()
        .fold(Value::Object(Map::new()), |mut acc, tree| {
            merge_into(&mut acc, tree, policy);
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn shallow() -> MergePolicy {
        MergePolicy {
            deep: false,
            ..MergePolicy::default()
        }
    }

    #[test]
    fn deep_merge_combines_nested_maps() {
        let base = json!({"a": {"b": 1, "c": 2}});
        let patch = json!({"a": {"b": 9, "d": 3}});
        let merged = merge(&base, &patch, &MergePolicy::default());
        assert_eq!(merged, json!({"a": {"b": 9, "c": 2, "d": 3}}));
        // receiver untouched when not merging in place
        assert_eq!(base, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn shallow_merge_replaces_subtrees() {
        let base = json!({"a": {"b": 1, "c": 2}, "k": 1});
        let patch = json!({"a": {"d": 3}});
        assert_eq!(
            merge(&base, &patch, &shallow()),
            json!({"a": {"d": 3}, "k": 1})
        );
    }

    #[test]
    fn patch_may_change_value_type() {
        let mut base = json!({"value": {"nested": true}, "list": [1]});
        deep_merge(&mut base, &json!({"value": [1, 2], "list": {"x": 1}}), true);
        assert_eq!(base, json!({"value": [1, 2], "list": {"x": 1}}));
    }

    #[test]
    fn null_in_patch_overwrites() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, &json!({"a": null}), true);
        assert_eq!(base, json!({"a": null}));
    }

    #[test]
    fn lists_extend_when_not_overwriting() {
        let mut base = json!({"items": [1, 2]});
        deep_merge(&mut base, &json!({"items": [3]}), false);
        assert_eq!(base, json!({"items": [1, 2, 3]}));

        let mut base = json!({"items": [1, 2]});
        deep_merge(&mut base, &json!({"items": [3]}), true);
        assert_eq!(base, json!({"items": [3]}));
    }

    #[test]
    fn sequence_last_definition_wins() {
        let trees = [
            json!({"a": 1, "n": {"x": 1, "y": 1}}),
            json!({"b": 2, "n": {"y": 2}}),
            json!({"a": 3, "n": {"z": 3}}),
        ];
        let merged = merge_sequence(&trees, &MergePolicy::default());
        assert_eq!(
            merged,
            json!({"a": 3, "b": 2, "n": {"x": 1, "y": 2, "z": 3}})
        );
    }

    #[test]
    fn sequence_of_nothing_is_empty_map() {
        let merged = merge_sequence(std::iter::empty(), &MergePolicy::default());
        assert_eq!(merged, json!({}));
    }

    #[test]
    fn shallow_sequence_keeps_last_subtree() {
        let trees = [json!({"n": {"x": 1}}), json!({"n": {"y": 2}})];
        assert_eq!(merge_sequence(&trees, &shallow()), json!({"n": {"y": 2}}));
    }
}
