//! Placeholder resolution over string leaves.
//!
//! Two grammars are recognised:
//!
//! - `${name}` / `${name:default}`: an internal reference to another path in
//!   the same tree, or an environment variable when the name is not a tree
//!   path (see [`EnvPrecedence`](crate::EnvPrecedence) for the lookup order).
//! - `{{name}}`: a key in the caller-supplied context map.
//!
//! A string that consists of exactly one placeholder is replaced by the
//! referenced value with its type preserved; placeholders embedded in longer
//! text are substituted as text. Cycles are detected by tracking the paths
//! currently being resolved, so resolution always terminates.

use crate::env::EnvSnapshot;
use crate::keypath::{self, KeyPath};
use crate::policy::{EnvPrecedence, ResolverPolicy};
use crate::tree::ConfigTree;
use crate::ConfigError;
use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Caller-supplied values for `{{name}}` placeholders.
pub type ResolveContext = HashMap<String, Value>;

const REFERENCE_PATTERN: &str = r"\$\{([^{}:]+)(?::([^{}]*))?\}";
const CONTEXT_PATTERN: &str = r"\{\{\s*([^{}\s]+)\s*\}\}";

/// Resolve every placeholder in `tree` against the process environment.
pub fn resolve(
    tree: &ConfigTree,
    policy: &ResolverPolicy,
    context: &ResolveContext,
) -> Result<ConfigTree, ConfigError> {
    resolve_with_env(tree, policy, &EnvSnapshot::from_process(), context)
}

/// Resolve every placeholder in `tree` against an explicit environment.
pub fn resolve_with_env(
    tree: &ConfigTree,
    policy: &ResolverPolicy,
    env: &EnvSnapshot,
    context: &ResolveContext,
) -> Result<ConfigTree, ConfigError> {
    let mut resolver = Resolver::new(tree.as_value(), policy, env, context)?;
    let resolved = resolver.walk(tree.as_value(), "")?;
    ConfigTree::from_value(resolved)
}

/// Why a single placeholder could not be substituted.
enum Fault {
    /// The reference is part of its own resolution.
    Cycle { path: String, chain: Vec<String> },
    /// A hard error that aborts the whole pass.
    Fatal(ConfigError),
}

impl From<ConfigError> for Fault {
    fn from(err: ConfigError) -> Self {
        Fault::Fatal(err)
    }
}

/// Where a reference name was found.
#[derive(Clone, Copy)]
enum Scope {
    Tree,
    Env,
}

/// Single-pass resolver over one tree.
struct Resolver<'a> {
    source: &'a Value,
    policy: &'a ResolverPolicy,
    env: &'a EnvSnapshot,
    context: &'a ResolveContext,
    reference: Regex,
    context_ref: Regex,
    /// Paths currently being resolved, outermost first.
    resolving: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn new(
        source: &'a Value,
        policy: &'a ResolverPolicy,
        env: &'a EnvSnapshot,
        context: &'a ResolveContext,
    ) -> Result<Self, ConfigError> {
        let reference = Regex::new(REFERENCE_PATTERN)
            .map_err(|err| ConfigError::InvalidPattern(err.to_string()))?;
        let context_ref = Regex::new(CONTEXT_PATTERN)
            .map_err(|err| ConfigError::InvalidPattern(err.to_string()))?;
        Ok(Self {
            source,
            policy,
            env,
            context,
            reference,
            context_ref,
            resolving: Vec::new(),
        })
    }

    fn child_path(&self, prefix: &str, key: &str) -> String {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}{}{key}", self.policy.separator)
        }
    }

    /// Rebuild `value`, resolving string leaves. `path` is its location.
    fn walk(&mut self, value: &Value, path: &str) -> Result<Value, ConfigError> {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    let child_path = self.child_path(path, key);
                    out.insert(key.clone(), self.walk(child, &child_path)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::String(text) => self.resolve_leaf(text, path),
            other => Ok(other.clone()),
        }
    }

    fn resolve_leaf(&mut self, text: &str, path: &str) -> Result<Value, ConfigError> {
        if !self.has_placeholder(text) {
            return Ok(Value::String(text.to_string()));
        }
        let tracked = !path.is_empty() && !self.resolving.iter().any(|entry| entry == path);
        if tracked {
            self.resolving.push(path.to_string());
        }
        let result = self.resolve_text(text);
        if tracked {
            self.resolving.pop();
        }
        match result {
            Ok(value) => Ok(value),
            Err(Fault::Cycle { path, chain }) if !self.policy.strict => {
                warn!(
                    "circular reference left unresolved (path={path}, chain={})",
                    chain.join(" -> ")
                );
                Ok(Value::String(text.to_string()))
            }
            Err(Fault::Cycle { path: target, chain }) => Err(ConfigError::CircularReference {
                path: target,
                chain,
                at: Some(path.to_string()),
            }),
            Err(Fault::Fatal(err)) => Err(err.at_leaf(path)),
        }
    }

    fn has_placeholder(&self, text: &str) -> bool {
        self.reference.is_match(text)
            || (self.policy.enable_context && self.context_ref.is_match(text))
    }

    /// Substitute references, then context placeholders, in `text`.
    fn resolve_text(&mut self, text: &str) -> Result<Value, Fault> {
        if let Some((name, default)) = whole_match(&self.reference, text) {
            return self.resolve_reference(&name, default.as_deref(), text);
        }

        let mut substituted = String::with_capacity(text.len());
        let mut last = 0;
        let captures: Vec<(usize, usize, String, Option<String>)> = self
            .reference
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?.as_str().to_string();
                let default = caps.get(2).map(|m| m.as_str().to_string());
                Some((whole.start(), whole.end(), name, default))
            })
            .collect();
        for (start, end, name, default) in captures {
            substituted.push_str(&text[last..start]);
            let value = self.resolve_reference(&name, default.as_deref(), &text[start..end])?;
            substituted.push_str(&render(&value));
            last = end;
        }
        substituted.push_str(&text[last..]);

        if self.policy.enable_context {
            return self.resolve_context(&substituted);
        }
        Ok(Value::String(substituted))
    }

    fn resolve_context(&mut self, text: &str) -> Result<Value, Fault> {
        if let Some((name, _)) = whole_match(&self.context_ref, text) {
            return self.context_value(&name, text);
        }
        let mut substituted = String::with_capacity(text.len());
        let mut last = 0;
        let captures: Vec<(usize, usize, String)> = self
            .context_ref
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), caps.get(1)?.as_str().to_string()))
            })
            .collect();
        for (start, end, name) in captures {
            substituted.push_str(&text[last..start]);
            let value = self.context_value(&name, &text[start..end])?;
            substituted.push_str(&render(&value));
            last = end;
        }
        substituted.push_str(&text[last..]);
        Ok(Value::String(substituted))
    }

    fn context_value(&mut self, name: &str, raw: &str) -> Result<Value, Fault> {
        let found = self.context.get(name).cloned().or_else(|| {
            let path = KeyPath::parse(name, &self.policy.separator, self.policy.dot_fallback).ok()?;
            let (head, rest) = path.segments().split_first()?;
            let mut node = self.context.get(head)?;
            for segment in rest {
                node = node.as_object()?.get(segment)?;
            }
            Some(node.clone())
        });
        let Some(value) = found else {
            if self.policy.strict {
                return Err(Fault::Fatal(ConfigError::MissingContextKey {
                    key: name.to_string(),
                    at: None,
                }));
            }
            debug!("context key missing; placeholder kept (key={name})");
            return Ok(Value::String(raw.to_string()));
        };
        let marker = format!("{{{{{name}}}}}");
        self.follow(marker, value)
    }

    fn lookup_order(&self, name: &str) -> &'static [Scope] {
        let pathlike = name.contains(self.policy.separator.as_str())
            || (self.policy.dot_fallback && name.contains('.'));
        if pathlike || !self.policy.enable_env {
            return &[Scope::Tree];
        }
        match self.policy.env_precedence {
            EnvPrecedence::TreeFirst => &[Scope::Tree, Scope::Env],
            EnvPrecedence::EnvFirst => &[Scope::Env, Scope::Tree],
        }
    }

    fn resolve_reference(
        &mut self,
        name: &str,
        default: Option<&str>,
        raw: &str,
    ) -> Result<Value, Fault> {
        let name = name.trim();
        for scope in self.lookup_order(name) {
            let found = match scope {
                Scope::Tree => self.tree_reference(name),
                Scope::Env => self.env_reference(name),
            };
            match (found, default) {
                (Ok(Some(value)), _) => return Ok(value),
                (Ok(None), _) => {}
                (Err(Fault::Cycle { path, .. }), Some(default)) if !self.policy.strict => {
                    debug!("cycle broken with default (path={path})");
                    return Ok(Value::String(default.to_string()));
                }
                (Err(fault), _) => return Err(fault),
            }
        }

        if let Some(default) = default {
            return Ok(Value::String(default.to_string()));
        }
        if self.policy.enable_env && is_env_name(name) {
            debug!("environment variable unset; substituting empty string (name={name})");
            return Ok(Value::String(String::new()));
        }
        if self.policy.strict {
            return Err(Fault::Fatal(ConfigError::MissingPath {
                path: name.to_string(),
                at: None,
            }));
        }
        debug!("reference unresolved; placeholder kept (name={name})");
        Ok(Value::String(raw.to_string()))
    }

    fn tree_reference(&mut self, name: &str) -> Result<Option<Value>, Fault> {
        let Ok(path) = KeyPath::parse(name, &self.policy.separator, self.policy.dot_fallback)
        else {
            return Ok(None);
        };
        let Some(target) = keypath::lookup(self.source, &path) else {
            return Ok(None);
        };
        let key = path.to_string();
        if self.resolving.contains(&key) {
            let mut chain = self.resolving.clone();
            chain.push(key.clone());
            return Err(Fault::Cycle { path: key, chain });
        }

        self.resolving.push(key.clone());
        let resolved = if self.policy.recursive {
            self.walk_nested(target, &key)
        } else {
            Ok(target.clone())
        };
        self.resolving.pop();
        resolved.map(Some)
    }

    /// Like `walk`, but faults propagate to the outermost leaf.
    fn walk_nested(&mut self, value: &Value, path: &str) -> Result<Value, Fault> {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    let child_path = self.child_path(path, key);
                    self.resolving.push(child_path.clone());
                    let resolved = self.walk_nested(child, &child_path);
                    self.resolving.pop();
                    out.insert(key.clone(), resolved?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk_nested(item, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::String(text) if self.has_placeholder(text) => self.resolve_text(text),
            other => Ok(other.clone()),
        }
    }

    fn env_reference(&mut self, name: &str) -> Result<Option<Value>, Fault> {
        let Some(raw) = self.env.var(name) else {
            return Ok(None);
        };
        let value = Value::String(raw.to_string());
        self.follow(format!("$env:{name}"), value).map(Some)
    }

    /// Re-resolve a substituted value when recursion is enabled.
    fn follow(&mut self, marker: String, value: Value) -> Result<Value, Fault> {
        let Value::String(text) = &value else {
            return Ok(value);
        };
        if !self.policy.recursive || !self.has_placeholder(text) {
            return Ok(value);
        }
        if self.resolving.contains(&marker) {
            let mut chain = self.resolving.clone();
            chain.push(marker.clone());
            return Err(Fault::Cycle {
                path: marker,
                chain,
            });
        }
        self.resolving.push(marker);
        let resolved = self.resolve_text(text);
        self.resolving.pop();
        resolved
    }
}

/// Name and default of the single placeholder spanning all of `text`.
fn whole_match(regex: &Regex, text: &str) -> Option<(String, Option<String>)> {
    let caps = regex.captures(text)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != text.len() {
        return None;
    }
    let name = caps.get(1)?.as_str().to_string();
    let default = caps.get(2).map(|m| m.as_str().to_string());
    Some((name, default))
}

/// Text form of a substituted value.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `UPPER_SNAKE` names are treated as environment variables when unset.
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(value: Value) -> ConfigTree {
        ConfigTree::from_value(value).expect("tree")
    }

    fn run(value: Value, policy: &ResolverPolicy) -> Result<Value, ConfigError> {
        run_with(value, policy, &EnvSnapshot::default(), &ResolveContext::new())
    }

    fn run_with(
        value: Value,
        policy: &ResolverPolicy,
        env: &EnvSnapshot,
        context: &ResolveContext,
    ) -> Result<Value, ConfigError> {
        resolve_with_env(&tree(value), policy, env, context).map(ConfigTree::into_value)
    }

    #[test]
    fn resolves_internal_reference() {
        let resolved = run(
            json!({"host": "api.com", "url": "${host}:443"}),
            &ResolverPolicy::default(),
        )
        .expect("resolve");
        assert_eq!(resolved, json!({"host": "api.com", "url": "api.com:443"}));
    }

    #[test]
    fn resolves_chained_references() {
        let resolved = run(
            json!({
                "config": {"base": "https://api.com"},
                "path": "${config__base}/v1",
                "url": "${path}/users"
            }),
            &ResolverPolicy::strict(),
        )
        .expect("resolve");
        assert_eq!(resolved["url"], json!("https://api.com/v1/users"));
        assert_eq!(resolved["path"], json!("https://api.com/v1"));
    }

    #[test]
    fn whole_placeholder_keeps_type() {
        let resolved = run(
            json!({"limits": {"max": 10}, "copy": "${limits}", "max": "${limits.max}", "text": "n=${limits__max}"}),
            &ResolverPolicy::default(),
        )
        .expect("resolve");
        assert_eq!(resolved["copy"], json!({"max": 10}));
        assert_eq!(resolved["max"], json!(10));
        assert_eq!(resolved["text"], json!("n=10"));
    }

    #[test]
    fn missing_reference_uses_default() {
        let resolved = run(
            json!({"url": "${db__host:localhost}:5432"}),
            &ResolverPolicy::strict(),
        )
        .expect("resolve");
        assert_eq!(resolved["url"], json!("localhost:5432"));
    }

    #[test]
    fn missing_reference_is_strict_error() {
        let err = run(json!({"url": "${db__host}"}), &ResolverPolicy::strict()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPath { ref path, .. } if path == "db__host"));

        let lenient = run(json!({"url": "${db__host}"}), &ResolverPolicy::default())
            .expect("resolve");
        assert_eq!(lenient["url"], json!("${db__host}"));
    }

    #[test]
    fn strict_failure_names_the_leaf_holding_the_placeholder() {
        let err = run(
            json!({"db": {"port": 5432}, "service": {"url": "${db__host}:${db__port}"}}),
            &ResolverPolicy::strict(),
        )
        .unwrap_err();
        match &err {
            ConfigError::MissingPath { path, at } => {
                assert_eq!(path, "db__host");
                assert_eq!(at.as_deref(), Some("service__url"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.path(), Some("service__url"));
        assert_eq!(
            err.to_string(),
            "missing config path: db__host (referenced from service__url)"
        );
    }

    #[test]
    fn cycle_is_error_when_strict() {
        let err = run(json!({"a": "${b}", "b": "${a}"}), &ResolverPolicy::strict()).unwrap_err();
        match err {
            ConfigError::CircularReference { path, chain, at } => {
                assert_eq!(path, "a");
                assert_eq!(chain, vec!["a", "b", "a"]);
                assert_eq!(at.as_deref(), Some("a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycle_keeps_original_text_when_lenient() {
        let resolved = run(json!({"a": "${b}", "b": "${a}"}), &ResolverPolicy::default())
            .expect("resolve");
        assert_eq!(resolved, json!({"a": "${b}", "b": "${a}"}));
    }

    #[test]
    fn cycle_uses_declared_default_when_lenient() {
        let value = json!({"a": "${b}", "b": "${a:fallback}"});
        let resolved = run(value.clone(), &ResolverPolicy::default()).expect("resolve");
        assert_eq!(resolved, json!({"a": "fallback", "b": "fallback"}));

        let err = run(value, &ResolverPolicy::strict()).unwrap_err();
        assert!(matches!(err, ConfigError::CircularReference { .. }));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = run(json!({"a": "x${a}"}), &ResolverPolicy::strict()).unwrap_err();
        assert!(matches!(err, ConfigError::CircularReference { .. }));
    }

    #[test]
    fn env_reference_reads_snapshot() {
        let env = EnvSnapshot::from_pairs([("DB_HOST", "db.internal")]);
        let resolved = run_with(
            json!({"host": "${DB_HOST}", "user": "${DB_USER:admin}", "pass": "${DB_PASS}"}),
            &ResolverPolicy::strict(),
            &env,
            &ResolveContext::new(),
        )
        .expect("resolve");
        assert_eq!(
            resolved,
            json!({"host": "db.internal", "user": "admin", "pass": ""})
        );
    }

    #[test]
    fn env_precedence_decides_ambiguous_names() {
        let env = EnvSnapshot::from_pairs([("mode", "from-env")]);
        let value = json!({"mode": "from-tree", "picked": "${mode}"});

        let tree_first = run_with(
            value.clone(),
            &ResolverPolicy::default(),
            &env,
            &ResolveContext::new(),
        )
        .expect("resolve");
        assert_eq!(tree_first["picked"], json!("from-tree"));

        let policy = ResolverPolicy {
            env_precedence: EnvPrecedence::EnvFirst,
            ..ResolverPolicy::default()
        };
        let env_first = run_with(value, &policy, &env, &ResolveContext::new()).expect("resolve");
        assert_eq!(env_first["picked"], json!("from-env"));
    }

    #[test]
    fn env_disabled_leaves_env_names_to_tree() {
        let env = EnvSnapshot::from_pairs([("HOME", "/home/me")]);
        let policy = ResolverPolicy {
            enable_env: false,
            ..ResolverPolicy::default()
        };
        let resolved = run_with(json!({"h": "${HOME}"}), &policy, &env, &ResolveContext::new())
            .expect("resolve");
        assert_eq!(resolved["h"], json!("${HOME}"));
    }

    #[test]
    fn context_placeholders() {
        let mut context = ResolveContext::new();
        context.insert("user".to_string(), json!("ada"));
        context.insert("retries".to_string(), json!(3));
        context.insert("job".to_string(), json!({"id": "j-1"}));
        let resolved = run_with(
            json!({"greeting": "hi {{ user }}", "n": "{{retries}}", "id": "{{job.id}}", "other": "{{nope}}"}),
            &ResolverPolicy::default(),
            &EnvSnapshot::default(),
            &context,
        )
        .expect("resolve");
        assert_eq!(
            resolved,
            json!({"greeting": "hi ada", "n": 3, "id": "j-1", "other": "{{nope}}"})
        );

        let err = run_with(
            json!({"other": "{{nope}}"}),
            &ResolverPolicy::strict(),
            &EnvSnapshot::default(),
            &context,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingContextKey { ref key, .. } if key == "nope"));
        assert_eq!(err.path(), Some("other"));
    }

    #[test]
    fn context_disabled_leaves_text() {
        let mut context = ResolveContext::new();
        context.insert("user".to_string(), json!("ada"));
        let policy = ResolverPolicy {
            enable_context: false,
            strict: true,
            ..ResolverPolicy::default()
        };
        let resolved = run_with(
            json!({"greeting": "hi {{user}}"}),
            &policy,
            &EnvSnapshot::default(),
            &context,
        )
        .expect("resolve");
        assert_eq!(resolved["greeting"], json!("hi {{user}}"));
    }

    #[test]
    fn reference_into_context_placeholder() {
        let mut context = ResolveContext::new();
        context.insert("region".to_string(), json!("eu"));
        let resolved = run_with(
            json!({"bucket": "data-{{region}}", "uri": "s3://${bucket}/x"}),
            &ResolverPolicy::strict(),
            &EnvSnapshot::default(),
            &context,
        )
        .expect("resolve");
        assert_eq!(resolved["uri"], json!("s3://data-eu/x"));
    }

    #[test]
    fn non_recursive_substitutes_raw_value() {
        let policy = ResolverPolicy {
            recursive: false,
            ..ResolverPolicy::default()
        };
        let resolved = run(json!({"a": "x", "b": "${a}", "c": "${b}"}), &policy).expect("resolve");
        assert_eq!(resolved["c"], json!("${a}"));
    }

    #[test]
    fn lists_and_non_strings_are_walked() {
        let resolved = run(
            json!({"name": "svc", "tags": ["${name}", 1, {"k": "${name}-x"}], "on": true}),
            &ResolverPolicy::strict(),
        )
        .expect("resolve");
        assert_eq!(
            resolved,
            json!({"name": "svc", "tags": ["svc", 1, {"k": "svc-x"}], "on": true})
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let env = EnvSnapshot::from_pairs([("PORT", "8080")]);
        let first = run_with(
            json!({"host": "api.com", "url": "${host}:${PORT}", "nested": {"u": "${url}"}}),
            &ResolverPolicy::strict(),
            &env,
            &ResolveContext::new(),
        )
        .expect("first");
        let second = run_with(
            first.clone(),
            &ResolverPolicy::strict(),
            &env,
            &ResolveContext::new(),
        )
        .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn env_name_shape() {
        assert!(is_env_name("HOME"));
        assert!(is_env_name("_PRIVATE_1"));
        assert!(!is_env_name("host"));
        assert!(!is_env_name("1ABC"));
        assert!(!is_env_name(""));
    }
}
