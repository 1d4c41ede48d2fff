//! Validation collaborators and schema-to-section mapping.

use crate::tree::ConfigTree;
use crate::ConfigError;
use heck::ToSnakeCase;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, empty for the root.
    pub path: String,
    pub message: String,
}

impl FieldError {
    /// Error at `path`, relative to the validated section.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "root"
        } else {
            self.path.as_str()
        };
        write!(f, "{path}: {}", self.message)
    }
}

/// Accepts a generic tree and returns a validated object or field errors.
pub trait SchemaValidator {
    type Output;

    fn validate(&self, value: &Value) -> Result<Self::Output, Vec<FieldError>>;
}

/// Validates by deserializing into a typed model.
pub struct SerdeValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeValidator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeValidator")
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned> SchemaValidator for SerdeValidator<T> {
    type Output = T;

    fn validate(&self, value: &Value) -> Result<T, Vec<FieldError>> {
        serde_json::from_value(value.clone()).map_err(|err| vec![FieldError::new("", err.to_string())])
    }
}

/// Expected kind of a field in a [`ShapeSchema`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Any,
    String,
    Bool,
    Integer,
    Number,
    Array,
    StringArray,
    Object(ShapeSchema),
}

#[derive(Debug, Clone, PartialEq)]
struct FieldSpec {
    kind: FieldKind,
    required: bool,
}

/// Declarative shape check: allowed keys, required keys, and field kinds.
///
/// Every problem is reported, not only the first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapeSchema {
    fields: BTreeMap<String, FieldSpec>,
    allow_unknown: bool,
}

impl ShapeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: false,
            },
        );
        self
    }

    /// Add a field that must be present.
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: true,
            },
        );
        self
    }

    /// Accept keys the schema does not declare.
    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
        let Some(map) = expect_object(value, path, errors) else {
            return;
        };
        if !self.allow_unknown {
            ensure_allowed_keys(map, &self.fields, path, errors);
        }
        for (name, spec) in &self.fields {
            let field_path = join_path(path, name);
            match map.get(name) {
                Some(value) => check_kind(&spec.kind, value, &field_path, errors),
                None if spec.required => {
                    errors.push(FieldError::new(field_path, "missing required field"));
                }
                None => {}
            }
        }
    }
}

impl SchemaValidator for ShapeSchema {
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        let mut errors = Vec::new();
        self.check(value, "", &mut errors);
        if errors.is_empty() {
            Ok(value.clone())
        } else {
            Err(errors)
        }
    }
}

fn check_kind(kind: &FieldKind, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let expected = match kind {
        FieldKind::Any => return,
        FieldKind::Object(schema) => return schema.check(value, path, errors),
        FieldKind::StringArray => return expect_string_array(value, path, errors),
        FieldKind::String if value.is_string() => return,
        FieldKind::Bool if value.is_boolean() => return,
        FieldKind::Integer if value.is_u64() || value.is_i64() => return,
        FieldKind::Number if value.is_number() => return,
        FieldKind::Array if value.is_array() => return,
        FieldKind::String => "expected string",
        FieldKind::Bool => "expected bool",
        FieldKind::Integer => "expected integer",
        FieldKind::Number => "expected number",
        FieldKind::Array => "expected array",
    };
    errors.push(FieldError::new(path, expected));
}

fn expect_object<'a>(
    value: &'a Value,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => {
            errors.push(FieldError::new(path, "expected object"));
            None
        }
    }
}

fn expect_string_array(value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Value::Array(items) = value else {
        errors.push(FieldError::new(path, "expected array"));
        return;
    };
    for (idx, item) in items.iter().enumerate() {
        if !item.is_string() {
            errors.push(FieldError::new(format!("{path}[{idx}]"), "expected string"));
        }
    }
}

fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &BTreeMap<String, FieldSpec>,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    for key in map.keys() {
        if !allowed.contains_key(key) {
            errors.push(FieldError::new(join_path(path, key), "unknown key"));
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

/// Suffixes stripped from type names by the section heuristic.
const TYPE_SUFFIXES: &[&str] = &["Policy", "Config"];

/// Maps schema types to the section they validate.
#[derive(Debug, Clone, Default)]
pub struct SectionRegistry {
    sections: HashMap<TypeId, String>,
    heuristic: bool,
}

impl SectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `section` as the section validated by `T`.
    pub fn register<T: 'static>(mut self, section: impl Into<String>) -> Self {
        self.sections.insert(TypeId::of::<T>(), section.into());
        self
    }

    /// Fall back to guessing a section from the type name.
    pub fn allow_heuristic(mut self, allow: bool) -> Self {
        self.heuristic = allow;
        self
    }

    /// Section for `T` in `tree`; `None` means validate the root.
    pub fn section_for<T: 'static>(&self, tree: &ConfigTree) -> Result<Option<String>, ConfigError> {
        if let Some(section) = self.sections.get(&TypeId::of::<T>()) {
            return Ok(Some(section.clone()));
        }
        if !self.heuristic {
            return Ok(None);
        }
        let type_name = short_type_name(type_name::<T>());
        let present: Vec<String> = section_candidates(type_name)
            .into_iter()
            .filter(|candidate| tree.section(candidate).is_some())
            .collect();
        match present.len() {
            0 => {
                debug!("no section matches type; using root (type={type_name})");
                Ok(None)
            }
            1 => Ok(present.into_iter().next()),
            _ => Err(ConfigError::AmbiguousSection {
                type_name: type_name.to_string(),
                candidates: present,
            }),
        }
    }
}

/// `my_crate::model::ImagePolicy<T>` becomes `ImagePolicy`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn section_candidates(type_name: &str) -> Vec<String> {
    let stem = TYPE_SUFFIXES
        .iter()
        .find_map(|suffix| type_name.strip_suffix(suffix).filter(|stem| !stem.is_empty()))
        .unwrap_or(type_name);
    let mut candidates = vec![stem.to_snake_case()];
    let lower = stem.to_lowercase();
    if !candidates.contains(&lower) {
        candidates.push(lower);
    }
    candidates
}
