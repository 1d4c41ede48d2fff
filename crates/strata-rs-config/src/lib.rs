//! Layered configuration resolution.
//!
//! Merges typed defaults, files, in-memory maps, override layers, and
//! environment variables into one tree, resolves `${...}` and `{{...}}`
//! placeholders inside it, and hands sections to schema validators.

mod env;
mod error;
pub mod keypath;
mod loader;
pub mod merge;
mod overrides;
mod parser;
mod policy;
mod resolver;
mod schema;
mod tree;

/// Environment sources and snapshots.
pub use env::{EnvSelector, EnvSnapshot, EnvSource};
/// Public error types returned by the engine and the loader.
pub use error::{ConfigError, LoadError, SourceRef, Stage};
/// Key paths and tree accessors.
pub use keypath::{DEFAULT_SEPARATOR, DOT_SEPARATOR, KeyPath};
/// The orchestrator and its result.
pub use loader::{ConfigLoader, ResolvedConfig, Source, SourceKind, load};
pub use overrides::OverrideOutcome;
/// Parser collaborator.
pub use parser::{ConfigFormat, FormatParser, TreeParser};
/// Policies passed explicitly to each component.
pub use policy::{
    DEFAULT_ENV_SECTION, EnvPrecedence, KeyCase, LoadPolicy, MergePolicy, NormalizePolicy,
    OverridePolicy, ResolverPolicy,
};
pub use resolver::{ResolveContext, resolve, resolve_with_env};
/// Validator collaborators.
pub use schema::{
    FieldError, FieldKind, SchemaValidator, SectionRegistry, SerdeValidator, ShapeSchema,
};
pub use tree::ConfigTree;

use serde_json::Value;

/// Value at `path` in `tree`, or `default` when absent.
pub fn get(tree: &ConfigTree, path: &str, default: Value) -> Result<Value, ConfigError> {
    tree.get(path, default)
}

/// Set `path` in `tree`, creating intermediate maps.
pub fn set(tree: &mut ConfigTree, path: &str, value: Value) -> Result<(), ConfigError> {
    tree.set(path, value)
}

/// Merge `patch` over `base` without touching either.
pub fn merge(base: &ConfigTree, patch: &ConfigTree, policy: &MergePolicy) -> ConfigTree {
    let mut merged = base.clone();
    merged.merge_value(patch.as_value(), policy);
    merged
}
