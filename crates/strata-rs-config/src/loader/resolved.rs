//! The immutable result of a successful load.

use crate::error::Stage;
use crate::schema::{SchemaValidator, SectionRegistry};
use crate::tree::{ConfigTree, ROOT_PATH};
use crate::ConfigError;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;

/// A fully merged, resolved, and normalized configuration.
///
/// There are no mutating accessors; take the tree with [`into_tree`] to apply
/// runtime changes.
///
/// [`into_tree`]: ResolvedConfig::into_tree
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    tree: ConfigTree,
    warnings: Vec<String>,
    trace: Vec<Stage>,
}

impl ResolvedConfig {
    pub(crate) fn new(tree: ConfigTree, warnings: Vec<String>, trace: Vec<Stage>) -> Self {
        Self {
            tree,
            warnings,
            trace,
        }
    }

    /// Value at `path`, or `default` when absent.
    pub fn get(&self, path: &str, default: Value) -> Result<Value, ConfigError> {
        self.tree.get(path, default)
    }

    /// Value at `path`, failing with `MissingPath` when absent.
    pub fn get_strict(&self, path: &str) -> Result<Value, ConfigError> {
        self.tree.get_strict(path)
    }

    /// Top-level map named `name`.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.tree.section(name)
    }

    /// Names of all top-level maps.
    pub fn sections(&self) -> BTreeSet<String> {
        self.tree.sections()
    }

    /// The resolved tree.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Take the tree, e.g. to apply runtime `set` calls.
    pub fn into_tree(self) -> ConfigTree {
        self.tree
    }

    /// Non-fatal problems met while loading, such as skipped optional sources.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Stages the loader passed through, in order.
    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    /// Deserialize a section (or the root) into `T`.
    pub fn extract<T: DeserializeOwned>(&self, section: Option<&str>) -> Result<T, ConfigError> {
        let value = self.target(section)?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Hand a section (or the root) to `validator`.
    pub fn validate_with<V: SchemaValidator>(
        &self,
        section: Option<&str>,
        validator: &V,
    ) -> Result<V::Output, ConfigError> {
        let value = self.target(section)?;
        debug!(
            "validating config (section={})",
            section.unwrap_or(ROOT_PATH)
        );
        validator
            .validate(value)
            .map_err(|errors| ConfigError::ValidationFailed {
                section: section.unwrap_or(ROOT_PATH).to_string(),
                errors,
            })
    }

    /// Validate the section `registry` maps `T` to.
    pub fn validate_as<T: 'static, V: SchemaValidator>(
        &self,
        registry: &SectionRegistry,
        validator: &V,
    ) -> Result<V::Output, ConfigError> {
        let section = registry.section_for::<T>(&self.tree)?;
        self.validate_with(section.as_deref(), validator)
    }

    fn target(&self, section: Option<&str>) -> Result<&Value, ConfigError> {
        match section {
            Some(name) => self.tree.section(name).ok_or_else(|| ConfigError::MissingPath {
                path: name.to_string(),
                at: None,
            }),
            None => Ok(self.tree.as_value()),
        }
    }
}
