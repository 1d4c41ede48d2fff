//! Error types for config loading, resolution, and validation.

use crate::schema::FieldError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the individual engine components.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a config file failed.
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// A declared, non-optional file source does not exist.
    #[error("config source not found: {}", path.display())]
    MissingSource { path: PathBuf },
    /// The parser collaborator rejected the text.
    #[error("failed to parse {format} config: {message}")]
    ParseFailed { format: String, message: String },
    /// Converting between typed values and trees failed.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A key path normalized to zero segments.
    #[error("invalid key path: {path:?}")]
    InvalidPath { path: String },
    /// A value expected to be a map was something else.
    #[error("expected a map at {path}")]
    NotAMap { path: String },
    /// A strict lookup found nothing at the path.
    ///
    /// `at` is the leaf holding the placeholder when the lookup came from the
    /// resolver.
    #[error("missing config path: {path}{}", referenced_at(at))]
    MissingPath { path: String, at: Option<String> },
    /// A strict context placeholder named an unknown key.
    #[error("missing context key: {key}{}", referenced_at(at))]
    MissingContextKey { key: String, at: Option<String> },
    /// A reference participates in its own resolution.
    #[error("circular reference at {path} (chain: {}){}", chain.join(" -> "), referenced_at(at))]
    CircularReference {
        path: String,
        chain: Vec<String>,
        at: Option<String>,
    },
    /// An override source targets a section no base source established.
    #[error("override targets unknown section: {section}")]
    UnknownOverrideSection { section: String },
    /// Section inference matched more than one key.
    #[error("ambiguous section for {type_name}: candidates {}", candidates.join(", "))]
    AmbiguousSection {
        type_name: String,
        candidates: Vec<String>,
    },
    /// The schema validator rejected the tree.
    #[error("validation failed for {section}: {}", format_field_errors(errors))]
    ValidationFailed {
        section: String,
        errors: Vec<FieldError>,
    },
    /// A glob pattern in an env selector did not compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl ConfigError {
    /// Key path associated with the error, when there is one.
    ///
    /// For resolver failures this is the leaf holding the placeholder, not the
    /// name it referenced.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::MissingPath { at: Some(at), .. }
            | Self::MissingContextKey { at: Some(at), .. }
            | Self::CircularReference { at: Some(at), .. } => Some(at),
            Self::InvalidPath { path }
            | Self::NotAMap { path }
            | Self::MissingPath { path, .. }
            | Self::CircularReference { path, .. } => Some(path),
            Self::MissingContextKey { key, .. } => Some(key),
            Self::UnknownOverrideSection { section } | Self::ValidationFailed { section, .. } => {
                Some(section)
            }
            _ => None,
        }
    }

    /// Record the leaf a resolver failure happened in, unless one is set.
    pub(crate) fn at_leaf(mut self, leaf: &str) -> Self {
        if let Self::MissingPath { at, .. }
        | Self::MissingContextKey { at, .. }
        | Self::CircularReference { at, .. } = &mut self
        {
            at.get_or_insert_with(|| leaf.to_string());
        }
        self
    }
}

fn referenced_at(at: &Option<String>) -> String {
    at.as_ref()
        .map(|at| format!(" (referenced from {at})"))
        .unwrap_or_default()
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Orchestrator stage; see `ConfigLoader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Loader created, nothing read yet.
    Init,
    /// Merging typed defaults, files, and maps in declared order.
    LoadingBase,
    /// Applying override sources to keys the base established.
    LoadingOverrides,
    /// Merging selected environment variables into their section.
    LoadingEnv,
    /// Substituting `${...}` and `{{...}}` placeholders.
    Resolving,
    /// Dropping blanks and rewriting keys.
    Normalizing,
    /// The resolved tree is available.
    Ready,
    /// A stage failed; the load produced no tree.
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::LoadingBase => "loading_base",
            Stage::LoadingOverrides => "loading_overrides",
            Stage::LoadingEnv => "loading_env",
            Stage::Resolving => "resolving",
            Stage::Normalizing => "normalizing",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Identifies the declared source that caused a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// Position in the declared source list.
    pub index: usize,
    /// Human-readable description, e.g. `file(config/app.yaml)`.
    pub descriptor: String,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.descriptor)
    }
}

/// Failure of a full load, pinpointing the stage and source.
#[derive(Debug)]
pub struct LoadError {
    stage: Stage,
    source_ref: Option<SourceRef>,
    error: ConfigError,
}

impl LoadError {
    pub(crate) fn new(stage: Stage, source_ref: Option<SourceRef>, error: ConfigError) -> Self {
        Self {
            stage,
            source_ref,
            error,
        }
    }

    /// Stage that was running when the load failed.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Source being processed, if the failure is tied to one.
    pub fn source_ref(&self) -> Option<&SourceRef> {
        self.source_ref.as_ref()
    }

    /// Key path involved in the failure, if any.
    pub fn path(&self) -> Option<&str> {
        self.error.path()
    }

    /// Underlying component error.
    pub fn kind(&self) -> &ConfigError {
        &self.error
    }

    /// Consume and return the underlying component error.
    pub fn into_kind(self) -> ConfigError {
        self.error
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config load failed in stage {}", self.stage)?;
        if let Some(source_ref) = &self.source_ref {
            write!(f, " (source {source_ref})")?;
        }
        if let Some(path) = self.error.path() {
            write!(f, " at {path}")?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
