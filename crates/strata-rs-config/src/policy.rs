//! Policies controlling merge, resolution, overrides, and normalization.

use crate::keypath::DEFAULT_SEPARATOR;

/// How two trees are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    /// Recurse into nested maps instead of replacing whole top-level values.
    pub deep: bool,
    /// Mutate the receiver as well as returning the merged tree.
    pub inplace: bool,
    /// Replace lists outright; when false a patch list is appended.
    pub overwrite_lists: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            deep: true,
            inplace: false,
            overwrite_lists: true,
        }
    }
}

/// Which scope a bare `${NAME}` reference consults first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvPrecedence {
    /// Look in the tree, then the environment.
    #[default]
    TreeFirst,
    /// Look in the environment, then the tree.
    EnvFirst,
}

/// Placeholder syntax and failure behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Separator for internal reference paths.
    pub separator: String,
    /// Fall back to `.` when a reference does not contain `separator`.
    pub dot_fallback: bool,
    /// Re-resolve substituted strings that contain further placeholders.
    pub recursive: bool,
    /// Raise on missing paths, missing context keys, and cycles.
    pub strict: bool,
    /// Allow `${NAME}` to read the environment.
    pub enable_env: bool,
    /// Substitute `{{name}}` from the caller context.
    pub enable_context: bool,
    /// Lookup order for separator-free references.
    pub env_precedence: EnvPrecedence,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            dot_fallback: true,
            recursive: true,
            strict: false,
            enable_env: true,
            enable_context: true,
            env_precedence: EnvPrecedence::TreeFirst,
        }
    }
}

impl ResolverPolicy {
    /// Default policy with `strict` enabled.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Legality rules for override sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePolicy {
    /// Reject overrides naming a section no base source established.
    pub require_base_section: bool,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            require_base_section: true,
        }
    }
}

/// Case applied to keys during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCase {
    #[default]
    Preserve,
    Lower,
    Upper,
}

/// Final clean-up applied after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizePolicy {
    /// Drop null, empty-string, empty-list, and empty-map values.
    pub drop_blanks: bool,
    pub key_case: KeyCase,
    /// Strip surrounding whitespace from keys.
    pub trim_keys: bool,
}

impl NormalizePolicy {
    /// Whether any key rewriting is requested.
    pub fn rewrites_keys(&self) -> bool {
        self.trim_keys || self.key_case != KeyCase::Preserve
    }
}

/// Reserved section receiving environment sources.
pub const DEFAULT_ENV_SECTION: &str = "env";

/// Everything a single `ConfigLoader` run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPolicy {
    /// Policy for base sources; a source may carry its own.
    pub merge: MergePolicy,
    pub resolver: ResolverPolicy,
    pub overrides: OverridePolicy,
    pub normalize: NormalizePolicy,
    /// Section that environment sources merge into.
    pub env_section: String,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            merge: MergePolicy::default(),
            resolver: ResolverPolicy::default(),
            overrides: OverridePolicy::default(),
            normalize: NormalizePolicy::default(),
            env_section: DEFAULT_ENV_SECTION.to_string(),
        }
    }
}
