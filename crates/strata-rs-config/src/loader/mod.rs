//! Layered configuration loader.
//!
//! Runs declared sources through a fixed sequence of stages: base sources
//! (typed defaults, files, maps) are merged in declared order, override
//! sources then tune keys those established, environment sources land in the
//! env section, and finally the tree is resolved once and normalized.
//! Any failure aborts the run with a [`LoadError`] naming the stage and source.

mod layer_io;
mod resolved;


pub use resolved::ResolvedConfig;

use crate::env::{EnvSnapshot, EnvSource};
use crate::error::{LoadError, SourceRef, Stage};
use crate::parser::{FormatParser, TreeParser};
use crate::policy::{LoadPolicy, MergePolicy};
use crate::resolver::{self, ResolveContext};
use crate::tree::{self, ConfigTree};
use crate::ConfigError;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Where a source's data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Defaults serialized from a typed model.
    TypedDefault(Value),
    /// A config file parsed by the parser collaborator.
    File(PathBuf),
    /// An in-memory map.
    Map(Value),
    /// An in-memory override payload.
    Override(Value),
    /// An override payload read from a file.
    OverrideFile(PathBuf),
    /// Selected environment variables.
    Env(EnvSource),
}

/// One declared config source.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    kind: SourceKind,
    section: Option<String>,
    optional: bool,
    merge: Option<MergePolicy>,
}

impl Source {
    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            section: None,
            optional: false,
            merge: None,
        }
    }

    /// Defaults taken from a serializable value.
    pub fn typed_default<T: Serialize>(defaults: &T) -> Result<Self, ConfigError> {
        Ok(Self::new(SourceKind::TypedDefault(serde_json::to_value(
            defaults,
        )?)))
    }

    /// A config file; the format comes from its extension.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(SourceKind::File(path.as_ref().to_path_buf()))
    }

    /// An in-memory map merged like a parsed file.
    pub fn map(value: Value) -> Self {
        Self::new(SourceKind::Map(value))
    }

    /// An in-memory override that may only change existing keys.
    pub fn override_map(value: Value) -> Self {
        Self::new(SourceKind::Override(value))
    }

    /// An override read from a config file.
    pub fn override_file(path: impl AsRef<Path>) -> Self {
        Self::new(SourceKind::OverrideFile(path.as_ref().to_path_buf()))
    }

    /// Environment variables, merged into the env section by default.
    pub fn env(source: EnvSource) -> Self {
        Self::new(SourceKind::Env(source))
    }

    /// Place the source's data under `section` (for env sources, instead of
    /// the policy's env section).
    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Skip the source with a warning if its file is missing or unparsable.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Merge this base source with its own policy.
    pub fn with_merge(mut self, policy: MergePolicy) -> Self {
        self.merge = Some(policy);
        self
    }

    /// Where the source's data comes from.
    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// Section the data is nested under, if any.
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Whether a missing or unparsable file is skipped.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Stage in which the loader processes this source.
    pub fn stage(&self) -> Stage {
        match self.kind {
            SourceKind::TypedDefault(_) | SourceKind::File(_) | SourceKind::Map(_) => {
                Stage::LoadingBase
            }
            SourceKind::Override(_) | SourceKind::OverrideFile(_) => Stage::LoadingOverrides,
            SourceKind::Env(_) => Stage::LoadingEnv,
        }
    }

    /// Human-readable description used in logs and errors.
    pub fn descriptor(&self) -> String {
        let base = match &self.kind {
            SourceKind::TypedDefault(_) => "typed_default".to_string(),
            SourceKind::File(path) => format!("file({})", path.display()),
            SourceKind::Map(_) => "map".to_string(),
            SourceKind::Override(_) => "override".to_string(),
            SourceKind::OverrideFile(path) => format!("override_file({})", path.display()),
            SourceKind::Env(source) => source.describe(),
        };
        match &self.section {
            Some(section) => format!("{base}[{section}]"),
            None => base,
        }
    }
}

/// Runs one load. Create a fresh loader per resolution.
pub struct ConfigLoader {
    policy: LoadPolicy,
    env: EnvSnapshot,
    parser: Box<dyn TreeParser>,
    context: ResolveContext,
    stage: Stage,
    trace: Vec<Stage>,
    warnings: Vec<String>,
    tree: ConfigTree,
    sections: BTreeSet<String>,
}

impl ConfigLoader {
    /// Loader reading the process environment as it is now.
    pub fn new(policy: LoadPolicy) -> Self {
        Self {
            policy,
            env: EnvSnapshot::from_process(),
            parser: Box::new(FormatParser),
            context: ResolveContext::new(),
            stage: Stage::Init,
            trace: vec![Stage::Init],
            warnings: Vec::new(),
            tree: ConfigTree::new(),
            sections: BTreeSet::new(),
        }
    }

    /// Read environment sources and `${NAME}` references from `env`.
    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    /// Use a different parser for file-backed sources.
    pub fn with_parser(mut self, parser: impl TreeParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Values for `{{name}}` placeholders.
    pub fn with_context(mut self, context: ResolveContext) -> Self {
        self.context = context;
        self
    }

    /// Stage the loader is currently in.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage over `sources`.
    pub fn load(mut self, sources: &[Source]) -> Result<ResolvedConfig, LoadError> {
        info!("loading config (sources={})", sources.len());
        match self.run(sources) {
            Ok(()) => {
                info!(
                    "config loaded (sections={}, warnings={})",
                    self.tree.sections().len(),
                    self.warnings.len()
                );
                Ok(ResolvedConfig::new(self.tree, self.warnings, self.trace))
            }
            Err(err) => {
                self.enter(Stage::Failed);
                warn!("config load failed (error={err})");
                Err(err)
            }
        }
    }

    fn run(&mut self, sources: &[Source]) -> Result<(), LoadError> {
        self.enter(Stage::LoadingBase);
        for (index, source) in staged(sources, Stage::LoadingBase) {
            self.load_base(index, source)?;
        }

        self.enter(Stage::LoadingOverrides);
        for (index, source) in staged(sources, Stage::LoadingOverrides) {
            self.load_override(index, source)?;
        }

        self.enter(Stage::LoadingEnv);
        for (index, source) in staged(sources, Stage::LoadingEnv) {
            self.load_env(index, source)?;
        }

        self.enter(Stage::Resolving);
        self.tree =
            resolver::resolve_with_env(&self.tree, &self.policy.resolver, &self.env, &self.context)
                .map_err(|err| LoadError::new(Stage::Resolving, None, err))?;

        self.enter(Stage::Normalizing);
        self.tree = self.tree.normalized(&self.policy.normalize);

        self.enter(Stage::Ready);
        Ok(())
    }

    fn enter(&mut self, stage: Stage) {
        debug!("config loader entering stage (from={}, to={stage})", self.stage);
        self.stage = stage;
        self.trace.push(stage);
    }

    fn load_base(&mut self, index: usize, source: &Source) -> Result<(), LoadError> {
        let value = match &source.kind {
            SourceKind::TypedDefault(value) | SourceKind::Map(value) => value.clone(),
            SourceKind::File(path) => match self.read_file(index, source, path)? {
                Some(value) => value,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        let value = match source.section() {
            Some(section) => {
                self.sections.insert(section.to_string());
                layer_io::nest_value(section, value)
            }
            None => {
                if !value.is_object() {
                    return Err(self.fail(index, source, ConfigError::NotAMap {
                        path: tree::ROOT_PATH.to_string(),
                    }));
                }
                self.sections.extend(tree::section_names(&value));
                value
            }
        };
        let policy = source.merge.as_ref().unwrap_or(&self.policy.merge);
        self.tree.merge_value(&value, policy);
        debug!(
            "merged base source (index={index}, source={}, deep={})",
            source.descriptor(),
            policy.deep
        );
        Ok(())
    }

    fn load_override(&mut self, index: usize, source: &Source) -> Result<(), LoadError> {
        let payload = match &source.kind {
            SourceKind::Override(value) => value.clone(),
            SourceKind::OverrideFile(path) => match self.read_file(index, source, path)? {
                Some(value) => value,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        let outcome = self
            .tree
            .apply_override(
                source.section(),
                &payload,
                &self.sections,
                &self.policy.overrides,
            )
            .map_err(|err| self.fail(index, source, err))?;
        debug!(
            "applied override source (index={index}, source={}, applied={}, dropped={})",
            source.descriptor(),
            outcome.applied.len(),
            outcome.dropped.len()
        );
        Ok(())
    }

    fn load_env(&mut self, index: usize, source: &Source) -> Result<(), LoadError> {
        let SourceKind::Env(env_source) = &source.kind else {
            return Ok(());
        };
        let collected = env_source
            .collect(&self.env, self.parser.as_ref())
            .map_err(|err| self.fail(index, source, err))?;
        let section = source
            .section()
            .unwrap_or(self.policy.env_section.as_str())
            .to_string();
        let count = collected.as_object().map_or(0, |vars| vars.len());
        // env content always wins over whatever the section already holds
        self.tree.merge_value(
            &layer_io::nest_value(&section, collected),
            &MergePolicy::default(),
        );
        debug!(
            "merged env source (index={index}, source={}, section={section}, vars={count})",
            source.descriptor()
        );
        Ok(())
    }

    /// Read a file source; `None` means an optional source was skipped.
    fn read_file(
        &mut self,
        index: usize,
        source: &Source,
        path: &Path,
    ) -> Result<Option<Value>, LoadError> {
        match layer_io::read_tree(path, self.parser.as_ref()) {
            Ok(value) => Ok(Some(value)),
            Err(err) if source.optional && layer_io::is_skippable(&err) => {
                let message = format!("skipped optional source {}: {err}", source.descriptor());
                warn!(
                    "skipping optional source (index={index}, source={}, reason={err})",
                    source.descriptor()
                );
                self.warnings.push(message);
                Ok(None)
            }
            Err(err) => Err(self.fail(index, source, err)),
        }
    }

    fn fail(&self, index: usize, source: &Source, err: ConfigError) -> LoadError {
        LoadError::new(
            self.stage,
            Some(SourceRef {
                index,
                descriptor: source.descriptor(),
            }),
            err,
        )
    }
}

/// Sources handled by `stage`, with their declared positions.
fn staged(sources: &[Source], stage: Stage) -> impl Iterator<Item = (usize, &Source)> {
    sources
        .iter()
        .enumerate()
        .filter(move |(_, source)| source.stage() == stage)
}

/// Run a full load with the process environment and no context.
pub fn load(sources: &[Source], policy: LoadPolicy) -> Result<ResolvedConfig, LoadError> {
    ConfigLoader::new(policy).load(sources)
}
