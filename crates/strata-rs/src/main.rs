//! Command-line front end for the Strata resolution engine.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use log::{debug, warn};
use serde_json::Value;
use strata_rs::config::{
    ConfigLoader, EnvSelector, EnvSource, LoadPolicy, NormalizePolicy, ResolveContext,
    ResolverPolicy, Source,
};

/// Command-line options for the `strata` binary.
#[derive(Parser)]
#[command(name = "strata", version, about = "Resolve layered configuration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge sources, resolve placeholders, and print the result as JSON
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// Base config file, in order; `SECTION=PATH` nests it under SECTION
    #[arg(long = "file", value_name = "[SECTION=]PATH")]
    files: Vec<String>,
    /// Base config file skipped with a warning when missing or unparsable
    #[arg(long = "optional-file", value_name = "[SECTION=]PATH")]
    optional_files: Vec<String>,
    /// Override file that may only change existing keys
    #[arg(long = "override", value_name = "[SECTION=]PATH")]
    overrides: Vec<String>,
    /// Load every environment variable into the env section
    #[arg(long)]
    env_all: bool,
    /// Load a single environment variable
    #[arg(long = "env", value_name = "NAME")]
    env_names: Vec<String>,
    /// Load environment variables matching a glob
    #[arg(long = "env-glob", value_name = "PATTERN")]
    env_globs: Vec<String>,
    /// Split environment names on `__` into nested keys
    #[arg(long)]
    nest_env: bool,
    /// Parse environment values that name config files
    #[arg(long)]
    expand_env_files: bool,
    /// Value for a `{{KEY}}` placeholder; VALUE is parsed as JSON when possible
    #[arg(long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,
    /// Fail on missing references, missing context keys, and cycles
    #[arg(long)]
    strict: bool,
    /// Remove null and empty values from the result
    #[arg(long)]
    drop_blanks: bool,
    /// Print only the value at this path
    #[arg(long, value_name = "PATH")]
    get: Option<String>,
}

fn main() -> anyhow::Result<()> {
    strata_rs::init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Resolve(args) => resolve(args),
    }
}

fn resolve(args: ResolveArgs) -> anyhow::Result<()> {
    let sources = build_sources(&args);
    let context = parse_context(&args.context)?;
    let policy = LoadPolicy {
        resolver: ResolverPolicy {
            strict: args.strict,
            ..ResolverPolicy::default()
        },
        normalize: NormalizePolicy {
            drop_blanks: args.drop_blanks,
            ..NormalizePolicy::default()
        },
        ..LoadPolicy::default()
    };
    debug!(
        "resolving from command line (sources={}, context_keys={})",
        sources.len(),
        context.len()
    );

    let config = ConfigLoader::new(policy)
        .with_context(context)
        .load(&sources)
        .context("failed to resolve configuration")?;
    for warning in config.warnings() {
        warn!("{warning}");
        eprintln!("warning: {warning}");
    }

    let output = match &args.get {
        Some(path) => config
            .get_strict(path)
            .with_context(|| format!("failed to read {path}"))?,
        None => config.into_tree().into_value(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_sources(args: &ResolveArgs) -> Vec<Source> {
    let mut sources = Vec::new();
    for raw in &args.files {
        sources.push(with_section(raw, |path| Source::file(path)));
    }
    for raw in &args.optional_files {
        sources.push(with_section(raw, |path| Source::file(path)).optional());
    }
    for raw in &args.overrides {
        sources.push(with_section(raw, |path| Source::override_file(path)));
    }

    let mut selectors = Vec::new();
    if args.env_all {
        selectors.push(EnvSelector::All);
    }
    if !args.env_names.is_empty() {
        selectors.push(EnvSelector::Names(args.env_names.clone()));
    }
    if !args.env_globs.is_empty() {
        selectors.push(EnvSelector::Matching(args.env_globs.clone()));
    }
    for selector in selectors {
        sources.push(Source::env(
            EnvSource::new(selector)
                .with_nest_keys(args.nest_env)
                .with_expand_files(args.expand_env_files),
        ));
    }
    sources
}

/// Build a source from `[SECTION=]PATH`.
fn with_section(raw: &str, build: impl Fn(&str) -> Source) -> Source {
    match split_section(raw) {
        (Some(section), path) => build(path).in_section(section),
        (None, path) => build(path),
    }
}

fn split_section(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once('=') {
        Some((section, path))
            if !section.is_empty() && !section.contains(['/', '\\', '.']) =>
        {
            (Some(section), path)
        }
        _ => (None, raw),
    }
}

fn parse_context(entries: &[String]) -> anyhow::Result<ResolveContext> {
    let mut context = ResolveContext::new();
    for entry in entries {
        let Some((key, raw)) = entry.split_once('=') else {
            bail!("context entries must be KEY=VALUE, got {entry:?}");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.trim().to_string(), value);
    }
    Ok(context)
}
