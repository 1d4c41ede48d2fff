//! End-to-end behavior of the public API.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use strata_rs_config::{
    ConfigError, ConfigLoader, ConfigTree, EnvSelector, EnvSource, FieldError, LoadPolicy,
    MergePolicy, NormalizePolicy, ResolveContext, ResolverPolicy, SectionRegistry, Source,
    Stage, get, merge, resolve_with_env, set,
};
use strata_rs_test_utils::{RecordingValidator, env_snapshot, write_fixture};
use tempfile::TempDir;

fn tree(value: Value) -> ConfigTree {
    ConfigTree::from_value(value).expect("tree")
}

#[test]
fn deep_and_shallow_merge() {
    let base = tree(json!({"a": {"b": 1, "c": 2}}));
    let deep = merge(&base, &tree(json!({"a": {"b": 9, "d": 3}})), &MergePolicy::default());
    assert_eq!(deep.as_value(), &json!({"a": {"b": 9, "c": 2, "d": 3}}));

    let shallow_policy = MergePolicy {
        deep: false,
        ..MergePolicy::default()
    };
    let shallow = merge(&base, &tree(json!({"a": {"d": 3}})), &shallow_policy);
    assert_eq!(shallow.as_value(), &json!({"a": {"d": 3}}));
    assert_eq!(base.as_value(), &json!({"a": {"b": 1, "c": 2}}));
}

#[test]
fn merge_sequence_keeps_last_definition() {
    let trees = [
        json!({"x": 1, "n": {"a": 1}}),
        json!({"n": {"b": 2}}),
        json!({"x": 3, "n": {"a": 4}}),
    ];
    let merged = strata_rs_config::merge::merge_sequence(trees.iter(), &MergePolicy::default());
    assert_eq!(merged, json!({"x": 3, "n": {"a": 4, "b": 2}}));
}

#[test]
fn get_and_set_on_loaded_tree() {
    let config = ConfigLoader::new(LoadPolicy::default())
        .with_env(env_snapshot(&[]))
        .load(&[Source::map(json!({"db": {"host": "localhost"}}))])
        .expect("load");
    let mut runtime = config.into_tree();
    set(&mut runtime, "db__port", json!(5432)).expect("set");
    assert_eq!(get(&runtime, "db.port", Value::Null).expect("get"), json!(5432));
    assert_eq!(
        get(&runtime, "db.user", json!("admin")).expect("get"),
        json!("admin")
    );
}

#[test]
fn reference_resolution_examples() {
    let env = env_snapshot(&[]);
    let context = ResolveContext::new();
    let policy = ResolverPolicy::default();

    let simple = resolve_with_env(
        &tree(json!({"host": "api.com", "url": "${host}:443"})),
        &policy,
        &env,
        &context,
    )
    .expect("resolve");
    assert_eq!(
        simple.as_value(),
        &json!({"host": "api.com", "url": "api.com:443"})
    );

    let recursive = resolve_with_env(
        &tree(json!({
            "config": {"base": "https://api.com"},
            "path": "${config__base}/v1",
            "url": "${path}/users"
        })),
        &policy,
        &env,
        &context,
    )
    .expect("resolve");
    assert_eq!(
        recursive.get_strict("url").expect("url"),
        json!("https://api.com/v1/users")
    );

    let again = resolve_with_env(&recursive, &policy, &env, &context).expect("resolve");
    assert_eq!(again, recursive);
}

#[test]
fn cycles_fail_strict_and_degrade_lenient() {
    let env = env_snapshot(&[]);
    let context = ResolveContext::new();
    let cyclic = tree(json!({"a": "${b}", "b": "${a}"}));

    let err = resolve_with_env(&cyclic, &ResolverPolicy::strict(), &env, &context).unwrap_err();
    assert!(matches!(err, ConfigError::CircularReference { .. }));

    let lenient =
        resolve_with_env(&cyclic, &ResolverPolicy::default(), &env, &context).expect("resolve");
    assert_eq!(lenient, cyclic);
}

#[test]
fn file_pipeline_with_overrides_env_and_validation() {
    let temp = TempDir::new().expect("tmp");
    let base = write_fixture(
        temp.path(),
        "config/base.yaml",
        "image:\n  max_width: 1024\n  format: jpg\n  output: \"${env__OUT_DIR:/tmp}/{{job}}\"\n",
    );
    let tuning = write_fixture(
        temp.path(),
        "config/tuning.json5",
        "{ max_width: 2048, new_field: 'x' }",
    );
    let env = env_snapshot(&[("OUT_DIR", "/data"), ("UNRELATED", "1")]);
    let mut context = ResolveContext::new();
    context.insert("job".to_string(), json!("nightly"));

    let config = ConfigLoader::new(LoadPolicy {
        normalize: NormalizePolicy {
            drop_blanks: true,
            ..NormalizePolicy::default()
        },
        ..LoadPolicy::default()
    })
    .with_env(env)
    .with_context(context)
    .load(&[
        Source::file(&base),
        Source::override_file(&tuning).in_section("image"),
        Source::env(EnvSource::new(EnvSelector::Names(vec![
            "OUT_DIR".to_string(),
        ]))),
        Source::file(temp.path().join("config/local.yaml")).optional(),
    ])
    .expect("load");

    assert_eq!(
        config.section("image"),
        Some(&json!({"max_width": 2048, "format": "jpg", "output": "/data/nightly"}))
    );
    assert_eq!(config.section("env"), Some(&json!({"OUT_DIR": "/data"})));
    assert_eq!(config.warnings().len(), 1);
    assert_eq!(config.trace().last(), Some(&Stage::Ready));

    struct ImageConfig;
    let registry = SectionRegistry::new().allow_heuristic(true);
    let (validator, seen) = RecordingValidator::new();
    config
        .validate_as::<ImageConfig, _>(&registry, &validator)
        .expect("valid");
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0]["max_width"], json!(2048));
}

#[test]
fn validator_rejection_is_a_validation_failure() {
    let config = ConfigLoader::new(LoadPolicy::default())
        .with_env(env_snapshot(&[]))
        .load(&[Source::map(json!({"ocr": {"lang": "xx"}}))])
        .expect("load");
    let (validator, _) =
        RecordingValidator::rejecting(vec![FieldError::new("lang", "unsupported language")]);
    let err = config.validate_with(Some("ocr"), &validator).unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation failed for ocr: lang: unsupported language"
    );
}
