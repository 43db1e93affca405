use artifact_sync::load_config::{load_config, load_file_config, local_store_from_env, remote_from_env};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const REMOTE_VARS: [&str; 6] = [
    "ARTIFACT_BUCKET",
    "ARTIFACT_PREFIX",
    "ARTIFACT_ENDPOINT_URL",
    "ARTIFACT_LOCAL_STORE",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
];

fn clear_remote_env() {
    for var in REMOTE_VARS {
        env::remove_var(var);
    }
}

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn test_remote_defaults_without_environment() {
    clear_remote_env();

    let remote = remote_from_env();
    assert_eq!(remote.bucket, "mlops-pipeline-artifacts");
    assert_eq!(remote.prefix(), "");
    assert_eq!(remote.region, "us-east-1");
    assert_eq!(remote.endpoint_url, None);
    assert_eq!(local_store_from_env(), None);
}

#[test]
#[serial]
fn test_remote_from_environment() {
    clear_remote_env();
    env::set_var("ARTIFACT_BUCKET", "team-artifacts");
    env::set_var("ARTIFACT_PREFIX", "/churn/v2");
    env::set_var("AWS_DEFAULT_REGION", "eu-west-1");
    env::set_var("ARTIFACT_ENDPOINT_URL", "http://localhost:9000");
    env::set_var("ARTIFACT_LOCAL_STORE", "/tmp/store");

    let remote = remote_from_env();
    assert_eq!(remote.bucket, "team-artifacts");
    assert_eq!(remote.prefix(), "churn/v2/");
    assert_eq!(remote.region, "eu-west-1");
    assert_eq!(remote.endpoint_url.as_deref(), Some("http://localhost:9000"));
    assert_eq!(local_store_from_env(), Some(PathBuf::from("/tmp/store")));

    // AWS_REGION wins over AWS_DEFAULT_REGION.
    env::set_var("AWS_REGION", "ap-south-1");
    assert_eq!(remote_from_env().region, "ap-south-1");
    clear_remote_env();
}

#[test]
#[serial]
fn test_load_config_without_file_uses_defaults() {
    clear_remote_env();
    let config = load_config(None, Path::new("workspace")).expect("Config should load");

    assert_eq!(config.pipeline, "dvc");
    assert_eq!(config.workspace_root, PathBuf::from("workspace"));
    assert_eq!(
        config.layout.dataset,
        PathBuf::from("data/interim/dataset_limpio_refactored.csv")
    );
    assert_eq!(config.layout.models.len(), 2);
    assert_eq!(config.layout.figure_exclude_extensions, vec!["md", "txt"]);
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
#[serial]
fn test_load_config_partial_yaml_keeps_other_defaults() {
    clear_remote_env();
    let file = config_file(
        r#"
pipeline: nightly
artifacts:
  dataset: data/processed/train.csv
  figure_exclude_extensions: [md, txt, html]
retry:
  max_attempts: 5
"#,
    );

    let config = load_config(Some(file.path()), Path::new(".")).expect("Config should load");
    assert_eq!(config.pipeline, "nightly");
    assert_eq!(config.layout.dataset, PathBuf::from("data/processed/train.csv"));
    assert_eq!(
        config.layout.metrics,
        PathBuf::from("reports/metrics/evaluation_metrics.json")
    );
    assert_eq!(config.layout.figure_exclude_extensions.len(), 3);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_ms, 500);
}

#[test]
#[serial]
fn test_empty_config_file_means_defaults() {
    let file = config_file("");
    let parsed = load_file_config(file.path()).expect("Empty file should load");
    assert_eq!(parsed.pipeline, None);
    assert_eq!(parsed.retry.max_attempts, 3);
}

#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    let file = config_file("not-yaml: [:::");
    let err = load_config(Some(file.path()), Path::new(".")).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn test_load_config_rejects_unknown_keys() {
    let file = config_file("artefacts:\n  dataset: x.csv\n");
    assert!(load_config(Some(file.path()), Path::new(".")).is_err());
}

#[test]
#[serial]
fn test_load_config_rejects_zero_attempts() {
    let file = config_file("retry:\n  max_attempts: 0\n");
    let err = load_config(Some(file.path()), Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
#[serial]
fn test_load_config_errors_for_missing_file() {
    let err = load_config(Some(Path::new("/nonexistent/artifacts.yaml")), Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn test_load_config_rejects_misspelt_nested_keys() {
    let file = config_file("artifacts:\n  figures_directory: out/figs\n  dataset_path: x.csv\n");
    let err = load_config(Some(file.path()), Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("unknown field"), "got: {err}");

    let file = config_file("retry:\n  max_retries: 9\n");
    assert!(load_config(Some(file.path()), Path::new(".")).is_err());
}
