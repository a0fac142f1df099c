mod common;

use common::*;
use chain_runner::chain::{HttpAuthConfig, RecorderConfig};
use chain_runner::prelude::*;

#[test]
fn test_default_runner_config() {
    let config = RunnerConfig::default();
    assert_eq!(config.parallel, 4);
    assert_eq!(config.recorder, RecorderConfig::Memory);
    assert!(config.http.auth.is_none());
    assert_eq!(config.limits.max_steps, None);
}

#[test]
fn test_load_minimal_config() {
    let dir = create_test_dir();
    write_runner_config(dir.path(), "parallel: 8");

    let config = RunnerConfig::load(dir.path().join("runner.yaml")).unwrap();
    assert_eq!(config.parallel, 8);
    assert!(config.http.follow_redirects);
}

#[test]
fn test_load_full_config() {
    let dir = create_test_dir();
    write_runner_config(
        dir.path(),
        r#"
parallel: 16
http:
  user_agent: chain-runner-tests
  follow_redirects: false
  headers:
    X-Env: ci
  auth:
    type: basic
    username: admin
    password: hunter2
limits:
  max_steps: 50
  max_retry_count: 3
  max_step_timeout: 10000
  max_chain_timeout: 120000
recorder:
  type: json_dir
  path: out/runs
"#,
    );

    let config = RunnerConfig::load(dir.path().join("runner.yaml")).unwrap();
    assert_eq!(config.parallel, 16);
    assert!(!config.http.follow_redirects);
    assert_eq!(config.http.headers["X-Env"], "ci");
    assert!(matches!(
        config.http.auth,
        Some(HttpAuthConfig::Basic { ref username, .. }) if username == "admin"
    ));
    assert_eq!(config.limits.max_chain_timeout, Some(120000));
    assert_eq!(
        config.recorder,
        RecorderConfig::JsonDir {
            path: "out/runs".to_string()
        }
    );
}

#[test]
fn test_disabled_recorder() {
    let config: RunnerConfig = serde_yaml::from_str("recorder:\n  type: none\n").unwrap();
    assert_eq!(config.recorder, RecorderConfig::Disabled);
}

#[test]
fn test_load_invalid_config() {
    let dir = create_test_dir();
    write_runner_config(dir.path(), "parallel: [not a number");

    let result = RunnerConfig::load(dir.path().join("runner.yaml"));
    assert!(matches!(result, Err(LoadError::Yaml { .. })));
}

#[test]
fn test_load_missing_config() {
    let dir = create_test_dir();
    let result = RunnerConfig::load(dir.path().join("runner.yaml"));
    assert!(matches!(result, Err(LoadError::Io(_))));
}

#[tokio::test]
async fn test_limits_enforced_by_executor() {
    let dir = create_test_dir();
    write_runner_config(dir.path(), "limits:\n  max_retry_count: 1\nrecorder:\n  type: none\n");
    let config = RunnerConfig::load(dir.path().join("runner.yaml")).unwrap();

    let executor = ChainExecutor::from_config(&config).unwrap();
    let err = executor
        .run_yaml(
            r#"
name: greedy
steps:
  - order: 1
    url: http://127.0.0.1:1/
    retry_count: 5
"#,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Config(_)));
}
