mod common;

use common::*;
use std::fs;
use chain_runner::chain::{BodyTemplate, HttpMethod};
use chain_runner::prelude::*;

#[test]
fn test_load_empty_directory() {
    let dir = create_test_dir();
    let chains = ChainLoader::load_directory(dir.path()).unwrap();
    assert!(chains.is_empty());
}

#[test]
fn test_load_mixed_extensions() {
    let dir = create_test_dir();
    write_chain(dir.path(), "a.yaml", &simple_chain("chain-a", "https://api.test/a"));
    write_chain(dir.path(), "b.yml", &simple_chain("chain-b", "https://api.test/b"));

    let chains = ChainLoader::load_directory(dir.path()).unwrap();

    let names: Vec<_> = chains.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["chain-a", "chain-b"]);
}

#[test]
fn test_skip_non_chain_entries() {
    let dir = create_test_dir();
    write_chain(dir.path(), "chain.yaml", &simple_chain("chain", "https://api.test"));
    write_chain(dir.path(), "README.md", "# docs");
    write_runner_config(dir.path(), "parallel: 2");
    fs::create_dir(dir.path().join("nested")).unwrap();
    write_chain(
        &dir.path().join("nested"),
        "inner.yaml",
        &simple_chain("inner", "https://api.test"),
    );

    let chains = ChainLoader::load_directory(dir.path()).unwrap();

    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].name, "chain");
}

#[test]
fn test_load_file_missing_required_field() {
    let dir = create_test_dir();
    write_chain(
        dir.path(),
        "no-url.yaml",
        r#"
name: no-url
steps:
  - order: 1
"#,
    );

    let result = ChainLoader::load_file(&dir.path().join("no-url.yaml"));
    assert!(matches!(result, Err(LoadError::Yaml { .. })));
}

#[test]
fn test_load_file_unsupported_method() {
    let dir = create_test_dir();
    write_chain(
        dir.path(),
        "trace.yaml",
        r#"
name: trace
steps:
  - order: 1
    method: TRACE
    url: https://api.test
"#,
    );

    let err = ChainLoader::load_file(&dir.path().join("trace.yaml")).unwrap_err();
    assert!(err.to_string().contains("trace.yaml"));
}

#[test]
fn test_load_directory_with_invalid_file() {
    let dir = create_test_dir();
    write_chain(dir.path(), "good.yaml", &simple_chain("good", "https://api.test"));
    write_chain(dir.path(), "bad.yaml", "steps: {{{");

    assert!(ChainLoader::load_directory(dir.path()).is_err());
}

#[test]
fn test_load_chain_with_all_fields() {
    let dir = create_test_dir();
    write_chain(
        dir.path(),
        "full.yaml",
        r#"
name: full
description: Every field set
stop_on_failure: false
timeout: 60000
steps:
  - order: 10
    name: Create
    method: post
    url: "{{base}}/items"
    headers:
      X-Trace: "{{trace_id}}"
    query:
      dry_run: "false"
    body:
      name: widget
      tags: [a, b]
    timeout: 5000
    retry_count: 2
    retry_delay: 250
    continue_on_failure: true
    if: "$prev.status == 'success'"
    success_status: [200, 201]
    extract:
      item_id: body.id
      etag:
        from: headers.etag
        required: true
  - order: 20
    method: DELETE
    url: "{{base}}/items/{{item_id}}"
    body: "raw text"
    enabled: false
"#,
    );

    let chain = ChainLoader::load_file(&dir.path().join("full.yaml")).unwrap();

    assert_eq!(chain.description.as_deref(), Some("Every field set"));
    assert!(!chain.stop_on_failure);
    assert_eq!(chain.timeout, Some(60000));

    let create = &chain.steps[0];
    assert_eq!(create.method, HttpMethod::Post);
    assert_eq!(create.retry_count, 2);
    assert_eq!(create.retry_delay, 250);
    assert!(create.continue_on_failure);
    assert_eq!(create.success_status, Some(vec![200, 201]));
    assert!(matches!(create.body, Some(BodyTemplate::Json(_))));
    assert!(create.extract["etag"].required);
    assert!(!create.extract["item_id"].required);

    let delete = &chain.steps[1];
    assert!(!delete.is_enabled);
    assert_eq!(delete.timeout, 30000);
    assert!(matches!(delete.body, Some(BodyTemplate::Text(_))));

    assert!(prepare(&chain, &PlanLimits::default()).is_ok());
}

#[test]
fn test_load_unicode_in_chain() {
    let dir = create_test_dir();
    write_chain(
        dir.path(),
        "unicode.yaml",
        r#"
name: "注文フロー"
steps:
  - order: 1
    name: "Créer 🚀"
    url: https://api.test
"#,
    );

    let chain = ChainLoader::load_file(&dir.path().join("unicode.yaml")).unwrap();
    assert_eq!(chain.name, "注文フロー");
    assert_eq!(chain.steps[0].display_name(), "Créer 🚀");
}
