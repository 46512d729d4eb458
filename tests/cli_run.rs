//! End-to-end CLI runs via the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture_path() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/mock_server.sh")
        .to_string_lossy()
        .to_string()
}

fn write_config(dir: &std::path::Path) -> PathBuf {
    let config = serde_json::json!({
        "name": "mock",
        "command": "sh",
        "args": [fixture_path()]
    });
    let path = dir.join("aegis.config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

const PASSING_SUITE: &str = r#"
description: "mock server happy path"
tests:
  - it: "lists the read_file tool"
    request:
      jsonrpc: "2.0"
      id: 1
      method: tools/list
      params: {}
    expect:
      response:
        match:partial:
          result:
            tools: "match:arrayContains:name:read_file"
      stderr: toBeEmpty
"#;

const FAILING_SUITE: &str = r#"
description: "mock server failing expectations"
tests:
  - it: "expects a tool that does not exist"
    request:
      jsonrpc: "2.0"
      id: 1
      method: tools/list
      params: {}
    expect:
      response:
        match:partial:
          result:
            tools: "match:arrayContains:name:missing_tool"
"#;

#[test]
fn passing_run_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    std::fs::write(dir.path().join("suite.test.yml"), PASSING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("suite.test.yml")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ PASS"))
        .stdout(predicate::str::contains("All tests passed"));
}

#[test]
fn failing_run_exits_one_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    std::fs::write(dir.path().join("suite.test.yml"), FAILING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("suite.test.yml")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ FAIL"))
        .stdout(predicate::str::contains("arrayContains"));
}

#[test]
fn early_exit_server_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = serde_json::json!({
        "name": "dies",
        "command": "sh",
        "args": ["-c", "exit 1"]
    });
    std::fs::write(
        dir.path().join("aegis.config.json"),
        serde_json::to_string(&config).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("suite.test.yml"), PASSING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("suite.test.yml")
        .assert()
        .code(1);
}

#[test]
fn missing_config_reports_and_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("suite.test.yml"), PASSING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("suite.test.yml")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No configuration file found"));
}

#[test]
fn invalid_config_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("aegis.config.json"),
        r#"{"name": "x", "command": "sh"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("suite.test.yml"), PASSING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("suite.test.yml")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("args"));
}

#[test]
fn conductor_config_name_also_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let config = serde_json::json!({
        "name": "mock",
        "command": "sh",
        "args": [fixture_path()]
    });
    std::fs::write(
        dir.path().join("conductor.config.json"),
        serde_json::to_string(&config).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("suite.test.yml"), PASSING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("suite.test.yml")
        .assert()
        .success();
}

#[test]
fn no_matching_files_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("nope/**/*.yml")
        .assert()
        .success()
        .stdout(predicate::str::contains("No test files matched."));
}

#[test]
fn filter_selects_tests_by_name() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    std::fs::write(dir.path().join("suite.test.yml"), PASSING_SUITE).unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .args(["suite.test.yml", "--filter", "read_file"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ PASS"));

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .args(["suite.test.yml", "--filter", "nothing matches this"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Filter matched no suites or tests."));
}

#[test]
fn query_lists_tools() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path());

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .args(["query", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("read_file"))
        .stdout(predicate::str::contains("get_sfcc_class_info"));
}

#[test]
fn query_calls_a_tool() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path());

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .args(["query", "read_file", "{\"path\": \"f.txt\"}", "--json", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"text\": \"ok\""));
}

#[test]
fn init_scaffolds_config_and_example() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    assert!(dir.path().join("aegis.config.json").exists());
    assert!(dir.path().join("tests/example.test.yml").exists());
}

#[test]
fn help_exits_zero() {
    Command::cargo_bin("mcp-aegis")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("conformance tester"));
}
