//! End-to-end tests for Hookwire CLI commands.
//!
//! These tests run the `hookwire` binary against real script files. Every
//! command gets its own data directory so the bundled prelude is installed
//! into a temp dir rather than the user's data dir.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary directory holding one script and a data dir.
struct TestScript {
    temp_dir: TempDir,
    script_path: PathBuf,
}

impl TestScript {
    fn new(filename: &str, source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let script_path = temp_dir.path().join(filename);
        fs::write(&script_path, source).expect("Failed to write script");

        Self {
            temp_dir,
            script_path,
        }
    }

    fn path(&self) -> &str {
        self.script_path.to_str().unwrap()
    }

    fn data_dir(&self) -> String {
        self.temp_dir.path().join("data").to_string_lossy().into_owned()
    }

    /// `hookwire <args..> --data-dir <tmp>`.
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("hookwire").expect("Failed to find hookwire binary");
        cmd.args(args).args(["--data-dir", &self.data_dir()]);
        cmd
    }
}

/// A script with helper functions and no hooks.
fn math_script() -> String {
    r#"
fn add(a, b) { a + b }

fn nothing() { }

fn greet(name, opts) { opts.greeting + ", " + name }

fn fails() { throw "boom"; }
"#
    .to_string()
}

/// A script implementing request interception and one editor tab.
fn hooks_script() -> String {
    r#"
fn request(msg) {
    msg.headers["X-Hooked"] = "1";
    msg
}

fn req_edit_in(msg) { msg.body }

fn req_edit_out(msg, text) {
    msg.body = text;
    msg
}

fn res_edit_in_raw(msg) { msg.body }

fn helper() { 1 }
"#
    .to_string()
}

// =============================================================================
// hookwire call Tests
// =============================================================================

#[test]
fn test_call_nonexistent_script() {
    Command::cargo_bin("hookwire")
        .expect("Failed to find hookwire binary")
        .args(["call", "/nonexistent/script.rhai", "add"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Script not found"));
}

#[test]
fn test_call_returns_json() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["call", script.path(), "add", "2", "3", "--allow-missing-hooks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5"));
}

#[test]
fn test_call_with_kwargs() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&[
            "call",
            script.path(),
            "greet",
            "bob",
            "--kwargs",
            r#"{"greeting": "hello"}"#,
            "--allow-missing-hooks",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello, bob"));
}

#[test]
fn test_call_unit_prints_empty() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["call", script.path(), "nothing", "--allow-missing-hooks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<empty>"));
}

#[test]
fn test_call_missing_function_fails() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["call", script.path(), "does_not_exist", "--allow-missing-hooks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not implemented"));
}

#[test]
fn test_call_script_error_fails() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["call", script.path(), "fails", "--allow-missing-hooks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("boom"));
}

#[test]
fn test_call_requires_hooks_by_default() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["call", script.path(), "add", "2", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start"));
}

#[test]
fn test_call_syntax_error_reports_startup_failure() {
    let script = TestScript::new("broken.rhai", "fn request(msg) { msg ");

    script
        .command(&["call", script.path(), "request", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start"))
        .stderr(predicate::str::contains("hint"));
}

#[test]
fn test_call_uses_prelude() {
    let script = TestScript::new("hooks.rhai", &hooks_script());

    script
        .command(&["call", script.path(), "request", r#"{"headers": {}, "body": "x"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("X-Hooked"));

    // The prelude was installed into the data dir.
    let prelude = PathBuf::from(script.data_dir()).join("framework").join("prelude.rhai");
    assert!(prelude.exists(), "prelude should be installed at {}", prelude.display());
}

// =============================================================================
// hookwire hooks Tests
// =============================================================================

#[test]
fn test_hooks_lists_functions_and_tabs() {
    let script = TestScript::new("hooks.rhai", &hooks_script());

    script
        .command(&["hooks", script.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("request(msg)"))
        .stdout(predicate::str::contains("helper()"))
        .stdout(predicate::str::contains("editable"))
        .stdout(predicate::str::contains("raw"))
        .stdout(predicate::str::contains("4"))
        .stdout(predicate::str::contains("hooks defined"));
}

// =============================================================================
// hookwire eval Tests
// =============================================================================

#[test]
fn test_eval_captures_print_and_result() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["eval", script.path(), r#"print("hi"); add(20, 22)"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("hi"))
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_eval_reports_errors_on_stderr() {
    let script = TestScript::new("math.rhai", &math_script());

    script
        .command(&["eval", script.path(), "fails()"])
        .assert()
        .success()
        .stderr(predicate::str::contains("boom"));
}

// =============================================================================
// hookwire serve Tests
// =============================================================================

fn responses(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("response should be JSON"))
        .collect()
}

#[test]
fn test_serve_answers_each_line() {
    let script = TestScript::new("math.rhai", &math_script());

    let input = [
        r#"{"fn":"add","args":[2,3]}"#,
        r#"{"type":"call","fn":"missing"}"#,
        "status",
        "disable",
        r#"{"type":"call","fn":"add","args":[1,1]}"#,
        "enable",
        "bogus",
    ]
    .join("\n");

    let output = script
        .command(&["serve", script.path(), "--allow-missing-hooks"])
        .write_stdin(input + "\n")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "serve failed: {}", String::from_utf8_lossy(&output.stderr));

    let responses = responses(&output.stdout);
    assert_eq!(responses.len(), 7);
    assert_eq!(responses[0]["type"], "value");
    assert_eq!(responses[0]["value"], 5);
    assert_eq!(responses[1]["type"], "empty");
    assert_eq!(responses[1]["reason"], "not_implemented");
    assert_eq!(responses[2]["type"], "status");
    assert_eq!(responses[2]["lifecycle"], "running");
    assert_eq!(responses[2]["enabled"], true);
    assert_eq!(responses[3]["type"], "ok");
    assert_eq!(responses[4]["type"], "empty");
    assert_eq!(responses[4]["reason"], "rejected");
    assert_eq!(responses[5]["type"], "ok");
    assert_eq!(responses[6]["type"], "error");
}

#[test]
fn test_serve_lists_callables() {
    let script = TestScript::new("hooks.rhai", &hooks_script());

    let output = script
        .command(&["serve", script.path()])
        .write_stdin("callables\n")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let responses = responses(&output.stdout);
    assert_eq!(responses.len(), 1);
    let names: Vec<&str> = responses[0]["callables"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"request"));
    assert!(names.contains(&"req_edit_in"));
}

#[test]
fn test_serve_reload_keeps_answering() {
    let script = TestScript::new("math.rhai", &math_script());

    let input = [
        r#"{"fn":"add","args":[1,2]}"#,
        "reload",
        r#"{"fn":"add","args":[3,4]}"#,
    ]
    .join("\n");

    let output = script
        .command(&["serve", script.path(), "--allow-missing-hooks"])
        .write_stdin(input + "\n")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let responses = responses(&output.stdout);
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["value"], 3);
    assert_eq!(responses[1]["type"], "ok");
    // Queued during the reload, the call waits for the new interpreter.
    assert_eq!(responses[2]["value"], 7);
}
