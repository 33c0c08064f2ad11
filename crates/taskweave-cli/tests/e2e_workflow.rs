//! End-to-end CLI workflow: init, projects, tasks with dependencies,
//! comments, catch-up reads, and rebuild.
//!
//! Each test runs `tw` as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn tw_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tw"));
    cmd.current_dir(dir);
    cmd.env("TASKWEAVE_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn init(dir: &Path) {
    tw_cmd(dir).args(["init", "--json"]).assert().success();
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = tw_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("tw should not crash");
    assert!(
        output.status.success(),
        "tw {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}

fn create_project(dir: &Path, name: &str) -> String {
    id_of(&json_of(dir, &["project", "create", "--name", name]))
}

fn create_task(dir: &Path, project: &str, title: &str, deps: &[&str]) -> String {
    let mut args = vec!["task", "create", "--project", project, "--title", title];
    for dep in deps {
        args.push("--depends-on");
        args.push(dep);
    }
    id_of(&json_of(dir, &args))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().expect("temp dir");
    tw_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tw init"));
}

#[test]
fn init_twice_requires_force() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    tw_cmd(dir.path())
        .args(["init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    tw_cmd(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn project_lifecycle_and_history() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());

    let project = create_project(dir.path(), "Roadmap");
    let updated = json_of(
        dir.path(),
        &["project", "update", &project, "--description", "Q3 plan"],
    );
    assert_eq!(updated["name"], "Roadmap");
    assert_eq!(updated["description"], "Q3 plan");

    let listed = json_of(dir.path(), &["project", "list"]);
    assert_eq!(listed.as_array().expect("array").len(), 1);

    let history = json_of(dir.path(), &["project", "history", &project]);
    let versions: Vec<i64> = history
        .as_array()
        .expect("array")
        .iter()
        .map(|e| e["version"].as_i64().expect("version"))
        .collect();
    assert_eq!(versions, vec![1, 2]);

    json_of(dir.path(), &["project", "delete", &project]);
    tw_cmd(dir.path())
        .args(["project", "show", &project, "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2002"));
}

#[test]
fn cycle_is_rejected_with_code() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Roadmap");
    let t1 = create_task(dir.path(), &project, "Design", &[]);
    let t2 = create_task(dir.path(), &project, "Build", &[&t1]);

    tw_cmd(dir.path())
        .args(["task", "update", &t1, "--depends-on", &t2, "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));

    let t1_after = json_of(dir.path(), &["task", "show", &t1]);
    assert_eq!(t1_after["dependencies"], serde_json::json!([]));
    assert_eq!(t1_after["version"], 1);
}

#[test]
fn deleting_a_dependency_leaves_a_stale_reference() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Roadmap");
    let t1 = create_task(dir.path(), &project, "Design", &[]);
    let t2 = create_task(dir.path(), &project, "Build", &[&t1]);

    json_of(dir.path(), &["task", "delete", &t1]);

    let invalid = json_of(dir.path(), &["task", "invalid-deps", &t2]);
    assert_eq!(invalid["invalidDependencies"], serde_json::json!([t1]));

    let shown = json_of(dir.path(), &["task", "show", &t2]);
    assert_eq!(shown["dependencies"], serde_json::json!([t1]));
}

#[test]
fn task_update_patches_only_given_fields() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Board");
    let task = id_of(&json_of(
        dir.path(),
        &[
            "task", "create", "--project", &project, "--title", "Ship", "--priority", "high",
            "--tag", "ui",
        ],
    ));

    let updated = json_of(dir.path(), &["task", "update", &task, "--status", "review"]);
    assert_eq!(updated["status"], "review");
    assert_eq!(updated["configuration"]["priority"], "high");
    assert_eq!(updated["configuration"]["tags"], serde_json::json!(["ui"]));
    assert_eq!(updated["version"], 2);

    let cleared = json_of(dir.path(), &["task", "update", &task, "--clear-tags"]);
    assert_eq!(cleared["configuration"]["tags"], serde_json::json!([]));
}

#[test]
fn comments_survive_task_deletion() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Roadmap");
    let task = create_task(dir.path(), &project, "Design", &[]);

    json_of(dir.path(), &["comment", "add", &task, "first", "--author", "ana"]);
    json_of(dir.path(), &["comment", "add", &task, "second", "--author", "bo"]);
    json_of(dir.path(), &["task", "delete", &task]);

    let comments = json_of(dir.path(), &["comment", "list", &task]);
    let contents: Vec<&str> = comments
        .as_array()
        .expect("array")
        .iter()
        .map(|c| c["content"].as_str().expect("content"))
        .collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[test]
fn sync_and_feed_cover_the_whole_project() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Roadmap");
    let task = create_task(dir.path(), &project, "Design", &[]);
    json_of(dir.path(), &["comment", "add", &task, "hi", "--author", "ana"]);

    let events = json_of(dir.path(), &["sync", &project]);
    let types: Vec<&str> = events
        .as_array()
        .expect("array")
        .iter()
        .map(|e| e["eventType"].as_str().expect("eventType"))
        .collect();
    assert_eq!(types, vec!["PROJECT_CREATED", "TASK_CREATED", "COMMENT_ADDED"]);

    let feed = json_of(dir.path(), &["feed", &project]);
    let changes: Vec<&str> = feed
        .as_array()
        .expect("array")
        .iter()
        .map(|e| e["changeType"].as_str().expect("changeType"))
        .collect();
    assert_eq!(changes, vec!["CREATED", "CREATED", "CREATED"]);
}

#[test]
fn rebuild_reports_replayed_events() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Roadmap");
    create_task(dir.path(), &project, "Design", &[]);

    let report = json_of(dir.path(), &["rebuild"]);
    assert_eq!(report["eventCount"], 2);
    assert_eq!(report["projectCount"], 1);
    assert_eq!(report["taskCount"], 1);
}

#[test]
fn text_output_is_tab_separated() {
    let dir = TempDir::new().expect("temp dir");
    init(dir.path());
    let project = create_project(dir.path(), "Roadmap");
    create_task(dir.path(), &project, "Design", &[]);

    tw_cmd(dir.path())
        .args(["task", "list", "--project", &project, "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\ttodo\tmedium\tDesign"));
}

#[test]
fn completions_generate_script() {
    let dir = TempDir::new().expect("temp dir");
    tw_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tw"));
}
