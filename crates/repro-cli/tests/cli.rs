use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn repro(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repro"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn repro")
}

fn runner(root: &Path, node: &str, body: &str) {
    let dir = root.join(node);
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("evaluation_script.sh"), format!("#!/bin/bash\n{body}\n")).expect("write");
}

#[test]
fn runner_failure_sets_the_exit_code() {
    let temp = tempdir().expect("temp");
    runner(temp.path(), "misc/a", "exit 3");
    let root = temp.path().to_str().expect("utf8");

    let output = repro(&["run", "--root", root]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("FAILED misc/a exit=3"), "stderr: {stderr}");
}

#[test]
fn keep_going_exits_cleanly() {
    let temp = tempdir().expect("temp");
    runner(temp.path(), "misc/a", "exit 3");
    runner(temp.path(), "misc/b", "echo ok > report.csv");
    let root = temp.path().to_str().expect("utf8");

    let output = repro(&["run", "--root", root, "--keep-going"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("failed 1"), "stdout: {stdout}");
    assert!(temp.path().join("runs/misc/misc__b/report.csv").is_file());
}

#[test]
fn dry_run_prints_the_plan_only() {
    let temp = tempdir().expect("temp");
    runner(temp.path(), "misc/a", "echo ran > marker");
    let root = temp.path().to_str().expect("utf8");

    let output = repro(&["run", "--root", root, "--dry-run"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1/1] misc/a"), "stdout: {stdout}");
    assert!(!temp.path().join("runs").exists());
    assert!(!temp.path().join("misc/a/marker").exists());
}

#[test]
fn discover_lists_nodes_as_json() {
    let temp = tempdir().expect("temp");
    runner(temp.path(), "misc/a", "true");
    runner(temp.path(), "real_world_experiments/citi_bike/query0", "true");
    let root = temp.path().to_str().expect("utf8");

    let output = repro(&["discover", "--root", root, "--json"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"id\": \"misc/a\""), "stdout: {stdout}");
    assert!(stdout.contains("\"cohort\": \"citi_bike\""), "stdout: {stdout}");
}

#[test]
fn config_prints_the_effective_tables() {
    let temp = tempdir().expect("temp");
    fs::write(
        temp.path().join("repro.toml"),
        "[tools]\nlatex = \"lualatex\"\n",
    )
    .expect("write config");
    let root = temp.path().to_str().expect("utf8");

    let output = repro(&["config", "--root", root]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("latex = \"lualatex\""), "stdout: {stdout}");
    assert!(stdout.contains("pdf_merge = \"pdfunite\""), "stdout: {stdout}");
}
