use std::fs;
use std::time::{Duration, Instant};

use repro_core::config::ToolConfig;
use repro_exec::{shell_quote, Executor, Invocation};
use tempfile::tempdir;

fn quiet_executor() -> Executor {
    Executor::new(&ToolConfig::default()).with_echo(false)
}

#[test]
fn streamed_output_keeps_stdout_and_stderr_order() {
    let temp = tempdir().expect("temp");
    let log = temp.path().join("logs/node.log");
    let invocation = Invocation::new(
        "node",
        "echo one; echo two >&2; echo three",
        temp.path().join("work"),
        &log,
    );
    let result = quiet_executor().run_streamed(&invocation).expect("run");
    assert_eq!(result.exit_code, 0);
    let text = fs::read_to_string(&log).expect("log");
    assert!(text.starts_with("$ echo one; echo two >&2; echo three\n\n"));
    assert!(text.ends_with("one\ntwo\nthree\n"));
}

#[test]
fn streamed_exit_code_is_exact() {
    let temp = tempdir().expect("temp");
    let invocation = Invocation::new("node", "exit 7", temp.path(), temp.path().join("x.log"));
    let result = quiet_executor().run_streamed(&invocation).expect("run");
    assert_eq!(result.exit_code, 7);
    assert!(!result.success());
}

#[test]
fn non_interactive_environment_is_exported() {
    let temp = tempdir().expect("temp");
    let log = temp.path().join("env.log");
    let invocation = Invocation::new(
        "node",
        "echo backend=$MPLBACKEND runs=$NUM_OF_RUNS",
        temp.path(),
        &log,
    )
    .with_env("NUM_OF_RUNS", "25");
    quiet_executor().run_streamed(&invocation).expect("run");
    let text = fs::read_to_string(&log).expect("log");
    assert!(text.contains("backend=Agg runs=25"));
}

#[test]
fn log_exists_when_process_cannot_start() {
    let temp = tempdir().expect("temp");
    let mut tools = ToolConfig::default();
    tools.shell = temp.path().join("no-such-shell").display().to_string();
    let executor = Executor::new(&tools).with_echo(false);
    let log = temp.path().join("logs/missing.log");
    let invocation = Invocation::new("node", "true", temp.path(), &log);
    let err = executor.run_streamed(&invocation).expect_err("spawn must fail");
    assert_eq!(err.info().code, "repro.exec_spawn");
    let text = fs::read_to_string(&log).expect("log still written");
    assert!(text.starts_with("$ true\n\n"));
    assert!(text.contains("failed to start process"));
}

#[test]
fn background_runs_overlap_and_report_exit_codes() {
    let temp = tempdir().expect("temp");
    let executor = quiet_executor();
    let started = Instant::now();
    let slow = executor
        .spawn_background(&Invocation::new(
            "slow",
            "sleep 1; echo slow done",
            temp.path(),
            temp.path().join("slow.log"),
        ))
        .expect("spawn slow");
    let fast = executor
        .spawn_background(&Invocation::new(
            "fast",
            "echo fast; echo oops >&2; exit 3",
            temp.path(),
            temp.path().join("fast.log"),
        ))
        .expect("spawn fast");
    let fast = fast.wait().expect("wait fast");
    let slow = slow.wait().expect("wait slow");
    assert!(started.elapsed() < Duration::from_millis(1900));
    assert_eq!(fast.exit_code, 3);
    assert_eq!(slow.exit_code, 0);
    let fast_log = fs::read_to_string(temp.path().join("fast.log")).expect("fast log");
    assert!(fast_log.starts_with("$ echo fast; echo oops >&2; exit 3\n\n"));
    assert!(fast_log.ends_with("fast\noops\n"));
    assert!(fs::read_to_string(&slow.log)
        .expect("slow log")
        .ends_with("slow done\n"));
}

#[cfg(unix)]
#[test]
fn make_executable_sets_mode_and_logs() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().expect("temp");
    let runner = temp.path().join("evaluation_script.sh");
    fs::write(&runner, "#!/bin/sh\necho hi\n").expect("runner");
    let log = temp.path().join("logs/node_chmod.log");
    quiet_executor()
        .make_executable(&runner, &log)
        .expect("chmod");
    let mode = fs::metadata(&runner).expect("meta").permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
    assert!(fs::read_to_string(&log)
        .expect("log")
        .starts_with("$ chmod +x 'evaluation_script.sh'"));
}

#[test]
fn quoted_paths_survive_the_shell() {
    let temp = tempdir().expect("temp");
    let awkward = "it's a plot.pdf";
    fs::write(temp.path().join(awkward), b"%PDF").expect("write");
    let inv = Invocation::new(
        "quote",
        format!("test -f {}", shell_quote(awkward)),
        temp.path(),
        temp.path().join("quote.log"),
    );
    let result = quiet_executor().run_streamed(&inv).expect("run");
    assert_eq!(result.exit_code, 0);
}
