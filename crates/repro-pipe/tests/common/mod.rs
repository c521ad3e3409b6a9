#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use repro_core::PipelineConfig;
use repro_exec::Executor;
use repro_pipe::{Pipeline, RunContext, RunOptions};
use walkdir::WalkDir;

/// Writes `rel` below `root`, creating parents.
pub fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, contents).expect("write");
    path
}

/// Writes an executable script.
pub fn script(root: &Path, rel: &str, body: &str) -> PathBuf {
    let path = write(root, rel, &format!("#!/bin/bash\n{body}\n"));
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// Writes `evaluation_script.sh` into the node directory.
pub fn runner(root: &Path, node: &str, body: &str) -> PathBuf {
    write(root, &format!("{node}/evaluation_script.sh"), &format!("#!/bin/bash\n{body}\n"))
}

/// Defaults with shell-interpreted rendering scripts and no terminal echo.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.tools.python = "/bin/sh".into();
    config.compare.retry_delay_ms = 10;
    config
}

pub fn context(root: &Path, config: &PipelineConfig) -> RunContext {
    let compiled = config.compile().expect("compile config");
    let executor = Executor::new(compiled.tools()).with_echo(false);
    RunContext::new(root, compiled, None, executor)
}

pub fn pipeline(root: &Path, config: &PipelineConfig, options: RunOptions) -> Pipeline {
    Pipeline::new(context(root, config), options)
}

pub fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path.as_ref())
        .unwrap_or_else(|err| panic!("read {}: {err}", path.as_ref().display()))
}

/// Every path below `root` with its contents, for before/after comparisons.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.expect("walk"))
        .map(|entry| {
            let contents = if entry.file_type().is_file() {
                fs::read(entry.path()).expect("read")
            } else {
                Vec::new()
            };
            (entry.path().to_path_buf(), contents)
        })
        .collect()
}
