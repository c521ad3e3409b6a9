use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};

use repro_core::config::ToolConfig;
use repro_core::errors::{io_error, ErrorInfo, ReproError};
use repro_core::RunResult;
use tracing::{debug, warn};

/// One external command to run on behalf of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Node id or rendering tag recorded in the [`RunResult`].
    pub label: String,
    /// Shell command line.
    pub command: String,
    /// Working directory; created when missing.
    pub cwd: PathBuf,
    /// Log file receiving the merged output stream.
    pub log: PathBuf,
    /// Variables added on top of the executor's environment.
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(
        label: impl Into<String>,
        command: impl Into<String>,
        cwd: impl Into<PathBuf>,
        log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            cwd: cwd.into(),
            log: log.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Runs shell commands with stdout and stderr merged into one ordered log.
#[derive(Debug, Clone)]
pub struct Executor {
    shell: String,
    env: BTreeMap<String, String>,
    echo: bool,
}

/// Handle to a process launched in background mode.
#[derive(Debug)]
pub struct BackgroundRun {
    label: String,
    log: PathBuf,
    child: Child,
}

impl BackgroundRun {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn log(&self) -> &Path {
        &self.log
    }

    /// Blocks until the process exits.
    pub fn wait(mut self) -> Result<RunResult, ReproError> {
        let status = self.child.wait().map_err(|err| {
            exec_error("repro.exec_wait", &self.label, &self.log, err)
        })?;
        let exit_code = exit_code(status);
        debug!(node = %self.label, exit_code, "background process exited");
        Ok(RunResult {
            node: self.label,
            exit_code,
            log: self.log,
        })
    }
}

fn exec_error(code: &str, label: &str, log: &Path, err: impl ToString) -> ReproError {
    ReproError::Exec(
        ErrorInfo::new(code, err.to_string())
            .with_context("node", label)
            .with_context("log", log.display().to_string()),
    )
}

/// Single-quotes `value` for the shell, escaping embedded quotes.
pub fn shell_quote(value: impl AsRef<str>) -> String {
    format!("'{}'", value.as_ref().replace('\'', r"'\''"))
}

/// Exit code of a finished process; `-1` when it was killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Creates the log (and its directory) and writes the command header.
fn open_log(log: &Path, command: &str) -> Result<File, ReproError> {
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error("repro.log_dir", parent, err))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log)
        .map_err(|err| io_error("repro.log_open", log, err))?;
    write!(file, "$ {command}\n\n")
        .and_then(|_| file.flush())
        .map_err(|err| io_error("repro.log_write", log, err))?;
    Ok(file)
}

/// Stops a child whose output can no longer be consumed and reaps it.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn note_spawn_failure(log: &mut File, err: &io::Error) {
    let _ = writeln!(log, "failed to start process: {err}");
    let _ = log.flush();
}

impl Executor {
    pub fn new(tools: &ToolConfig) -> Self {
        Self {
            shell: tools.shell.clone(),
            env: tools.non_interactive_env.clone(),
            echo: true,
        }
    }

    /// Toggles copying streamed output to the terminal.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn command(&self, invocation: &Invocation) -> Result<Command, ReproError> {
        fs::create_dir_all(&invocation.cwd)
            .map_err(|err| io_error("repro.exec_cwd", &invocation.cwd, err))?;
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-lc")
            .arg(&invocation.command)
            .current_dir(&invocation.cwd)
            .envs(&self.env)
            .envs(&invocation.env);
        Ok(cmd)
    }

    /// Runs the command to completion, copying each output line to the
    /// terminal and the log in production order.
    pub fn run_streamed(&self, invocation: &Invocation) -> Result<RunResult, ReproError> {
        let mut log = open_log(&invocation.log, &invocation.command)?;
        let mut cmd = self.command(invocation)?;
        let (reader, writer) = io::pipe().map_err(|err| {
            exec_error("repro.exec_pipe", &invocation.label, &invocation.log, err)
        })?;
        let writer_err = writer.try_clone().map_err(|err| {
            exec_error("repro.exec_pipe", &invocation.label, &invocation.log, err)
        })?;
        cmd.stdout(writer).stderr(writer_err);

        debug!(node = %invocation.label, command = %invocation.command, "spawning streamed process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                note_spawn_failure(&mut log, &err);
                return Err(exec_error(
                    "repro.exec_spawn",
                    &invocation.label,
                    &invocation.log,
                    err,
                ));
            }
        };
        // The command still owns the write ends; drop them so EOF arrives
        // when the child exits.
        drop(cmd);

        let mut reader = BufReader::new(reader);
        if let Err(err) = self.copy_lines(&mut reader, &mut log, invocation) {
            abandon(&mut child);
            return Err(err);
        }

        let status = child.wait().map_err(|err| {
            exec_error("repro.exec_wait", &invocation.label, &invocation.log, err)
        })?;
        let exit_code = exit_code(status);
        if exit_code != 0 {
            warn!(node = %invocation.label, exit_code, log = %invocation.log.display(), "process exited with failure");
        }
        Ok(RunResult {
            node: invocation.label.clone(),
            exit_code,
            log: invocation.log.clone(),
        })
    }

    /// Copies each line from `reader` to the terminal (when echoing) and to
    /// the log until EOF.
    fn copy_lines(
        &self,
        reader: &mut impl BufRead,
        log: &mut impl Write,
        invocation: &Invocation,
    ) -> Result<(), ReproError> {
        let stdout = io::stdout();
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).map_err(|err| {
                exec_error("repro.exec_read", &invocation.label, &invocation.log, err)
            })?;
            if read == 0 {
                return Ok(());
            }
            if self.echo {
                let mut out = stdout.lock();
                let _ = out.write_all(&line);
                let _ = out.flush();
            }
            log.write_all(&line)
                .and_then(|_| log.flush())
                .map_err(|err| io_error("repro.log_write", &invocation.log, err))?;
        }
    }

    /// Launches the command with its merged output going only to the log.
    pub fn spawn_background(&self, invocation: &Invocation) -> Result<BackgroundRun, ReproError> {
        let mut log = open_log(&invocation.log, &invocation.command)?;
        let mut cmd = self.command(invocation)?;
        let stdout = log
            .try_clone()
            .map_err(|err| io_error("repro.log_clone", &invocation.log, err))?;
        let stderr = log
            .try_clone()
            .map_err(|err| io_error("repro.log_clone", &invocation.log, err))?;
        cmd.stdout(stdout).stderr(stderr);

        debug!(node = %invocation.label, command = %invocation.command, "spawning background process");
        match cmd.spawn() {
            Ok(child) => Ok(BackgroundRun {
                label: invocation.label.clone(),
                log: invocation.log.clone(),
                child,
            }),
            Err(err) => {
                note_spawn_failure(&mut log, &err);
                Err(exec_error(
                    "repro.exec_spawn",
                    &invocation.label,
                    &invocation.log,
                    err,
                ))
            }
        }
    }

    /// Marks a runner executable, recording the step in its own log.
    pub fn make_executable(&self, runner: &Path, log: &Path) -> Result<(), ReproError> {
        let name = runner
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut file = open_log(log, &format!("chmod +x '{name}'"))?;
        let result = set_executable(runner);
        if let Err(err) = &result {
            let _ = writeln!(file, "{err}");
        }
        result.map_err(|err| io_error("repro.exec_chmod", runner, err))
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    struct BrokenLog;

    impl Write for BrokenLog {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_write_failure_stops_copying() {
        let executor = Executor::new(&ToolConfig::default()).with_echo(false);
        let invocation = Invocation::new("node", "true", "/tmp", "/tmp/node.log");
        let mut reader = Cursor::new(b"one\ntwo\n".to_vec());
        let err = executor
            .copy_lines(&mut reader, &mut BrokenLog, &invocation)
            .expect_err("write must fail");
        assert_eq!(err.info().code, "repro.log_write");
    }

    #[test]
    fn abandoned_child_is_killed_and_reaped() {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        let started = Instant::now();
        abandon(&mut child);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().expect("status").is_some());
    }
}
