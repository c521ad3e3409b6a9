//! Structured error types shared across the orchestrator crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`ReproError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (node ids, paths, exit codes).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the orchestrator.
///
/// Only [`ReproError::Runner`] is allowed to halt a pipeline run; the
/// rendering, comparison, paper and dependency families are surfaced as
/// warnings or marker files by the callers that produce them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum ReproError {
    /// An experiment runner exited with a nonzero status.
    #[error("runner error: {0}")]
    Runner(ErrorInfo),
    /// A rendering script exited with a nonzero status.
    #[error("render error: {0}")]
    Render(ErrorInfo),
    /// A comparison rendering could not be produced.
    #[error("compare error: {0}")]
    Compare(ErrorInfo),
    /// The document compiler failed or its output could not be filed.
    #[error("paper error: {0}")]
    Paper(ErrorInfo),
    /// A cohort merge could not find a table produced by a sibling.
    #[error("dependency error: {0}")]
    Dependency(ErrorInfo),
    /// An external process could not be started or waited on.
    #[error("exec error: {0}")]
    Exec(ErrorInfo),
    /// Filesystem failures while walking, copying or writing.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Invalid configuration tables or unreadable config files.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl ReproError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            ReproError::Runner(info)
            | ReproError::Render(info)
            | ReproError::Compare(info)
            | ReproError::Paper(info)
            | ReproError::Dependency(info)
            | ReproError::Exec(info)
            | ReproError::Io(info)
            | ReproError::Config(info)
            | ReproError::Serde(info) => info,
        }
    }

    /// Builds the pipeline-halting error for a failed runner.
    pub fn runner_failed(node: &str, exit_code: i32) -> Self {
        ReproError::Runner(
            ErrorInfo::new(
                "repro.runner_failed",
                format!("FAILED {node} exit={exit_code}"),
            )
            .with_context("node", node)
            .with_context("exit_code", exit_code.to_string())
            .with_hint("inspect the node log under the _logs directory or pass --keep-going"),
        )
    }

    /// Exit code recorded on a runner failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ReproError::Runner(info) => info.context.get("exit_code")?.parse().ok(),
            _ => None,
        }
    }

    /// Node identifier recorded in the error context, if any.
    pub fn node(&self) -> Option<&str> {
        self.info().context.get("node").map(String::as_str)
    }
}

/// Wraps a filesystem error together with the offending path.
pub fn io_error(code: &str, path: &Path, err: impl Display) -> ReproError {
    ReproError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Wraps a configuration problem.
pub fn config_error(code: &str, message: impl Into<String>) -> ReproError {
    ReproError::Config(ErrorInfo::new(code, message))
}
