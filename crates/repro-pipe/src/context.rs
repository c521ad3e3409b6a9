use std::path::{Path, PathBuf};

use repro_core::{CompiledConfig, NodeId};
use repro_exec::{Executor, LogLayout};

/// Everything a pipeline stage needs to locate inputs and write outputs.
#[derive(Debug, Clone)]
pub struct RunContext {
    root: PathBuf,
    out_root: PathBuf,
    logs: LogLayout,
    config: CompiledConfig,
    executor: Executor,
}

impl RunContext {
    /// `out_override` replaces the configured output root; relative paths
    /// resolve against `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        config: CompiledConfig,
        out_override: Option<PathBuf>,
        executor: Executor,
    ) -> Self {
        let root = root.into();
        let out = out_override.unwrap_or_else(|| config.output().root.clone());
        let out_root = if out.is_absolute() { out } else { root.join(out) };
        let logs = LogLayout::new(out_root.join(&config.output().logs_dir));
        Self {
            root,
            out_root,
            logs,
            config,
            executor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn out_root(&self) -> &Path {
        &self.out_root
    }

    pub fn logs(&self) -> &LogLayout {
        &self.logs
    }

    pub fn config(&self) -> &CompiledConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn node_dir(&self, node: &NodeId) -> PathBuf {
        node.dir(&self.root)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.out_root.join(&self.config.output().manifest_file)
    }

    /// Path relative to the output root, `/`-separated, for the manifest.
    pub fn out_relative(&self, path: &Path) -> String {
        relative_display(&self.out_root, path)
    }

    /// Path relative to the experiment root, `/`-separated.
    pub fn root_relative(&self, path: &Path) -> String {
        relative_display(&self.root, path)
    }
}

fn relative_display(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
