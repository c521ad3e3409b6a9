use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use repro_core::PipelineConfig;
use repro_exec::Executor;
use repro_pipe::RunContext;

pub mod config;
pub mod discover;
pub mod doctor;
pub mod paper;
pub mod run;

/// Location of the experiment tree and its configuration.
#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    /// Root of the experiment tree.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// TOML file overriding the built-in tables; `<root>/repro.toml` is used
    /// when present and this is omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TreeArgs {
    /// Canonical root and the resolved configuration.
    pub fn load(&self) -> Result<(PathBuf, PipelineConfig), Box<dyn Error>> {
        let root = self
            .root
            .canonicalize()
            .map_err(|err| format!("cannot open root {}: {err}", self.root.display()))?;
        let config = PipelineConfig::resolve(&root, self.config.as_deref())?;
        Ok((root, config))
    }
}

pub fn build_context(
    root: PathBuf,
    config: &PipelineConfig,
    out: Option<PathBuf>,
) -> Result<RunContext, Box<dyn Error>> {
    let compiled = config.compile()?;
    let executor = Executor::new(compiled.tools());
    Ok(RunContext::new(root, compiled, out, executor))
}
