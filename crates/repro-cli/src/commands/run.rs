use std::error::Error;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use repro_core::RepetitionMode;
use repro_pipe::{Pipeline, RunOptions};
use tracing::warn;

use super::{build_context, TreeArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RepetitionArg {
    /// Rewrite the assignment line in the runner scripts and export it.
    Patch,
    /// Only export the count through the environment.
    Env,
}

impl From<RepetitionArg> for RepetitionMode {
    fn from(value: RepetitionArg) -> Self {
        match value {
            RepetitionArg::Patch => RepetitionMode::Patch,
            RepetitionArg::Env => RepetitionMode::Env,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub tree: TreeArgs,
    /// Output root (default `<root>/runs`).
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Re-run experiments even when their result table exists.
    #[arg(long)]
    pub force: bool,
    /// Record runner failures and continue.
    #[arg(long)]
    pub keep_going: bool,
    /// Print the plan without executing anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Use the larger repetition counts.
    #[arg(long)]
    pub extensive_reproducibility: bool,
    /// How repetition counts reach the runners.
    #[arg(long, value_enum)]
    pub repetitions: Option<RepetitionArg>,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let (root, mut config) = args.tree.load()?;
    if let Some(mode) = args.repetitions {
        config.repetitions.mode = mode.into();
    }
    let ctx = build_context(root, &config, args.out.clone())?;
    let options = RunOptions {
        force: args.force,
        keep_going: args.keep_going,
        dry_run: args.dry_run,
        extensive: args.extensive_reproducibility,
    };
    let summary = Pipeline::new(ctx, options).run()?;

    if args.dry_run {
        for line in &summary.planned {
            println!("{line}");
        }
        return Ok(());
    }
    for failure in &summary.failures {
        warn!(node = %failure.node, exit_code = failure.exit_code, log = %failure.log.display(), "runner failed");
    }
    println!(
        "executed {} experiment(s), skipped {}, failed {}, distributed {} destination set(s), rebuilt paper {} time(s)",
        summary.executed.len(),
        summary.skipped.len(),
        summary.failures.len(),
        summary.distributions,
        summary.papers_built
    );
    Ok(())
}
