use repro_core::errors::{io_error, ReproError};
use repro_core::{ExperimentNode, NodeId, NodeState, RunResult};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::discovery::discover;
use crate::manifest::RunManifest;
use crate::paper::{PaperAssembler, PaperOutcome};
use crate::plan::describe;
use crate::postprocess::{cohort_actions, PostOutcome, Postprocessor};
use crate::scheduler::{plan, Scheduler, Step};

/// Flags controlling a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-run nodes even when their result table exists.
    pub force: bool,
    /// Record runner failures and continue instead of aborting.
    pub keep_going: bool,
    /// Print the plan and exit without touching the tree.
    pub dry_run: bool,
    /// Use the extensive repetition counts.
    pub extensive: bool,
}

/// Totals of a completed (or dry) run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub executed: Vec<RunResult>,
    pub skipped: Vec<NodeId>,
    pub failures: Vec<RunResult>,
    pub distributions: usize,
    /// Files copied or rendered into the output tree.
    pub artifacts: usize,
    pub render_failures: usize,
    pub skipped_merges: Vec<ReproError>,
    pub papers_built: usize,
    /// Plan lines; only filled for dry runs.
    pub planned: Vec<String>,
}

impl RunSummary {
    fn absorb(&mut self, outcome: PostOutcome) {
        if let Some(report) = outcome.distribution {
            self.distributions += 1;
            self.artifacts += report.copied.len();
            self.render_failures += report.render_failures.len();
        }
        if let Some(err) = outcome.dependency {
            self.skipped_merges.push(err);
        }
        if matches!(outcome.paper, Some(PaperOutcome::Built { .. })) {
            self.papers_built += 1;
        }
    }

    fn record(&mut self, result: RunResult) {
        if !result.success() {
            self.failures.push(result.clone());
        }
        self.executed.push(result);
    }
}

/// Discovery, scheduling and postprocessing over one experiment tree.
#[derive(Debug)]
pub struct Pipeline {
    ctx: RunContext,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(ctx: RunContext, options: RunOptions) -> Self {
        Self { ctx, options }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Runnable nodes in execution order.
    pub fn discover(&self) -> Result<Vec<ExperimentNode>, ReproError> {
        discover(
            self.ctx.root(),
            self.ctx.config(),
            &[self.ctx.out_root().to_path_buf()],
        )
    }

    pub fn plan(&self) -> Result<Vec<Step>, ReproError> {
        Ok(plan(&self.discover()?, self.ctx.config()))
    }

    /// Executes every step. A runner failure aborts with
    /// [`ReproError::Runner`] unless `keep_going` is set: a failed solo node
    /// is not postprocessed, a cohort still merges and renders what its
    /// members produced before the abort.
    pub fn run(&self) -> Result<RunSummary, ReproError> {
        let steps = self.plan()?;
        if steps.is_empty() {
            return Err(io_error(
                "repro.no_experiments",
                self.ctx.root(),
                "no experiments found",
            ));
        }
        let manifest_path = self.ctx.manifest_path();
        let mut manifest = RunManifest::load_or_default(&manifest_path)?;
        let mut summary = RunSummary::default();

        if self.options.dry_run {
            summary.planned = describe(
                &self.ctx,
                &steps,
                &manifest,
                self.options.force,
                self.options.extensive,
            );
            return Ok(summary);
        }

        for step in &steps {
            for node in step.nodes() {
                if manifest.state(&node.id).is_none() {
                    manifest.set_state(&node.id, NodeState::Pending);
                }
            }
        }
        manifest.save(&manifest_path)?;

        info!(root = %self.ctx.root().display(), steps = steps.len(), "starting run");
        let scheduler = Scheduler::new(&self.ctx, self.options.force, self.options.extensive);
        let mut post = Postprocessor::new();
        let total = steps.len();
        for (idx, step) in steps.iter().enumerate() {
            info!("[{}/{total}] {}", idx + 1, step.label());
            let abort = match step {
                Step::Solo(node) => {
                    let failure = match scheduler.run_solo(node, &mut manifest)? {
                        Some(result) => {
                            let failure = (!result.success()).then(|| result.clone());
                            summary.record(result);
                            failure
                        }
                        None => {
                            summary.skipped.push(node.id.clone());
                            None
                        }
                    };
                    let abort = failure.filter(|_| !self.options.keep_going);
                    if abort.is_none() {
                        for action in node.kind.post_actions(&node.id) {
                            let outcome = post.apply(&self.ctx, &action, &mut manifest)?;
                            summary.absorb(outcome);
                        }
                    }
                    abort
                }
                Step::Cohort { cohort, members } => {
                    let run = scheduler.run_cohort(members, &mut manifest)?;
                    let first_failure = run.failures().next().cloned();
                    summary.skipped.extend(run.skipped);
                    for result in run.results {
                        summary.record(result);
                    }
                    for action in cohort_actions(cohort) {
                        let outcome = post.apply(&self.ctx, &action, &mut manifest)?;
                        let blocked = outcome.dependency.is_some();
                        summary.absorb(outcome);
                        if blocked {
                            break;
                        }
                    }
                    first_failure.filter(|_| !self.options.keep_going)
                }
            };
            manifest.save(&manifest_path)?;
            if let Some(failed) = abort {
                return Err(ReproError::runner_failed(&failed.node, failed.exit_code));
            }
        }

        if !summary.failures.is_empty() {
            warn!(failed = summary.failures.len(), "run finished with failed runners");
        }
        info!(
            executed = summary.executed.len(),
            skipped = summary.skipped.len(),
            distributions = summary.distributions,
            "run complete"
        );
        Ok(summary)
    }

    /// Paper assembly on its own, outside a run.
    pub fn assemble_paper(&self) -> Result<PaperOutcome, ReproError> {
        PaperAssembler::new().assemble(&self.ctx, None)
    }
}
