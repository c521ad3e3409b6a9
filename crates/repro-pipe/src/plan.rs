//! Human readable description of what a run would do, without doing it.

use repro_core::{ExperimentNode, NodeId, NodeKind, RepetitionMode};

use crate::context::RunContext;
use crate::manifest::RunManifest;
use crate::scheduler::{needs_run, runner_command, Step};

fn destinations(ctx: &RunContext, node: &NodeId) -> String {
    ctx.config()
        .destinations(node)
        .iter()
        .map(|dest| {
            let rel = ctx.out_root().join(&dest.rel);
            ctx.root_relative(&rel)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_runner(
    ctx: &RunContext,
    node: &ExperimentNode,
    manifest: &RunManifest,
    force: bool,
    extensive: bool,
    lines: &mut Vec<String>,
) {
    if !needs_run(ctx, &node.id, manifest, force) {
        lines.push(format!("  skip {} (result table present)", node.id));
        return;
    }
    lines.push(format!("  run  {}: {}", node.id, runner_command(&node.runner)));
    if let Some(count) = ctx.config().repetition_count(&node.id, extensive) {
        let repetitions = ctx.config().repetitions();
        let mode = match repetitions.mode {
            RepetitionMode::Patch => "patch + env",
            RepetitionMode::Env => "env",
        };
        lines.push(format!("       {}={count} ({mode})", repetitions.variable));
    }
}

/// One line per planned action. Reads the tree and the manifest; writes
/// nothing.
pub fn describe(
    ctx: &RunContext,
    steps: &[Step],
    manifest: &RunManifest,
    force: bool,
    extensive: bool,
) -> Vec<String> {
    let mut lines = Vec::new();
    let total = steps.len();
    for (idx, step) in steps.iter().enumerate() {
        lines.push(format!("[{}/{total}] {}", idx + 1, step.label()));
        match step {
            Step::Solo(node) => {
                describe_runner(ctx, node, manifest, force, extensive, &mut lines);
                match &node.kind {
                    NodeKind::Standard => lines.push(format!(
                        "  then render and distribute -> {}",
                        destinations(ctx, &node.id)
                    )),
                    NodeKind::DeferredUntilCohortReady(cohort) => lines.push(format!(
                        "  rendering deferred until cohort {cohort} merges"
                    )),
                    NodeKind::CohortMember(_) => {}
                }
            }
            Step::Cohort { cohort, members } => {
                for member in members {
                    describe_runner(ctx, member, manifest, force, extensive, &mut lines);
                }
                lines.push("  wait for every member".to_string());
                for copy in &cohort.merge.copies {
                    lines.push(format!("  merge {}/{} -> {}", copy.node, copy.file, copy.into));
                }
                let target = NodeId::new(&cohort.merge.target);
                lines.push(format!(
                    "  then render and distribute {} -> {}",
                    target,
                    destinations(ctx, &target)
                ));
            }
        }
    }
    let paper = ctx.root().join(&ctx.config().paper().dir);
    if paper.is_dir() {
        lines.push(format!(
            "paper: rebuild {} after steps that render documents",
            ctx.root_relative(&paper.join(&ctx.config().paper().source))
        ));
    } else {
        lines.push("paper: no paper directory".to_string());
    }
    lines
}
