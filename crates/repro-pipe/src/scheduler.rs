//! Step planning and runner execution, including the cohort barrier.

use std::collections::BTreeSet;

use repro_core::errors::ReproError;
use repro_core::{
    CohortSpec, CompiledConfig, ExperimentNode, NodeId, NodeKind, NodeState, RunResult,
};
use repro_exec::{apply_repetitions, shell_quote, BackgroundRun, Invocation};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::distribute::has_result_table;
use crate::manifest::RunManifest;

/// Exit code recorded when a runner could not be started at all.
pub const SPAWN_FAILURE_EXIT: i32 = 127;

/// One unit of scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Solo(ExperimentNode),
    /// Members launched together; postprocessing waits for all of them.
    Cohort {
        cohort: CohortSpec,
        members: Vec<ExperimentNode>,
    },
}

impl Step {
    pub fn nodes(&self) -> Vec<&ExperimentNode> {
        match self {
            Step::Solo(node) => vec![node],
            Step::Cohort { members, .. } => members.iter().collect(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Step::Solo(node) => node.id.to_string(),
            Step::Cohort { cohort, .. } => format!("cohort {}", cohort.id),
        }
    }
}

/// Groups the ordered node list into steps. The first member of a cohort
/// reached pulls in every discovered member of that cohort.
pub fn plan(nodes: &[ExperimentNode], config: &CompiledConfig) -> Vec<Step> {
    let mut planned: BTreeSet<NodeId> = BTreeSet::new();
    let mut steps = Vec::new();
    for node in nodes {
        if planned.contains(&node.id) {
            continue;
        }
        if let NodeKind::CohortMember(cohort_id) = &node.kind {
            if let Some(cohort) = config.cohort(cohort_id) {
                let mut members = nodes
                    .iter()
                    .filter(|other| {
                        other.kind == node.kind && !planned.contains(&other.id)
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                members.sort_by(|a, b| a.id.cmp(&b.id));
                planned.extend(members.iter().map(|member| member.id.clone()));
                steps.push(Step::Cohort {
                    cohort: cohort.clone(),
                    members,
                });
                continue;
            }
        }
        planned.insert(node.id.clone());
        steps.push(Step::Solo(node.clone()));
    }
    steps
}

/// A node is (re-)run when forced, when the manifest says its last attempt
/// failed or was interrupted, or when it has no result table yet.
pub fn needs_run(ctx: &RunContext, node: &NodeId, manifest: &RunManifest, force: bool) -> bool {
    if force {
        return true;
    }
    match manifest.state(node) {
        Some(NodeState::Failed { .. }) | Some(NodeState::Running) => true,
        _ => !has_result_table(ctx, node),
    }
}

/// Command line used to start a runner from its own directory.
pub fn runner_command(runner: &str) -> String {
    format!("set -eo pipefail; {}", shell_quote(format!("./{runner}")))
}

/// What happened to the nodes of one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepRun {
    pub results: Vec<RunResult>,
    pub skipped: Vec<NodeId>,
}

impl StepRun {
    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|result| !result.success())
    }
}

/// Executes runner steps against one context.
#[derive(Debug)]
pub struct Scheduler<'a> {
    ctx: &'a RunContext,
    force: bool,
    extensive: bool,
}

impl<'a> Scheduler<'a> {
    pub fn new(ctx: &'a RunContext, force: bool, extensive: bool) -> Self {
        Self {
            ctx,
            force,
            extensive,
        }
    }

    /// Marks the runner executable, applies the repetition count and builds
    /// the invocation.
    fn prepare(&self, node: &ExperimentNode) -> Result<Invocation, ReproError> {
        let dir = self.ctx.node_dir(&node.id);
        let runner = dir.join(&node.runner);
        if let Err(err) = self
            .ctx
            .executor()
            .make_executable(&runner, &self.ctx.logs().chmod(&node.id))
        {
            warn!(node = %node.id, error = %err, "could not mark runner executable");
        }
        let mut invocation = Invocation::new(
            node.id.as_str(),
            runner_command(&node.runner),
            &dir,
            self.ctx.logs().runner(&node.id),
        );
        if let Some(count) = self.ctx.config().repetition_count(&node.id, self.extensive) {
            let repetitions = self.ctx.config().repetitions();
            apply_repetitions(&dir, repetitions, count)?;
            invocation = invocation.with_env(repetitions.variable.as_str(), count.to_string());
        }
        Ok(invocation)
    }

    fn mark_running(&self, node: &NodeId, manifest: &mut RunManifest) -> Result<(), ReproError> {
        manifest.set_state(node, NodeState::Running);
        manifest.save(&self.ctx.manifest_path())
    }

    fn finish(
        &self,
        result: &RunResult,
        manifest: &mut RunManifest,
    ) -> Result<(), ReproError> {
        manifest.set_state(&NodeId::new(&result.node), NodeState::from_exit(result.exit_code));
        manifest.save(&self.ctx.manifest_path())
    }

    /// Runs a solo node in streamed mode. Returns `None` when the node is
    /// already complete.
    pub fn run_solo(
        &self,
        node: &ExperimentNode,
        manifest: &mut RunManifest,
    ) -> Result<Option<RunResult>, ReproError> {
        if !needs_run(self.ctx, &node.id, manifest, self.force) {
            info!(node = %node.id, "result table present; skipping runner");
            return Ok(None);
        }
        self.mark_running(&node.id, manifest)?;
        let invocation = self.prepare(node)?;
        info!(node = %node.id, runner = %node.runner, "running");
        let result = match self.ctx.executor().run_streamed(&invocation) {
            Ok(result) => result,
            Err(err @ ReproError::Exec(_)) => not_started(&invocation, &err),
            Err(err) => return Err(err),
        };
        self.finish(&result, manifest)?;
        Ok(Some(result))
    }

    /// Prepares every eligible member, launches them in the background, then
    /// waits for all of them before returning. A launch error is returned
    /// only after every process already started has exited.
    pub fn run_cohort(
        &self,
        members: &[ExperimentNode],
        manifest: &mut RunManifest,
    ) -> Result<StepRun, ReproError> {
        let mut step = StepRun::default();
        let mut prepared = Vec::new();
        for member in members {
            if !needs_run(self.ctx, &member.id, manifest, self.force) {
                info!(node = %member.id, "result table present; skipping runner");
                step.skipped.push(member.id.clone());
                continue;
            }
            prepared.push((member, self.prepare(member)?));
        }
        for (member, _) in &prepared {
            manifest.set_state(&member.id, NodeState::Running);
        }
        manifest.save(&self.ctx.manifest_path())?;

        let mut launched: Vec<BackgroundRun> = Vec::new();
        let mut launch_error = None;
        for (member, invocation) in &prepared {
            info!(node = %member.id, runner = %member.runner, log = %invocation.log.display(), "launching in background");
            match self.ctx.executor().spawn_background(invocation) {
                Ok(handle) => launched.push(handle),
                Err(err @ ReproError::Exec(_)) => step.results.push(not_started(invocation, &err)),
                Err(err) => {
                    warn!(node = %member.id, error = %err, "cohort launch aborted; waiting for started members");
                    launch_error = Some(err);
                    break;
                }
            }
        }

        for handle in launched {
            let label = handle.label().to_string();
            let log = handle.log().to_path_buf();
            let result = handle.wait().unwrap_or_else(|err| {
                warn!(node = %label, error = %err, "lost track of background process");
                RunResult {
                    node: label,
                    exit_code: -1,
                    log,
                }
            });
            info!(node = %result.node, exit_code = result.exit_code, "cohort member finished");
            step.results.push(result);
        }
        for result in &step.results {
            manifest.set_state(&NodeId::new(&result.node), NodeState::from_exit(result.exit_code));
        }
        manifest.save(&self.ctx.manifest_path())?;
        match launch_error {
            Some(err) => Err(err),
            None => Ok(step),
        }
    }
}

fn not_started(invocation: &Invocation, err: &ReproError) -> RunResult {
    warn!(node = %invocation.label, error = %err, "runner could not be started");
    RunResult {
        node: invocation.label.clone(),
        exit_code: SPAWN_FAILURE_EXIT,
        log: invocation.log.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repro_core::PipelineConfig;

    fn node(config: &CompiledConfig, id: &str) -> ExperimentNode {
        let id = NodeId::new(id);
        ExperimentNode {
            category: id.category().to_string(),
            priority: config.priority(id.category()),
            runner: "evaluation_script.sh".into(),
            kind: config.kind_of(&id),
            id,
        }
    }

    #[test]
    fn cohort_members_are_planned_together_once() {
        let config = PipelineConfig::default().compile().expect("compile");
        let nodes = [
            "effectiveness/ablation_study/present_only",
            "effectiveness/ablation_study",
            "effectiveness/other",
            "real_world_experiments/citi_bike/query1",
            "real_world_experiments/citi_bike/query0",
        ]
        .map(|id| node(&config, id));
        let steps = plan(&nodes, &config);
        let labels = steps.iter().map(Step::label).collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec![
                "cohort ablation_study",
                "effectiveness/other",
                "cohort citi_bike",
            ]
        );
        match &steps[2] {
            Step::Cohort { members, .. } => {
                let ids = members.iter().map(|m| m.id.as_str()).collect::<Vec<_>>();
                assert_eq!(
                    ids,
                    vec![
                        "real_world_experiments/citi_bike/query0",
                        "real_world_experiments/citi_bike/query1",
                    ]
                );
            }
            other => panic!("expected cohort step, got {other:?}"),
        }
    }

    #[test]
    fn deferred_target_runs_solo() {
        let config = PipelineConfig::default().compile().expect("compile");
        let nodes = [node(&config, "real_world_experiments/citi_bike")];
        let steps = plan(&nodes, &config);
        assert!(matches!(&steps[0], Step::Solo(n) if n.kind == NodeKind::DeferredUntilCohortReady("citi_bike".into())));
    }

    #[test]
    fn runner_command_is_strict_and_quoted() {
        assert_eq!(
            runner_command("evaluation_script.sh"),
            "set -eo pipefail; './evaluation_script.sh'"
        );
    }
}
