use repro_core::errors::{config_error, ReproError};
use repro_core::{CohortSpec, NodeId, PostAction};
use tracing::info;

use crate::context::RunContext;
use crate::distribute::{render_and_distribute, DistributionReport, TableSelection};
use crate::manifest::RunManifest;
use crate::merge::{dependency_error, merge_cohort, MergeOutcome};
use crate::paper::{PaperAssembler, PaperOutcome};

/// Result of applying one post-run action.
#[derive(Debug, Clone, Default)]
pub struct PostOutcome {
    pub distribution: Option<DistributionReport>,
    /// Set when a cohort merge was skipped for a missing table.
    pub dependency: Option<ReproError>,
    pub paper: Option<PaperOutcome>,
}

/// Applies post-run actions, keeping per-run paper state.
#[derive(Debug, Default)]
pub struct Postprocessor {
    paper: PaperAssembler,
}

/// Post-run actions of a cohort step, in order. Later actions are skipped
/// when the merge is not ready.
pub fn cohort_actions(cohort: &CohortSpec) -> Vec<PostAction> {
    vec![
        PostAction::MergeCohort(cohort.id.clone()),
        PostAction::RenderAndDistribute(NodeId::new(&cohort.merge.target)),
    ]
}

/// Tables distributed for a node: a merge target may name them explicitly.
fn selection_for(ctx: &RunContext, node: &NodeId) -> TableSelection {
    ctx.config()
        .cohorts()
        .iter()
        .find(|cohort| NodeId::new(&cohort.merge.target) == *node)
        .and_then(|cohort| cohort.merge.tables.clone())
        .map_or(TableSelection::Pattern, TableSelection::Named)
}

impl Postprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &mut self,
        ctx: &RunContext,
        action: &PostAction,
        manifest: &mut RunManifest,
    ) -> Result<PostOutcome, ReproError> {
        match action {
            PostAction::RenderAndDistribute(node) => {
                self.distribute(ctx, node, &selection_for(ctx, node), manifest)
            }
            PostAction::MergeCohort(cohort_id) => {
                let cohort = ctx.config().cohort(cohort_id).ok_or_else(|| {
                    config_error(
                        "repro.config_cohort_unknown",
                        format!("no cohort named {cohort_id}"),
                    )
                })?;
                Ok(match merge_cohort(ctx, cohort)? {
                    MergeOutcome::NotReady(missing) => PostOutcome {
                        dependency: Some(dependency_error(ctx, cohort, &missing)),
                        ..PostOutcome::default()
                    },
                    MergeOutcome::Merged(_) => PostOutcome::default(),
                })
            }
        }
    }

    fn distribute(
        &mut self,
        ctx: &RunContext,
        node: &NodeId,
        selection: &TableSelection,
        manifest: &mut RunManifest,
    ) -> Result<PostOutcome, ReproError> {
        let report = render_and_distribute(ctx, node, selection, manifest)?;
        let paper = if report.documents.is_empty() {
            None
        } else {
            info!(node = %node, documents = report.documents.len(), "new documents; rebuilding paper");
            Some(self.paper.assemble(ctx, Some(&node.tag()))?)
        };
        Ok(PostOutcome {
            distribution: Some(report),
            dependency: None,
            paper,
        })
    }
}
