//! Cohort readiness check and sibling table copies.

use std::fs;
use std::path::PathBuf;

use repro_core::errors::{io_error, ErrorInfo, ReproError};
use repro_core::{CohortSpec, NodeId};
use tracing::{info, warn};

use crate::context::RunContext;

/// Result of attempting a cohort merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Every required table existed; lists the files written.
    Merged(Vec<PathBuf>),
    /// At least one required table was absent; nothing was copied.
    NotReady(Vec<PathBuf>),
}

/// Required tables of the cohort that do not exist yet.
pub fn missing_requirements(ctx: &RunContext, cohort: &CohortSpec) -> Vec<PathBuf> {
    cohort
        .merge
        .requires
        .iter()
        .map(|req| ctx.node_dir(&NodeId::new(&req.node)).join(&req.file))
        .filter(|path| !path.is_file())
        .collect()
}

/// Diagnostic raised when a merge has to be skipped.
pub fn dependency_error(ctx: &RunContext, cohort: &CohortSpec, missing: &[PathBuf]) -> ReproError {
    let listed = missing
        .iter()
        .map(|path| ctx.root_relative(path))
        .collect::<Vec<_>>()
        .join(", ");
    ReproError::Dependency(
        ErrorInfo::new(
            "repro.cohort_not_ready",
            format!("cohort {} is missing required tables", cohort.id),
        )
        .with_context("cohort", cohort.id.clone())
        .with_context("missing", listed),
    )
}

/// Copies the cohort's tables into their merge locations when every required
/// table is present. A missing table is reported, never fatal.
pub fn merge_cohort(ctx: &RunContext, cohort: &CohortSpec) -> Result<MergeOutcome, ReproError> {
    let missing = missing_requirements(ctx, cohort);
    if !missing.is_empty() {
        warn!(error = %dependency_error(ctx, cohort, &missing), "skipping cohort merge");
        return Ok(MergeOutcome::NotReady(missing));
    }
    let mut written = Vec::new();
    for rule in &cohort.merge.copies {
        let src = ctx.node_dir(&NodeId::new(&rule.node)).join(&rule.file);
        let into = ctx.node_dir(&NodeId::new(&rule.into));
        if !src.is_file() {
            warn!(cohort = %cohort.id, source = %src.display(), "merge source vanished");
            continue;
        }
        let dst = into.join(&rule.file);
        if src == dst {
            written.push(dst);
            continue;
        }
        fs::create_dir_all(&into).map_err(|err| io_error("repro.merge_dir", &into, err))?;
        fs::copy(&src, &dst).map_err(|err| io_error("repro.merge_copy", &dst, err))?;
        info!(cohort = %cohort.id, file = %ctx.root_relative(&dst), "merged cohort table");
        written.push(dst);
    }
    Ok(MergeOutcome::Merged(written))
}
