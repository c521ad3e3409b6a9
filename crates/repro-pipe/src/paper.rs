use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use repro_core::errors::{io_error, ErrorInfo, ReproError};
use repro_exec::{shell_quote, Invocation};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::scheduler::SPAWN_FAILURE_EXIT;

/// Result of one paper build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperOutcome {
    /// The paper directory does not exist.
    Skipped,
    /// This tag already triggered a build during the current run.
    AlreadyBuilt,
    Built {
        exit_code: i32,
        /// Where the freshly compiled document was filed, if it was produced.
        reproduced: Option<PathBuf>,
        /// Where the reference document was copied during this call.
        original: Option<PathBuf>,
        /// Non-fatal problems encountered while building or filing.
        warnings: Vec<ReproError>,
    },
}

fn paper_error(code: &str, message: impl Into<String>, path: &Path) -> ReproError {
    ReproError::Paper(
        ErrorInfo::new(code, message).with_context("path", path.display().to_string()),
    )
}

/// Rebuilds the paper after new figures appear. Tracks which tags have built
/// and whether the reference copy was filed, for the lifetime of one run.
#[derive(Debug, Clone, Default)]
pub struct PaperAssembler {
    built: BTreeSet<String>,
    original_filed: bool,
}

impl PaperAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the paper once per `tag`; `None` always builds.
    pub fn assemble(
        &mut self,
        ctx: &RunContext,
        tag: Option<&str>,
    ) -> Result<PaperOutcome, ReproError> {
        let settings = ctx.config().paper();
        let dir = ctx.root().join(&settings.dir);
        if !dir.is_dir() {
            info!(dir = %dir.display(), "no paper directory; skipping paper build");
            return Ok(PaperOutcome::Skipped);
        }
        if let Some(tag) = tag {
            if !self.built.insert(tag.to_string()) {
                return Ok(PaperOutcome::AlreadyBuilt);
            }
        }

        let command = format!(
            "{} -interaction=nonstopmode {}",
            shell_quote(&ctx.config().tools().latex),
            shell_quote(&settings.source)
        );
        let invocation = Invocation::new(
            tag.unwrap_or("paper"),
            command,
            &dir,
            ctx.logs().paper(tag),
        );
        info!(tag = tag.unwrap_or("-"), "building paper");
        let mut warnings = Vec::new();
        let exit_code = match ctx.executor().run_streamed(&invocation) {
            Ok(result) => result.exit_code,
            Err(err) => {
                warnings.push(err);
                SPAWN_FAILURE_EXIT
            }
        };
        if exit_code != 0 {
            let err = paper_error(
                "repro.paper_build",
                format!("document compiler exited with {exit_code}"),
                &invocation.log,
            );
            warn!(error = %err, "paper build failed; continuing");
            warnings.push(err);
        }

        fs::create_dir_all(ctx.out_root())
            .map_err(|err| io_error("repro.paper_out", ctx.out_root(), err))?;

        let produced = dir.join(settings.produced_name());
        let reproduced = if produced.is_file() {
            let dst = ctx.out_root().join(&settings.reproduced_output);
            match relocate(&produced, &dst) {
                Ok(()) => {
                    info!(document = %dst.display(), "filed reproduced paper");
                    Some(dst)
                }
                Err(err) => {
                    warn!(error = %err, "could not file reproduced paper");
                    warnings.push(err);
                    None
                }
            }
        } else {
            None
        };

        let mut original = None;
        let reference = dir.join(settings.reference_name());
        if !self.original_filed && reference.is_file() {
            let dst = ctx.out_root().join(&settings.original_output);
            match fs::copy(&reference, &dst) {
                Ok(_) => {
                    self.original_filed = true;
                    original = Some(dst);
                }
                Err(err) => {
                    let err = paper_error("repro.paper_original", err.to_string(), &dst);
                    warn!(error = %err, "could not file reference paper");
                    warnings.push(err);
                }
            }
        }

        Ok(PaperOutcome::Built {
            exit_code,
            reproduced,
            original,
            warnings,
        })
    }
}

/// Moves `src` onto `dst`, replacing it; falls back to copy and remove when
/// a rename is impossible (e.g. across filesystems).
fn relocate(src: &Path, dst: &Path) -> Result<(), ReproError> {
    if dst.exists() {
        fs::remove_file(dst).map_err(|err| paper_error("repro.paper_replace", err.to_string(), dst))?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst).map_err(|err| paper_error("repro.paper_copy", err.to_string(), dst))?;
    fs::remove_file(src).map_err(|err| paper_error("repro.paper_cleanup", err.to_string(), src))
}
