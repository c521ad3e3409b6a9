//! Rendering, artifact collection and distribution into figure folders.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use repro_core::errors::{io_error, ErrorInfo, ReproError};
use repro_core::hash::sha256_file;
use repro_core::{Artifact, ArtifactKind, NodeId};
use repro_exec::{shell_quote, Invocation};
use tracing::{info, warn};

use crate::compare::{compare_document, Comparison};
use crate::context::RunContext;
use crate::manifest::{ArtifactRecord, RunManifest};

/// Which result tables a distribution copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelection {
    /// Every non-stale file matching the result-table pattern, plus runner logs.
    Pattern,
    /// Exactly these file names from the node directory.
    Named(Vec<String>),
}

/// What a distribution pass did for one node.
#[derive(Debug, Clone, Default)]
pub struct DistributionReport {
    pub scripts_run: usize,
    pub render_failures: Vec<ReproError>,
    /// Rendered documents collected from the node after rendering.
    pub documents: Vec<PathBuf>,
    /// Files written below the output root.
    pub copied: Vec<Artifact>,
    pub comparisons: Vec<Comparison>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Node directory followed by its existing rendering sub-locations.
fn search_dirs(ctx: &RunContext, node: &NodeId) -> Vec<PathBuf> {
    let base = ctx.node_dir(node);
    let mut dirs = vec![base.clone()];
    dirs.extend(
        ctx.config()
            .artifacts()
            .render_dirs
            .iter()
            .map(|sub| base.join(sub))
            .filter(|dir| dir.is_dir()),
    );
    dirs
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect()
}

fn dedup_canonical(paths: impl IntoIterator<Item = PathBuf>, seen: &mut BTreeSet<PathBuf>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|path| seen.insert(fs::canonicalize(path).unwrap_or_else(|_| path.clone())))
        .collect()
}

/// Rendering scripts for a node, pattern by pattern, each group sorted.
pub fn render_scripts(ctx: &RunContext, node: &NodeId) -> Vec<PathBuf> {
    let dirs = search_dirs(ctx, node);
    let mut seen = BTreeSet::new();
    let mut scripts = Vec::new();
    for matcher in ctx.config().render_matchers() {
        let mut hits = dirs
            .iter()
            .flat_map(|dir| files_in(dir))
            .filter(|path| matcher.is_match(file_name(path)))
            .collect::<Vec<_>>();
        hits.sort();
        scripts.extend(dedup_canonical(hits, &mut seen));
    }
    scripts
}

/// Rendered documents currently present for a node, sorted.
pub fn rendered_documents(ctx: &RunContext, node: &NodeId) -> Vec<PathBuf> {
    let mut docs = search_dirs(ctx, node)
        .iter()
        .flat_map(|dir| files_in(dir))
        .filter(|path| ctx.config().is_document(&file_name(path)))
        .collect::<Vec<_>>();
    docs.sort();
    let mut seen = BTreeSet::new();
    dedup_canonical(docs, &mut seen)
}

/// True when the node directory holds at least one result table.
pub fn has_result_table(ctx: &RunContext, node: &NodeId) -> bool {
    files_in(&ctx.node_dir(node))
        .iter()
        .any(|path| ctx.config().is_result_table(&file_name(path)))
}

/// Tables (and runner logs) to distribute for a node.
pub fn distributable_tables(
    ctx: &RunContext,
    node: &NodeId,
    selection: &TableSelection,
) -> Vec<(PathBuf, ArtifactKind)> {
    let dir = ctx.node_dir(node);
    match selection {
        TableSelection::Pattern => {
            let mut tables = files_in(&dir)
                .into_iter()
                .filter(|path| {
                    let name = file_name(path);
                    ctx.config().is_result_table(&name) && !ctx.config().is_stale_table(&name)
                })
                .collect::<Vec<_>>();
            tables.sort();
            let mut out = tables
                .into_iter()
                .map(|path| (path, ArtifactKind::ResultTable))
                .collect::<Vec<_>>();
            out.extend(
                ctx.config()
                    .artifacts()
                    .runner_logs
                    .iter()
                    .map(|name| dir.join(name))
                    .filter(|path| path.is_file())
                    .map(|path| (path, ArtifactKind::RunnerLog)),
            );
            out
        }
        TableSelection::Named(names) => names
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| {
                let present = path.is_file();
                if !present {
                    warn!(node = %node, table = %path.display(), "named table missing");
                }
                present
            })
            .map(|path| (path, ArtifactKind::ResultTable))
            .collect(),
    }
}

/// Runs each rendering script in its own directory. Failures are collected
/// and logged, never raised.
pub fn run_render_scripts(ctx: &RunContext, node: &NodeId) -> (usize, Vec<ReproError>) {
    let scripts = render_scripts(ctx, node);
    let mut failures = Vec::new();
    for script in &scripts {
        let name = file_name(script);
        let stem = script
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cwd = script.parent().map(Path::to_path_buf).unwrap_or_else(|| ctx.node_dir(node));
        let log = ctx.logs().render(node, &stem);
        let command = format!(
            "{} {}",
            shell_quote(&ctx.config().tools().python),
            shell_quote(&name)
        );
        info!(node = %node, script = %name, "rendering");
        let invocation = Invocation::new(node.as_str(), command, &cwd, &log);
        let outcome = match ctx.executor().run_streamed(&invocation) {
            Ok(result) if result.success() => None,
            Ok(result) => Some(format!("exit={}", result.exit_code)),
            Err(err) => Some(err.to_string()),
        };
        if let Some(reason) = outcome {
            let err = ReproError::Render(
                ErrorInfo::new("repro.render_failed", format!("rendering script failed: {reason}"))
                    .with_context("dir", ctx.root_relative(&cwd))
                    .with_context("script", name.clone())
                    .with_context("log", log.display().to_string()),
            );
            warn!(error = %err, "rendering failed; continuing");
            failures.push(err);
        }
    }
    (scripts.len(), failures)
}

fn copy_artifact(
    ctx: &RunContext,
    src: &Path,
    dst: &Path,
    kind: ArtifactKind,
    manifest: &mut RunManifest,
) -> Result<(), ReproError> {
    fs::copy(src, dst).map_err(|err| io_error("repro.distribute_copy", dst, err))?;
    record(ctx, src, dst, kind, manifest)
}

fn record(
    ctx: &RunContext,
    src: &Path,
    dst: &Path,
    kind: ArtifactKind,
    manifest: &mut RunManifest,
) -> Result<(), ReproError> {
    manifest.record_artifact(ArtifactRecord {
        destination: ctx.out_relative(dst),
        source: ctx.root_relative(src),
        kind,
        sha256: sha256_file(dst)?,
    });
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<(), ReproError> {
    fs::create_dir_all(dir).map_err(|err| io_error("repro.distribute_dir", dir, err))
}

/// Renders a node, then copies its tables and documents to every mapped
/// destination, producing comparisons where a reference document exists.
pub fn render_and_distribute(
    ctx: &RunContext,
    node: &NodeId,
    selection: &TableSelection,
    manifest: &mut RunManifest,
) -> Result<DistributionReport, ReproError> {
    let (scripts_run, render_failures) = run_render_scripts(ctx, node);
    let documents = rendered_documents(ctx, node);
    let tables = distributable_tables(ctx, node, selection);
    let reference_dir = ctx.node_dir(node).join(&ctx.config().artifacts().reference_dir);
    let mut report = DistributionReport {
        scripts_run,
        render_failures,
        documents: documents.clone(),
        ..DistributionReport::default()
    };

    for destination in ctx.config().destinations(node) {
        let dest_dir = ctx.out_root().join(&destination.rel);
        ensure_dir(&dest_dir)?;
        for (table, kind) in &tables {
            let dst = dest_dir.join(file_name(table));
            copy_artifact(ctx, table, &dst, *kind, manifest)?;
            report.copied.push(Artifact {
                node: node.clone(),
                path: dst,
                kind: *kind,
            });
        }

        let accepted = documents
            .iter()
            .filter(|doc| destination.accepts(&file_name(doc)))
            .collect::<Vec<_>>();
        if accepted.is_empty() {
            continue;
        }
        let plots = dest_dir.join(&ctx.config().output().documents_dir);
        ensure_dir(&plots)?;
        for doc in accepted {
            let name = file_name(doc);
            let dst = plots.join(&name);
            copy_artifact(ctx, doc, &dst, ArtifactKind::RenderedDocument, manifest)?;
            report.copied.push(Artifact {
                node: node.clone(),
                path: dst.clone(),
                kind: ArtifactKind::RenderedDocument,
            });

            let reference = reference_dir.join(&name);
            if !reference.is_file() {
                continue;
            }
            let comparison = compare_document(ctx, node, &reference, &dst, &plots);
            for output in comparison.merged.iter().chain(comparison.side_by_side.iter()) {
                record(ctx, doc, output, ArtifactKind::Comparison, manifest)?;
                report.copied.push(Artifact {
                    node: node.clone(),
                    path: output.clone(),
                    kind: ArtifactKind::Comparison,
                });
            }
            report.comparisons.push(comparison);
        }
        info!(
            node = %node,
            destination = %ctx.out_relative(&dest_dir),
            "distributed artifacts"
        );
    }
    Ok(report)
}
