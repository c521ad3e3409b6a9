use std::path::{Path, PathBuf};

use repro_core::errors::{io_error, ReproError};
use repro_core::{CompiledConfig, ExperimentNode, NodeId};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// First configured runner present in `dir`, in priority order.
pub fn choose_runner(dir: &Path, config: &CompiledConfig) -> Option<String> {
    config
        .discovery()
        .runners
        .iter()
        .find(|runner| dir.join(runner.as_str()).is_file())
        .cloned()
}

/// Walks `root` and returns the runnable experiment nodes in execution order.
///
/// Directories listed in `exclude` (typically the output tree) are pruned.
pub fn discover(
    root: &Path,
    config: &CompiledConfig,
    exclude: &[PathBuf],
) -> Result<Vec<ExperimentNode>, ReproError> {
    if !root.is_dir() {
        return Err(io_error(
            "repro.discovery_root",
            root,
            "experiment root is not a directory",
        ));
    }
    let mut nodes = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !exclude.iter().any(|skip| entry.path() == skip.as_path()));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry during discovery");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let id = NodeId::from_rel_path(rel);
        if config.is_ignored(id.as_str()) || config.is_family_descendant(&id) {
            continue;
        }
        let Some(runner) = choose_runner(entry.path(), config) else {
            continue;
        };
        debug!(node = %id, runner = %runner, "discovered experiment");
        let category = id.category().to_string();
        nodes.push(ExperimentNode {
            priority: config.priority(&category),
            kind: config.kind_of(&id),
            id,
            category,
            runner,
        });
    }
    nodes.sort_by_cached_key(|node| config.sort_key(&node.id));
    Ok(nodes)
}
