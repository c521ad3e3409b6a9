use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Relative, `/`-separated directory path identifying an experiment node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Builds an identifier from a relative path, normalising separators.
    pub fn new(rel: impl AsRef<str>) -> Self {
        let joined = rel
            .as_ref()
            .split(['/', '\\'])
            .filter(|part| !part.is_empty() && *part != ".")
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Builds an identifier from a path relative to the experiment root.
    pub fn from_rel_path(rel: &Path) -> Self {
        let parts = rel
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        Self::new(parts.join("/"))
    }

    /// Returns the identifier as a `/`-separated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Top-level path segment, or `other` for an empty identifier.
    pub fn category(&self) -> &str {
        self.0.split('/').next().filter(|seg| !seg.is_empty()).unwrap_or("other")
    }

    /// Flattened form used for log names and fallback destinations.
    pub fn tag(&self) -> String {
        self.0.replace('/', "__")
    }

    /// Resolves the node directory below `root`.
    pub fn dir(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }

    /// Returns true when `self` equals `other` or lies below it.
    pub fn starts_with(&self, other: &NodeId) -> bool {
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId::new(value)
    }
}

/// Declared name of a cohort.
pub type CohortId = String;

/// How a node participates in scheduling and postprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "cohort", rename_all = "snake_case")]
pub enum NodeKind {
    /// Runs solo and postprocesses itself.
    Standard,
    /// Launched together with the rest of its cohort behind a barrier.
    CohortMember(CohortId),
    /// Runs solo but its outputs are rendered when the named cohort merges.
    DeferredUntilCohortReady(CohortId),
}

/// Action taken once a node (or cohort) has finished executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum PostAction {
    /// Copy sibling tables into the cohort's merge target.
    MergeCohort(CohortId),
    /// Run rendering scripts and distribute artifacts for a directory.
    RenderAndDistribute(NodeId),
}

impl NodeKind {
    /// Post-run actions owned by a solo node of this kind. Cohort members and
    /// deferred nodes return nothing: their cohort step carries the actions.
    pub fn post_actions(&self, node: &NodeId) -> Vec<PostAction> {
        match self {
            NodeKind::Standard => vec![PostAction::RenderAndDistribute(node.clone())],
            NodeKind::CohortMember(_) | NodeKind::DeferredUntilCohortReady(_) => Vec::new(),
        }
    }

    /// Cohort this node is tied to, if any.
    pub fn cohort(&self) -> Option<&str> {
        match self {
            NodeKind::Standard => None,
            NodeKind::CohortMember(id) | NodeKind::DeferredUntilCohortReady(id) => Some(id),
        }
    }
}

/// A discovered experiment directory with a runnable entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentNode {
    /// Relative directory path.
    pub id: NodeId,
    /// Top-level path segment.
    pub category: String,
    /// Rank of the category in the priority table.
    pub priority: u32,
    /// File name of the chosen runner inside the node directory.
    pub runner: String,
    /// Scheduling role.
    pub kind: NodeKind,
}

/// Completion state tracked per node in the run manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Done { exit_code: i32 },
    Failed { exit_code: i32 },
}

impl NodeState {
    /// Maps an exit code onto the terminal state.
    pub fn from_exit(exit_code: i32) -> Self {
        if exit_code == 0 {
            NodeState::Done { exit_code }
        } else {
            NodeState::Failed { exit_code }
        }
    }
}

/// Record produced once per executor invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Node (or rendering tag) the invocation belonged to.
    pub node: String,
    /// Exact exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Log file holding the merged output stream.
    pub log: PathBuf,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Classification of a produced file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ResultTable,
    RunnerLog,
    RenderedDocument,
    /// Merged or side-by-side rendering against a reference document.
    Comparison,
}

/// A file produced by a node or its rendering scripts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    /// Producing node.
    pub node: NodeId,
    /// Absolute or root-relative location of the file.
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_normalises_separators() {
        let id = NodeId::new("./effectiveness//ablation_study/");
        assert_eq!(id.as_str(), "effectiveness/ablation_study");
        assert_eq!(id.category(), "effectiveness");
        assert_eq!(id.tag(), "effectiveness__ablation_study");
    }

    #[test]
    fn starts_with_respects_segment_boundaries() {
        let parent = NodeId::new("effectiveness/recall/total_detected_matches");
        let sibling = NodeId::new("effectiveness/recall/total_detected_matches_present_only");
        let child = NodeId::new("effectiveness/recall/total_detected_matches/plot");
        assert!(child.starts_with(&parent));
        assert!(!sibling.starts_with(&parent));
    }

    #[test]
    fn only_standard_nodes_own_post_actions() {
        let node = NodeId::new("efficiency/memory_experiment");
        assert_eq!(
            NodeKind::Standard.post_actions(&node),
            vec![PostAction::RenderAndDistribute(node.clone())]
        );
        assert!(NodeKind::CohortMember("citi".into())
            .post_actions(&node)
            .is_empty());
    }
}
