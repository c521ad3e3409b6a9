use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use repro_core::errors::{io_error, ReproError};
use repro_core::serde::{from_json_slice, to_canonical_json_bytes};
use repro_core::{ArtifactKind, NodeId, NodeState};
use serde::{Deserialize, Serialize};

/// A file copied into the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Path relative to the output root.
    pub destination: String,
    /// Path relative to the experiment root.
    pub source: String,
    pub kind: ArtifactKind,
    pub sha256: String,
}

/// Persisted run state: node completion plus the distribution ledger.
///
/// Loaded at startup so an interrupted run can resume; nodes missing from the
/// manifest fall back to the result-table existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub started_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeState>,
    /// One entry per destination, sorted by destination.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
}

impl Default for RunManifest {
    fn default() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            started_at: now.clone(),
            updated_at: now,
            nodes: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }
}

impl RunManifest {
    /// Loads a manifest, or starts an empty one when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ReproError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|err| io_error("repro.manifest_read", path, err))?;
        let mut manifest: RunManifest = from_json_slice(&bytes)?;
        manifest.started_at = Utc::now().to_rfc3339();
        Ok(manifest)
    }

    pub fn save(&mut self, path: &Path) -> Result<(), ReproError> {
        self.updated_at = Utc::now().to_rfc3339();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| io_error("repro.manifest_dir", parent, err))?;
        }
        let bytes = to_canonical_json_bytes(self)?;
        fs::write(path, bytes).map_err(|err| io_error("repro.manifest_write", path, err))
    }

    pub fn state(&self, node: &NodeId) -> Option<NodeState> {
        self.nodes.get(node.as_str()).copied()
    }

    pub fn set_state(&mut self, node: &NodeId, state: NodeState) {
        self.nodes.insert(node.as_str().to_string(), state);
    }

    /// Inserts or replaces the record for `record.destination`.
    pub fn record_artifact(&mut self, record: ArtifactRecord) {
        match self
            .artifacts
            .binary_search_by(|probe| probe.destination.cmp(&record.destination))
        {
            Ok(idx) => self.artifacts[idx] = record,
            Err(idx) => self.artifacts.insert(idx, record),
        }
    }

    pub fn artifact(&self, destination: &str) -> Option<&ArtifactRecord> {
        self.artifacts
            .iter()
            .find(|record| record.destination == destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_roundtrips_through_disk() {
        let temp = tempdir().expect("temp");
        let path = temp.path().join("runs/_manifest.json");
        let node = NodeId::new("efficiency/memory_experiment");
        let mut manifest = RunManifest::default();
        manifest.set_state(&node, NodeState::Failed { exit_code: 2 });
        let record = |sha: &str| ArtifactRecord {
            destination: "efficiency/Figure10d_memory_experiment/report.csv".into(),
            source: "efficiency/memory_experiment/report.csv".into(),
            kind: ArtifactKind::ResultTable,
            sha256: sha.into(),
        };
        manifest.record_artifact(record("00"));
        manifest.record_artifact(record("ff"));
        assert_eq!(manifest.artifacts.len(), 1);
        manifest.save(&path).expect("save");
        let loaded = RunManifest::load_or_default(&path).expect("load");
        assert_eq!(loaded.state(&node), Some(NodeState::Failed { exit_code: 2 }));
        assert_eq!(loaded.artifacts, manifest.artifacts);
        assert_eq!(
            loaded
                .artifact("efficiency/Figure10d_memory_experiment/report.csv")
                .map(|record| record.sha256.as_str()),
            Some("ff")
        );
    }

    #[test]
    fn missing_manifest_starts_empty() {
        let temp = tempdir().expect("temp");
        let manifest = RunManifest::load_or_default(&temp.path().join("nope.json")).expect("load");
        assert!(manifest.nodes.is_empty());
    }
}
