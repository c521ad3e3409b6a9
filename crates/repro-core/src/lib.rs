#![doc = "Data model, error taxonomy and immutable configuration tables shared by the reproducibility orchestrator crates."]

pub mod config;
pub mod errors;
/// Content hashing for distributed artifacts.
pub mod hash;
/// Canonical JSON helpers.
pub mod serde;
mod types;

pub use config::{
    CohortSpec, CompiledConfig, CopyRule, Destination, FileRef, MergeRule, PipelineConfig,
    RepetitionMode, RepetitionRule,
};
pub use errors::{ErrorInfo, ReproError};
pub use types::{
    Artifact, ArtifactKind, CohortId, ExperimentNode, NodeId, NodeKind, NodeState, PostAction,
    RunResult,
};
