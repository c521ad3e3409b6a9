//! Experiment discovery, cohort-aware scheduling, artifact distribution,
//! comparison rendering and paper assembly.

pub mod compare;
mod context;
pub mod discovery;
pub mod distribute;
pub mod manifest;
pub mod merge;
pub mod paper;
mod pipeline;
pub mod plan;
mod postprocess;
pub mod scheduler;

pub use context::RunContext;
pub use manifest::{ArtifactRecord, RunManifest};
pub use paper::{PaperAssembler, PaperOutcome};
pub use pipeline::{Pipeline, RunOptions, RunSummary};
pub use postprocess::{PostOutcome, Postprocessor};
pub use scheduler::{plan as plan_steps, Step};
