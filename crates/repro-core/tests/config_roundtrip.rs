use std::fs;

use repro_core::config::DEFAULT_CONFIG_FILE;
use repro_core::{NodeId, PipelineConfig, RepetitionMode};
use tempfile::tempdir;

#[test]
fn default_config_survives_toml_roundtrip() {
    let config = PipelineConfig::reproducibility();
    let rendered = config.to_toml_string().expect("serialize");
    let parsed = PipelineConfig::from_toml_str(&rendered).expect("parse");
    assert_eq!(parsed, config);
}

#[test]
fn resolve_prefers_root_config_file() {
    let root = tempdir().expect("root");
    fs::write(
        root.path().join(DEFAULT_CONFIG_FILE),
        "[repetitions]\nmode = \"env\"\n\n[output]\nroot = \"out\"\n",
    )
    .expect("write config");
    let config = PipelineConfig::resolve(root.path(), None).expect("resolve");
    assert_eq!(config.repetitions.mode, RepetitionMode::Env);
    assert_eq!(config.output.root.to_string_lossy(), "out");
    assert_eq!(config.repetitions.variable, "NUM_OF_RUNS");
}

#[test]
fn resolve_without_file_uses_builtin_tables() {
    let root = tempdir().expect("root");
    let config = PipelineConfig::resolve(root.path(), None).expect("resolve");
    assert_eq!(config, PipelineConfig::reproducibility());
}

#[test]
fn malformed_config_reports_parse_error() {
    let err = PipelineConfig::from_toml_str("cohorts = 5").expect_err("must fail");
    assert_eq!(err.info().code, "repro.config_parse");
}

#[test]
fn by_document_entries_yield_one_destination_per_file() {
    let config = PipelineConfig::reproducibility().compile().expect("compile");
    let dests = config.destinations(&NodeId::new("real_world_experiments/citi_bike"));
    assert_eq!(dests.len(), 3);
    for dest in &dests {
        assert!(dest.rel.starts_with("real_world_experiments"));
        assert_eq!(dest.allow.as_ref().map(|allow| allow.len()), Some(1));
    }
    assert!(dests[0].accepts("CitiBike_latency_lineplot.pdf"));
    assert!(!dests[0].accepts("CitiBike_queries.pdf"));
}

#[test]
fn by_node_entry_accepts_every_document() {
    let config = PipelineConfig::reproducibility().compile().expect("compile");
    let dests = config.destinations(&NodeId::new("effectiveness/ablation_study"));
    assert_eq!(dests.len(), 1);
    assert_eq!(
        dests[0].rel.to_string_lossy(),
        "effectiveness/Figure7a_ablation_study"
    );
    assert!(dests[0].accepts("anything.pdf"));
}
