use repro_core::errors::{ErrorInfo, ReproError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("node", "effectiveness/ablation_study")
        .with_context("reason", "example")
}

#[test]
fn runner_failure_carries_node_and_exit_code() {
    let err = ReproError::runner_failed("real_world_experiments/citi_bike/query1", 3);
    assert_eq!(err.exit_code(), Some(3));
    assert_eq!(err.node(), Some("real_world_experiments/citi_bike/query1"));
    let rendered = err.to_string();
    assert!(rendered.contains("FAILED real_world_experiments/citi_bike/query1 exit=3"));
    assert!(rendered.contains("hint:"));
}

#[test]
fn non_runner_errors_have_no_exit_code() {
    let err = ReproError::Render(sample_info("R001", "plot failed"));
    assert_eq!(err.exit_code(), None);
    assert_eq!(err.node(), Some("effectiveness/ablation_study"));
}

#[test]
fn error_serializes_with_family_tag() {
    let err = ReproError::Dependency(sample_info("D001", "missing sibling table"));
    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json["family"], "Dependency");
    assert_eq!(json["detail"]["code"], "D001");
    let back: ReproError = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, err);
}
