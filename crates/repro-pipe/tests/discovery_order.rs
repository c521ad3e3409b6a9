mod common;

use common::{runner, test_config, write};
use repro_core::NodeKind;
use repro_pipe::discovery::discover;
use tempfile::tempdir;

#[test]
fn discovery_is_ordered_and_deterministic() {
    let temp = tempdir().expect("temp");
    let root = temp.path();
    for node in [
        "misc/zeta",
        "efficiency/alpha",
        "effectiveness/beta",
        "effectiveness/beta_present_only",
        "sensitivity_analysis/gamma",
        "efficiency/flink_core_rematch",
        "efficiency/flink_core_rematch/variant",
        "effectiveness/__pycache__",
        "effectiveness/beta_old",
        "effectiveness/empty",
        "runs/efficiency/copied",
    ] {
        runner(root, node, "echo run");
    }
    write(root, "efficiency/no_runner/README", "nothing here");
    write(root, "efficiency/suse/evaluation_script_suse.sh", "#!/bin/bash\n");
    write(root, "efficiency/suse/run_efficiency_experiments.sh", "#!/bin/bash\n");

    let config = test_config().compile().expect("compile");
    let exclude = [root.join("runs")];
    let nodes = discover(root, &config, &exclude).expect("discover");
    let ids = nodes.iter().map(|node| node.id.as_str()).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "sensitivity_analysis/gamma",
            "effectiveness/beta_present_only",
            "effectiveness/beta",
            "efficiency/alpha",
            "efficiency/flink_core_rematch",
            "efficiency/suse",
            "misc/zeta",
        ]
    );
    assert_eq!(nodes[5].runner, "evaluation_script_suse.sh");
    assert_eq!(nodes[6].priority, 4);
    assert!(nodes.iter().all(|node| node.kind == NodeKind::Standard));

    let again = discover(root, &config, &exclude).expect("discover again");
    assert_eq!(nodes, again);
}

#[test]
fn cohort_roles_are_assigned_at_discovery() {
    let temp = tempdir().expect("temp");
    let root = temp.path();
    runner(root, "real_world_experiments/citi_bike", "echo parent");
    runner(root, "real_world_experiments/citi_bike/query0", "echo q0");
    runner(root, "real_world_experiments/citi_bike/query1", "echo q1");

    let config = test_config().compile().expect("compile");
    let nodes = discover(root, &config, &[]).expect("discover");
    let kinds = nodes
        .iter()
        .map(|node| (node.id.as_str(), node.kind.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            (
                "real_world_experiments/citi_bike",
                NodeKind::DeferredUntilCohortReady("citi_bike".into())
            ),
            (
                "real_world_experiments/citi_bike/query0",
                NodeKind::CohortMember("citi_bike".into())
            ),
            (
                "real_world_experiments/citi_bike/query1",
                NodeKind::CohortMember("citi_bike".into())
            ),
        ]
    );
}

#[test]
fn missing_root_is_an_error() {
    let temp = tempdir().expect("temp");
    let config = test_config().compile().expect("compile");
    let err = discover(&temp.path().join("absent"), &config, &[]).expect_err("no root");
    assert_eq!(err.info().code, "repro.discovery_root");
}
