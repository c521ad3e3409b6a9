use proptest::prelude::*;
use repro_core::{NodeId, PipelineConfig};

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

proptest! {
    #[test]
    fn unmapped_nodes_get_exactly_one_fallback_destination(
        parts in prop::collection::vec(segment(), 1..5)
    ) {
        let config = PipelineConfig::reproducibility().compile().unwrap();
        let id = NodeId::new(format!("zz_unmapped/{}", parts.join("/")));
        let first = config.destinations(&id);
        let second = config.destinations(&id);
        prop_assert_eq!(first.len(), 1);
        prop_assert_eq!(&first, &second);
        let expected = std::path::Path::new("zz_unmapped").join(id.tag());
        prop_assert_eq!(&first[0].rel, &expected);
        prop_assert!(first[0].allow.is_none());
    }

    #[test]
    fn present_only_variants_sort_before_siblings(name in segment()) {
        prop_assume!(!name.contains("present_only"));
        let config = PipelineConfig::reproducibility().compile().unwrap();
        let plain = NodeId::new(format!("effectiveness/{name}"));
        let present = NodeId::new(format!("effectiveness/{name}/present_only"));
        prop_assert!(config.sort_key(&present) < config.sort_key(&plain));
    }
}
