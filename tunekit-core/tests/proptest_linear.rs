//! Property tests for LoRA target discovery.

mod common;

use common::MockModel;
use proptest::prelude::*;
use tunekit_core::{ModuleInfo, ModuleKind, TuneError, find_all_linear_modules};

fn kind_strategy() -> impl Strategy<Value = ModuleKind> {
    prop_oneof![
        Just(ModuleKind::Linear),
        Just(ModuleKind::Linear4bit),
        Just(ModuleKind::Linear8bitLt),
        Just(ModuleKind::Other),
    ]
}

fn segment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("lm_head".to_string()),
        Just("output_layer".to_string()),
        "[a-z]{1,6}(_proj)?",
        "[0-9]{1,2}",
    ]
}

fn modules_strategy() -> impl Strategy<Value = Vec<ModuleInfo>> {
    prop::collection::vec(
        (prop::collection::vec(segment_strategy(), 1..5), kind_strategy()),
        0..40,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(segments, kind)| ModuleInfo::new(segments.join("."), "Module", kind))
            .collect()
    })
}

proptest! {
    #[test]
    fn never_returns_lm_head_or_duplicates(
        modules in modules_strategy(),
        model_type in prop_oneof![Just("llama"), Just("chatglm"), Just("qwen")],
    ) {
        let model = MockModel::new(model_type, modules);
        let names = find_all_linear_modules(&model).unwrap();

        prop_assert!(!names.iter().any(|n| n == "lm_head"));
        if model_type == "chatglm" {
            prop_assert!(!names.iter().any(|n| n == "output_layer"));
        }
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn unknown_quantization_methods_fail(method in "[a-z]{1,12}") {
        prop_assume!(method != "bitsandbytes");
        let model = MockModel::llama(ModuleKind::Linear).quantized(&method, false);
        let err = find_all_linear_modules(&model).unwrap_err();
        prop_assert!(matches!(err, TuneError::Config(_)));
        prop_assert!(err.to_string().contains(&method));
    }
}
