use classifier::{cache_key, normalize_input, validate_label};
use dialogue_core::CacheCategory;
use proptest::prelude::*;

fn any_category() -> impl Strategy<Value = CacheCategory> {
    prop_oneof![
        Just(CacheCategory::Factual),
        Just(CacheCategory::Philosophical),
        Just(CacheCategory::ProblemSolving),
        Just(CacheCategory::Sensitive),
        Just(CacheCategory::LeadState),
    ]
}

proptest! {
    #[test]
    fn normalization_is_idempotent(input in "\\PC{0,200}") {
        let once = normalize_input(&input);
        prop_assert_eq!(normalize_input(&once), once);
    }

    #[test]
    fn spacing_and_case_do_not_change_key(
        words in prop::collection::vec("[a-zа-я]{1,10}", 1..8),
        category in any_category()
    ) {
        let plain = words.join(" ");
        let noisy = format!("  {}  ", words.join("   ").to_uppercase());
        prop_assert_eq!(cache_key(&plain, category), cache_key(&noisy, category));
    }

    #[test]
    fn key_is_prefixed_by_category(input in "\\PC{0,100}", category in any_category()) {
        let key = cache_key(&input, category);
        let prefix = format!("{category}:");
        prop_assert!(key.starts_with(&prefix));
        prop_assert_eq!(key.len(), prefix.len() + 16);
    }

    #[test]
    fn validated_label_is_always_known(raw in "\\PC{0,40}", category in any_category()) {
        let (label, _) = validate_label(&raw, category);
        prop_assert!(classifier::policy(category).labels.contains(&label.as_str()));
    }
}
