use engine_bridge::search::cache::cache_key;
use proptest::prelude::*;

proptest! {
    #[test]
    fn key_ignores_case_padding_and_order(
        query in "[a-z0-9][a-z0-9 ]{0,24}",
        engines in prop::collection::vec("[a-z]{1,8}", 0..5),
        categories in prop::collection::vec("[a-z]{1,8}", 0..3),
    ) {
        let mut reversed = engines.clone();
        reversed.reverse();
        let mut shuffled_categories: Vec<String> =
            categories.iter().map(|c| c.to_uppercase()).collect();
        shuffled_categories.rotate_left(categories.len().min(1));

        let base = cache_key(&query, &engines, Some(categories.as_slice()));
        let variant = cache_key(
            &format!("  {}\t", query.to_uppercase()),
            &reversed,
            Some(shuffled_categories.as_slice()),
        );

        prop_assert_eq!(&base, &variant);
        prop_assert!(base.starts_with("search:v1:"));
        prop_assert_eq!(base.len(), "search:v1:".len() + 16);
    }

    #[test]
    fn different_queries_get_different_keys(a in "[a-z]{3,12}", b in "[a-z]{3,12}") {
        prop_assume!(a != b);
        prop_assert_ne!(cache_key(&a, &[], None), cache_key(&b, &[], None));
    }
}
