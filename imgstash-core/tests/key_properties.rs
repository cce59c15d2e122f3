use imgstash_core::{CacheKey, KeyOptions};
use proptest::prelude::*;

fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z0-9_-]{1,12}", 1..5)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

proptest! {
    #[test]
    fn same_path_same_key(
        path in path_strategy(),
        host_a in "[a-z]{1,10}",
        host_b in "[a-z]{1,10}",
        query in "[a-z]{1,8}=[0-9]{1,4}",
    ) {
        let a = CacheKey::from_uri(
            &format!("https://{host_a}.example.com{path}"),
            KeyOptions::default(),
        ).unwrap();
        let b = CacheKey::from_uri(
            &format!("http://{host_b}.example.org{path}?{query}"),
            KeyOptions::default(),
        ).unwrap();

        prop_assert_eq!(&a, &b);
        prop_assert!(CacheKey::is_valid(a.as_str()));
    }

    #[test]
    fn different_paths_different_keys(
        a in path_strategy(),
        b in path_strategy(),
    ) {
        prop_assume!(a != b);
        let ka = CacheKey::from_uri(
            &format!("https://example.com{a}"),
            KeyOptions::default(),
        ).unwrap();
        let kb = CacheKey::from_uri(
            &format!("https://example.com{b}"),
            KeyOptions::default(),
        ).unwrap();

        prop_assert_ne!(ka, kb);
    }
}
