//! Mapper Module Tests
//!
//! ## Test Scopes
//! - **Registry**: registration, lookup, and the error for unknown names.
//! - **Word count**: tokenisation and counting of the built-in function.

#[cfg(test)]
mod tests {
    use crate::error::ClusterError;
    use crate::mapper::MapRegistry;
    use crate::mapper::word_count;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[test]
    fn test_registry_register_and_resolve() {
        let registry = MapRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        registry.register("upper", move |line| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            vec![(line.to_uppercase(), "1".to_string())]
        });

        assert!(registry.contains("upper"));
        assert_eq!(registry.len(), 1);

        let map = registry.resolve("upper").expect("registered function");
        assert_eq!(map("abc"), vec![("ABC".to_string(), "1".to_string())]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_unknown_name_is_configuration_error() {
        let registry = MapRegistry::new();

        let result = registry.resolve("missing");
        assert!(matches!(result, Err(ClusterError::Configuration(_))));
        assert!(
            result
                .err()
                .unwrap()
                .to_string()
                .contains("Unknown map function")
        );
    }

    #[test]
    fn test_builtins_include_word_count() {
        let registry = MapRegistry::with_builtins();
        assert!(registry.contains(word_count::NAME));
        assert_eq!(registry.names(), vec!["word_count".to_string()]);
    }

    #[test]
    fn test_registering_twice_replaces() {
        let registry = MapRegistry::new();
        registry.register("f", |_| vec![("a".into(), "1".into())]);
        registry.register("f", |_| vec![("b".into(), "2".into())]);

        assert_eq!(registry.len(), 1);
        let map = registry.resolve("f").unwrap();
        assert_eq!(map("x"), vec![("b".to_string(), "2".to_string())]);
    }

    // ============================================================
    // WORD COUNT TESTS
    // ============================================================

    #[test]
    fn test_word_count_counts_repeated_words() {
        let result = word_count::map_line("the cat saw the dog, the end.");

        assert_eq!(
            result,
            vec![
                ("the".to_string(), "3".to_string()),
                ("cat".to_string(), "1".to_string()),
                ("saw".to_string(), "1".to_string()),
                ("dog".to_string(), "1".to_string()),
                ("end".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_word_count_splits_on_punctuation() {
        let result = word_count::map_line("a;b:c?d!e");
        let keys: Vec<&str> = result.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_word_count_empty_line() {
        assert!(word_count::map_line("").is_empty());
        assert!(word_count::map_line("  ,, ..").is_empty());
    }

    #[test]
    fn test_word_count_is_case_sensitive() {
        let result = word_count::map_line("Word word");
        assert_eq!(result.len(), 2);
    }
}
