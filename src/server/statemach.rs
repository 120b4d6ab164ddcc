//! In-memory key/value state machine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The replicated key/value map. Mutated only from the applier's critical
/// section, so apply order totally orders all transitions. The `BTreeMap`
/// backing keeps serialization byte-deterministic across replicas, which
/// the snapshot format relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvStore {
    pairs: BTreeMap<String, String>,
}

impl KvStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        KvStore::default()
    }

    /// Value of `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Unconditionally replaces the value of `key`.
    pub fn put(&mut self, key: String, value: String) {
        self.pairs.insert(key, value);
    }

    /// Concatenates `value` to `key`, treating an absent key as empty.
    pub fn append(&mut self, key: String, value: &str) {
        self.pairs.entry(key).or_default().push_str(value);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod statemach_tests {
    use super::*;

    #[test]
    fn get_empty() {
        let store = KvStore::new();
        assert_eq!(store.get("absent"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn put_one_get_one() {
        let mut store = KvStore::new();
        store.put("k".into(), "180".into());
        assert_eq!(store.get("k"), Some("180"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_overwrites() {
        let mut store = KvStore::new();
        store.put("k".into(), "180".into());
        store.put("k".into(), "185".into());
        assert_eq!(store.get("k"), Some("185"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_concatenates() {
        let mut store = KvStore::new();
        store.put("k".into(), "hello".into());
        store.append("k".into(), " world");
        assert_eq!(store.get("k"), Some("hello world"));
    }

    #[test]
    fn append_to_absent_key() {
        let mut store = KvStore::new();
        store.append("k".into(), "first");
        assert_eq!(store.get("k"), Some("first"));
    }

    #[test]
    fn identical_histories_encode_identically() {
        let build = || {
            let mut store = KvStore::new();
            store.put("zeta".into(), "1".into());
            store.put("alpha".into(), "2".into());
            store.append("zeta".into(), "3");
            store
        };
        let a = rmp_serde::to_vec(&build()).unwrap();
        let b = rmp_serde::to_vec(&build()).unwrap();
        assert_eq!(a, b);
    }
}
