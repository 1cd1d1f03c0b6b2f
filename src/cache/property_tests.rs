//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the memory driver against a simple reference model.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;

use crate::cache::MemoryCacheStore;
use crate::contracts::{CacheStore, TaggableCacheStore};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const MODEL_MAX_ENTRIES: usize = 4;
const KEY_UNIVERSE: usize = 6;
const TAG_UNIVERSE: usize = 3;

fn store(max_entries: usize) -> MemoryCacheStore {
    MemoryCacheStore::new(NonZeroUsize::new(max_entries).unwrap())
}

// == Strategies ==
/// Generates cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,64}"
}

/// Generates JSON payloads of a few shapes
fn valid_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,64}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        prop::collection::vec(any::<i32>(), 0..8).prop_map(|v| json!(v)),
    ]
}

fn small_key() -> impl Strategy<Value = String> {
    (0..KEY_UNIVERSE).prop_map(|i| format!("k{i}"))
}

fn small_tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec((0..TAG_UNIVERSE).prop_map(|i| format!("t{i}")), 0..3)
}

/// Operations applied to both the store and the model
#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, tags: Vec<String>, value: i64 },
    Get { key: String },
    Forget { key: String },
    FlushTags { tags: Vec<String> },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (small_key(), small_tags(), any::<i64>())
            .prop_map(|(key, tags, value)| CacheOp::Put { key, tags, value }),
        2 => small_key().prop_map(|key| CacheOp::Get { key }),
        1 => small_key().prop_map(|key| CacheOp::Forget { key }),
        1 => small_tags().prop_map(|tags| CacheOp::FlushTags { tags }),
    ]
}

// == Reference Model ==
/// Recency list plus entry map; the front of `order` is least recently used.
#[derive(Default)]
struct Model {
    order: Vec<String>,
    entries: HashMap<String, (i64, BTreeSet<String>)>,
}

impl Model {
    fn promote(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push(key.to_string());
    }

    fn remove(&mut self, key: &str) -> bool {
        self.order.retain(|k| k != key);
        self.entries.remove(key).is_some()
    }

    fn put(&mut self, key: &str, value: i64, tags: &[String]) {
        self.entries
            .insert(key.to_string(), (value, tags.iter().cloned().collect()));
        self.promote(key);
        if self.entries.len() > MODEL_MAX_ENTRIES {
            let victim = self.order.remove(0);
            self.entries.remove(&victim);
        }
    }

    fn get(&mut self, key: &str) -> Option<i64> {
        let value = self.entries.get(key).map(|(value, _)| *value)?;
        self.promote(key);
        Some(value)
    }

    fn flush_tags(&mut self, tags: &[String]) {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, (_, entry_tags))| tags.iter().any(|t| entry_tags.contains(t)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.remove(&key);
        }
    }

    fn keys_for_tag(&self, tag: &str) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, (_, tags))| tags.contains(tag))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storing a pair and reading it back before expiry returns the same payload.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let store = store(TEST_MAX_ENTRIES);

        let retrieved = tokio_test::block_on(async {
            store.put(&key, value.clone(), Some("1h".into())).await.unwrap();
            store.get(&key).await.unwrap()
        });

        prop_assert_eq!(retrieved, Some(value), "Round-trip value mismatch");
    }

    // A second write to the same key replaces the first and keeps one entry.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let store = store(TEST_MAX_ENTRIES);

        let (retrieved, len) = tokio_test::block_on(async {
            store.put(&key, value1, None).await.unwrap();
            store.put(&key, value2.clone(), None).await.unwrap();
            (store.get(&key).await.unwrap(), store.len().await)
        });

        prop_assert_eq!(retrieved, Some(value2), "Overwrite should return new value");
        prop_assert_eq!(len, 1, "Should have exactly one entry after overwrite");
    }

    // The number of entries never exceeds the configured bound.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec(
            (valid_key_strategy(), valid_value_strategy()),
            1..200
        )
    ) {
        let max_entries = 50;
        let store = store(max_entries);

        tokio_test::block_on(async {
            for (key, value) in entries {
                store.put(&key, value, None).await.unwrap();
                let len = store.len().await;
                prop_assert!(len <= max_entries, "Cache size {} exceeds max {}", len, max_entries);
            }
            Ok(())
        })?;
    }

    // Forgetting a stored key makes it unreadable.
    #[test]
    fn prop_forget_removes_entry(key in valid_key_strategy(), value in valid_value_strategy()) {
        let store = store(TEST_MAX_ENTRIES);

        let (removed, after) = tokio_test::block_on(async {
            store.put(&key, value, None).await.unwrap();
            let removed = store.forget(&key).await.unwrap();
            (removed, store.get(&key).await.unwrap())
        });

        prop_assert!(removed);
        prop_assert_eq!(after, None);
    }

    // Random puts, reads, deletes and tag flushes leave the store matching the
    // reference model: same live keys, LRU victims, per-entry tags, reverse tag
    // index and hit/miss counts.
    #[test]
    fn prop_matches_reference_model(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let store = store(MODEL_MAX_ENTRIES);
        let mut model = Model::default();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Put { key, tags, value } => {
                        store
                            .put_with_tags(&key, Value::from(value), &tags, None)
                            .await
                            .unwrap();
                        model.put(&key, value, &tags);
                    }
                    CacheOp::Get { key } => {
                        let actual = store.get(&key).await.unwrap();
                        let expected = model.get(&key);
                        if expected.is_some() {
                            expected_hits += 1;
                        } else {
                            expected_misses += 1;
                        }
                        prop_assert_eq!(actual, expected.map(Value::from));
                    }
                    CacheOp::Forget { key } => {
                        let removed = store.forget(&key).await.unwrap();
                        prop_assert_eq!(removed, model.remove(&key));
                    }
                    CacheOp::FlushTags { tags } => {
                        store.flush_tags(&tags).await.unwrap();
                        model.flush_tags(&tags);
                    }
                }

                prop_assert_eq!(store.len().await, model.entries.len());

                for i in 0..KEY_UNIVERSE {
                    let key = format!("k{i}");
                    let expected_tags = model
                        .entries
                        .get(&key)
                        .map(|(_, tags)| tags.clone())
                        .unwrap_or_default();
                    let live = model.entries.contains_key(&key);
                    prop_assert_eq!(store.has(&key).await.unwrap(), live);
                    prop_assert_eq!(store.tags_for(&key).await, expected_tags);
                }

                for i in 0..TAG_UNIVERSE {
                    let tag = format!("t{i}");
                    prop_assert_eq!(store.keys_for_tag(&tag).await, model.keys_for_tag(&tag));
                }
            }

            let stats = store.stats().await;
            prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
            prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
            prop_assert_eq!(stats.total_entries, model.entries.len(), "Total entries mismatch");
            Ok(())
        })?;
    }

    // Increment followed by an equal decrement restores the starting value.
    #[test]
    fn prop_increment_decrement_inverse(
        start in -1_000_000i64..1_000_000,
        by in 0i64..1_000_000
    ) {
        let store = store(TEST_MAX_ENTRIES);

        let (up, down) = tokio_test::block_on(async {
            store.put("counter", Value::from(start), None).await.unwrap();
            let up = store.increment("counter", by).await.unwrap();
            let down = store.decrement("counter", by).await.unwrap();
            (up, down)
        });

        prop_assert_eq!(up, start + by);
        prop_assert_eq!(down, start);
    }
}
