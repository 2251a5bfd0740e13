//! Unit tests for `PersistentKeyedMap`.
//!
//! Exercises construction, persistence of derived versions, removal,
//! merges, and transient batching.

use fieldstone::persistent::{PersistentKeyedMap, TransientKeyedMap};
use rstest::rstest;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Construction
// =============================================================================

#[rstest]
fn new_creates_empty_map() {
    let map: PersistentKeyedMap<String, i32> = PersistentKeyedMap::new();
    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert_eq!(map.get("key"), None);
}

#[rstest]
fn singleton_creates_single_entry_map() {
    let map = PersistentKeyedMap::singleton("key".to_string(), 42);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("key"), Some(&42));
}

#[rstest]
fn from_iter_collects_entries() {
    let entries = vec![("a".to_string(), 1), ("b".to_string(), 2)];
    let map: PersistentKeyedMap<String, i32> = entries.into_iter().collect();

    assert_eq!(map.len(), 2);
    assert_eq!(map.get("a"), Some(&1));
    assert_eq!(map.get("b"), Some(&2));
}

// =============================================================================
// Insert and persistence
// =============================================================================

#[rstest]
fn insert_does_not_modify_original() {
    let map1 = PersistentKeyedMap::new().insert("key".to_string(), 1);
    let map2 = map1.insert("key2".to_string(), 2);

    assert_eq!(map1.len(), 1);
    assert_eq!(map1.get("key2"), None);
    assert_eq!(map2.len(), 2);
    assert_eq!(map2.get("key2"), Some(&2));
}

#[rstest]
fn insert_overwrites_existing_key() {
    let map1 = PersistentKeyedMap::new().insert("key".to_string(), 1);
    let map2 = map1.insert("key".to_string(), 2);

    assert_eq!(map1.get("key"), Some(&1));
    assert_eq!(map2.get("key"), Some(&2));
    assert_eq!(map2.len(), 1);
}

#[rstest]
fn deep_tries_store_hundreds_of_keys() {
    let map: PersistentKeyedMap<String, usize> = (0..500)
        .map(|index| (format!("key-{index}"), index))
        .collect();

    assert_eq!(map.len(), 500);
    for index in 0..500 {
        assert_eq!(map.get(&format!("key-{index}")), Some(&index));
    }
}

#[rstest]
fn old_versions_stay_valid_across_many_derivations() {
    let mut versions = vec![PersistentKeyedMap::new()];
    for index in 0..100 {
        let next = versions
            .last()
            .unwrap()
            .insert(format!("key-{index}"), index);
        versions.push(next);
    }

    for (count, version) in versions.iter().enumerate() {
        assert_eq!(version.len(), count);
    }
}

// =============================================================================
// Remove
// =============================================================================

#[rstest]
fn remove_existing_key() {
    let map = PersistentKeyedMap::new()
        .insert("a".to_string(), 1)
        .insert("b".to_string(), 2);
    let removed = map.remove("a");

    assert_eq!(map.len(), 2);
    assert_eq!(removed.len(), 1);
    assert_eq!(removed.get("a"), None);
    assert_eq!(removed.get("b"), Some(&2));
}

#[rstest]
fn remove_missing_key_returns_equal_map() {
    let map = PersistentKeyedMap::new().insert("a".to_string(), 1);
    let removed = map.remove("missing");

    assert_eq!(map, removed);
    assert_eq!(removed.len(), 1);
}

#[rstest]
fn remove_down_to_empty() {
    let map = PersistentKeyedMap::new().insert("only".to_string(), 1);
    let emptied = map.remove("only");

    assert!(emptied.is_empty());
    assert_eq!(emptied, PersistentKeyedMap::new());
}

// =============================================================================
// Update
// =============================================================================

#[rstest]
fn update_existing_key() {
    let map = PersistentKeyedMap::new().insert("count".to_string(), 10);
    let updated = map.update("count", |value| value + 1).unwrap();

    assert_eq!(updated.get("count"), Some(&11));
    assert_eq!(map.get("count"), Some(&10));
}

#[rstest]
fn update_missing_key_returns_none() {
    let map: PersistentKeyedMap<String, i32> = PersistentKeyedMap::new();
    assert!(map.update("missing", |value| value + 1).is_none());
}

#[rstest]
fn update_with_inserts_and_removes() {
    let map: PersistentKeyedMap<String, i32> = PersistentKeyedMap::new();

    let inserted = map.update_with("fresh", |current| {
        assert_eq!(current, None);
        Some(7)
    });
    assert_eq!(inserted.get("fresh"), Some(&7));

    let removed = inserted.update_with("fresh", |_| None);
    assert_eq!(removed.get("fresh"), None);
    assert!(removed.is_empty());
}

// =============================================================================
// Merge
// =============================================================================

#[rstest]
fn merge_is_right_biased() {
    let left = PersistentKeyedMap::new()
        .insert("a".to_string(), 1)
        .insert("b".to_string(), 2);
    let right = PersistentKeyedMap::new()
        .insert("b".to_string(), 20)
        .insert("c".to_string(), 3);

    let merged = left.merge(&right);

    assert_eq!(merged.len(), 3);
    assert_eq!(merged.get("a"), Some(&1));
    assert_eq!(merged.get("b"), Some(&20));
    assert_eq!(merged.get("c"), Some(&3));
}

#[rstest]
fn merge_with_receives_both_sides_and_key() {
    let left = PersistentKeyedMap::new().insert("k".to_string(), 5);
    let right = PersistentKeyedMap::new().insert("k".to_string(), 7);

    let merged = left.merge_with(
        |previous, next, key| {
            assert_eq!(key, "k");
            previous * 100 + next
        },
        &right,
    );

    assert_eq!(merged.get("k"), Some(&507));
}

#[rstest]
fn merge_with_skips_resolver_for_one_sided_keys() {
    let left = PersistentKeyedMap::new().insert("left".to_string(), 1);
    let right = PersistentKeyedMap::new().insert("right".to_string(), 2);

    let merged = left.merge_with(
        |_previous, _next, _key| panic!("no key exists on both sides"),
        &right,
    );

    assert_eq!(merged.len(), 2);
}

// =============================================================================
// Equality and hashing
// =============================================================================

#[rstest]
fn equality_is_order_independent() {
    let forwards: PersistentKeyedMap<String, i32> =
        (0..50).map(|index| (format!("k{index}"), index)).collect();
    let backwards: PersistentKeyedMap<String, i32> = (0..50)
        .rev()
        .map(|index| (format!("k{index}"), index))
        .collect();

    assert_eq!(forwards, backwards);
    assert_eq!(hash_of(&forwards), hash_of(&backwards));
}

#[rstest]
fn unequal_values_break_equality() {
    let left = PersistentKeyedMap::new().insert("a".to_string(), 1);
    let right = PersistentKeyedMap::new().insert("a".to_string(), 2);

    assert_ne!(left, right);
}

#[rstest]
fn hash_survives_churn() {
    let base: PersistentKeyedMap<String, i32> =
        (0..20).map(|index| (format!("k{index}"), index)).collect();
    let churned = base
        .insert("extra".to_string(), 1)
        .insert("extra".to_string(), 2)
        .remove("extra");

    assert_eq!(base, churned);
    assert_eq!(hash_of(&base), hash_of(&churned));
}

// =============================================================================
// Iteration
// =============================================================================

#[rstest]
fn iteration_yields_every_entry_once() {
    let map: PersistentKeyedMap<String, i32> =
        (0..64).map(|index| (format!("k{index}"), index)).collect();

    let mut seen: Vec<String> = map.iter().map(|(key, _)| key.clone()).collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 64);

    let sum: i32 = map.values().sum();
    assert_eq!(sum, (0..64).sum::<i32>());
}

#[rstest]
fn iteration_order_is_stable_across_value_updates() {
    let map: PersistentKeyedMap<String, i32> =
        (0..32).map(|index| (format!("k{index}"), index)).collect();
    let updated = map.insert("k7".to_string(), 700);

    let before: Vec<String> = map.keys().cloned().collect();
    let after: Vec<String> = updated.keys().cloned().collect();
    assert_eq!(before, after);
}

// =============================================================================
// Transients
// =============================================================================

#[rstest]
fn transient_batches_edits_into_one_version() {
    let base: PersistentKeyedMap<String, i32> =
        [("keep".to_string(), 1), ("drop".to_string(), 2)]
            .into_iter()
            .collect();

    let mut draft = base.transient();
    draft.insert("added".to_string(), 3);
    draft.remove("drop");
    assert_eq!(draft.len(), 2);
    assert_eq!(draft.get("added"), Some(&3));
    assert_eq!(draft.get("drop"), None);
    assert_eq!(draft.get("keep"), Some(&1));

    let sealed = draft.persistent();
    assert_eq!(sealed.len(), 2);
    assert_eq!(sealed.get("added"), Some(&3));
    assert_eq!(sealed.get("drop"), None);

    // The base map observed nothing.
    assert_eq!(base.len(), 2);
    assert_eq!(base.get("drop"), Some(&2));
}

#[rstest]
fn independent_transients_do_not_observe_each_other() {
    let base: PersistentKeyedMap<String, i32> =
        [("shared".to_string(), 0)].into_iter().collect();

    let mut first = base.transient();
    let mut second = base.transient();
    first.insert("shared".to_string(), 1);
    second.insert("shared".to_string(), 2);

    assert_eq!(first.persistent().get("shared"), Some(&1));
    assert_eq!(second.persistent().get("shared"), Some(&2));
    assert_eq!(base.get("shared"), Some(&0));
}

#[rstest]
fn with_mutations_returns_original_when_unaltered() {
    let base: PersistentKeyedMap<String, i32> =
        [("a".to_string(), 1)].into_iter().collect();

    let untouched = base.with_mutations(|draft| {
        draft.insert("a".to_string(), 1); // same value, no change
    });

    assert_eq!(untouched, base);
}

#[rstest]
fn transient_new_builds_from_scratch() {
    let mut draft: TransientKeyedMap<String, i32> = TransientKeyedMap::new();
    draft.extend((0..10).map(|index| (format!("k{index}"), index)));

    let sealed = draft.persistent();
    assert_eq!(sealed.len(), 10);
    assert_eq!(sealed.get("k4"), Some(&4));
}
