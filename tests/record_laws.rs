//! Property-based tests for records.
//!
//! Verifies default/override fidelity, the size invariant,
//! delete-is-reset, persistence, and the equality/hash contract with
//! proptest.

use fieldstone::record::RecordFactory;
use fieldstone::value::Value;
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

static FIELDS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn arbitrary_defaults() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(any::<i64>(), FIELDS.len()).prop_map(|values| {
        FIELDS
            .iter()
            .zip(values)
            .map(|(field, value)| ((*field).to_string(), value))
            .collect()
    })
}

fn arbitrary_overrides() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec((prop::sample::select(&FIELDS[..]), any::<i64>()), 0..8).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(field, value)| (field.to_string(), value))
                .collect()
        },
    )
}

fn factory_of(defaults: &[(String, i64)]) -> RecordFactory {
    RecordFactory::named(
        "Subject",
        defaults
            .iter()
            .map(|(field, value)| (field.clone(), Value::from(*value))),
    )
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Default fidelity: Factory().get(f) == defaults[f]
// =============================================================================

proptest! {
    #[test]
    fn prop_default_fidelity(defaults in arbitrary_defaults()) {
        let record = factory_of(&defaults).create();

        for (field, value) in &defaults {
            prop_assert_eq!(record.get(field), Some(&Value::from(*value)));
        }
    }
}

// =============================================================================
// Override fidelity: overridden fields read back, others keep defaults
// =============================================================================

proptest! {
    #[test]
    fn prop_override_fidelity(
        defaults in arbitrary_defaults(),
        overrides in arbitrary_overrides()
    ) {
        let factory = factory_of(&defaults);
        let record = factory.build(
            overrides.iter().map(|(field, value)| (field.clone(), Value::from(*value))),
        );

        // Later duplicates win; build a last-write model.
        let mut expected: Vec<(String, i64)> = defaults.clone();
        for (field, value) in &overrides {
            if let Some(entry) = expected.iter_mut().find(|(name, _)| name == field) {
                entry.1 = *value;
            }
        }

        for (field, value) in &expected {
            prop_assert_eq!(record.get(field), Some(&Value::from(*value)));
        }
    }
}

// =============================================================================
// Size invariant: len == schema field count, always
// =============================================================================

proptest! {
    #[test]
    fn prop_size_invariant(
        defaults in arbitrary_defaults(),
        overrides in arbitrary_overrides()
    ) {
        let factory = factory_of(&defaults);
        let record = factory.build(
            overrides.iter().map(|(field, value)| (field.clone(), Value::from(*value))),
        );

        prop_assert_eq!(record.len(), FIELDS.len());
        prop_assert_eq!(record.clear().len(), FIELDS.len());
    }
}

// =============================================================================
// Persistence: set never changes the receiver
// =============================================================================

proptest! {
    #[test]
    fn prop_set_preserves_receiver(
        defaults in arbitrary_defaults(),
        field in prop::sample::select(&FIELDS[..]),
        value in any::<i64>()
    ) {
        let record = factory_of(&defaults).create();
        let snapshot: Vec<Value> = record.iter().map(|(_, v)| v.clone()).collect();

        let _updated = record.set(field, value).unwrap();

        let after: Vec<Value> = record.iter().map(|(_, v)| v.clone()).collect();
        prop_assert_eq!(snapshot, after);
    }
}

// =============================================================================
// Set-get: record.set(f, v).get(f) == v
// =============================================================================

proptest! {
    #[test]
    fn prop_set_get(
        defaults in arbitrary_defaults(),
        field in prop::sample::select(&FIELDS[..]),
        value in any::<i64>()
    ) {
        let updated = factory_of(&defaults).create().set(field, value).unwrap();
        prop_assert_eq!(updated.get(field), Some(&Value::from(value)));
    }
}

// =============================================================================
// Delete-is-reset: set then delete restores the default
// =============================================================================

proptest! {
    #[test]
    fn prop_delete_is_reset(
        defaults in arbitrary_defaults(),
        field in prop::sample::select(&FIELDS[..]),
        value in any::<i64>()
    ) {
        let factory = factory_of(&defaults);
        let cycled = factory
            .create()
            .set(field, value)
            .unwrap()
            .delete(field)
            .unwrap();

        let default = defaults
            .iter()
            .find(|(name, _)| name.as_str() == field)
            .map(|(_, v)| Value::from(*v))
            .unwrap();
        prop_assert_eq!(cycled.get(field), Some(&default));
    }
}

// =============================================================================
// Clear: every field resets, from any starting record
// =============================================================================

proptest! {
    #[test]
    fn prop_clear_restores_defaults(
        defaults in arbitrary_defaults(),
        overrides in arbitrary_overrides()
    ) {
        let factory = factory_of(&defaults);
        let record = factory.build(
            overrides.iter().map(|(field, value)| (field.clone(), Value::from(*value))),
        );

        prop_assert_eq!(record.clear(), factory.create());
    }
}

// =============================================================================
// Equality iff field-wise equality, and the hash law
// =============================================================================

proptest! {
    #[test]
    fn prop_equality_matches_fieldwise(
        defaults in arbitrary_defaults(),
        left in arbitrary_overrides(),
        right in arbitrary_overrides()
    ) {
        let factory = factory_of(&defaults);
        let left_record = factory.build(
            left.iter().map(|(field, value)| (field.clone(), Value::from(*value))),
        );
        let right_record = factory.build(
            right.iter().map(|(field, value)| (field.clone(), Value::from(*value))),
        );

        let fieldwise = FIELDS
            .iter()
            .all(|field| left_record.get(field) == right_record.get(field));

        prop_assert_eq!(left_record == right_record, fieldwise);
        if fieldwise {
            prop_assert_eq!(hash_of(&left_record), hash_of(&right_record));
        }
    }
}

// =============================================================================
// withMutations atomicity: batched edits equal sequential edits
// =============================================================================

proptest! {
    #[test]
    fn prop_with_mutations_matches_sequential_sets(
        defaults in arbitrary_defaults(),
        edits in arbitrary_overrides()
    ) {
        let factory = factory_of(&defaults);
        let record = factory.create();

        let mut expected = record.clone();
        for (field, value) in &edits {
            expected = expected.set(field, *value).unwrap();
        }

        let batched = record.with_mutations(|draft| {
            for (field, value) in &edits {
                draft.set(field, *value).unwrap();
            }
        });

        prop_assert_eq!(&batched, &expected);
        prop_assert_eq!(hash_of(&batched), hash_of(&expected));
    }
}
