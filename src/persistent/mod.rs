//! Persistent (immutable) keyed storage.
//!
//! This module provides the structurally shared containers the rest of the
//! crate builds on:
//!
//! - [`PersistentKeyedMap`]: persistent keyed map (HAMT)
//! - [`TransientKeyedMap`]: exclusively-owned draft for batched edits
//!
//! # Structural Sharing
//!
//! Deriving an updated map from a base map reuses unchanged subtrees, so
//! an update creates a new version without copying the entire structure,
//! and old versions remain fully usable. Shared nodes are read-only, so
//! any number of maps and records may share them without synchronization.
//!
//! # Examples
//!
//! ```rust
//! use fieldstone::persistent::PersistentKeyedMap;
//!
//! let map = PersistentKeyedMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//! assert_eq!(map.get("one"), Some(&1));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod keyed_map;

pub use keyed_map::PersistentKeyedMap;
pub use keyed_map::PersistentKeyedMapIntoIterator;
pub use keyed_map::PersistentKeyedMapIterator;
pub use keyed_map::TransientKeyedMap;

pub(crate) use keyed_map::{compute_hash, entry_hash};

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod reference_counter_tests {
    use super::ReferenceCounter;
    use rstest::rstest;

    #[rstest]
    fn test_reference_counter_clone() {
        let reference_counter: ReferenceCounter<i32> = ReferenceCounter::new(42);
        let reference_counter_clone = reference_counter.clone();
        assert_eq!(*reference_counter, *reference_counter_clone);
    }

    #[rstest]
    fn test_reference_counter_strong_count() {
        let reference_counter: ReferenceCounter<i32> = ReferenceCounter::new(42);
        assert_eq!(ReferenceCounter::strong_count(&reference_counter), 1);
        let reference_counter_clone = reference_counter.clone();
        assert_eq!(ReferenceCounter::strong_count(&reference_counter), 2);
        drop(reference_counter_clone);
        assert_eq!(ReferenceCounter::strong_count(&reference_counter), 1);
    }
}
