//! Persistent (immutable) keyed map based on HAMT.
//!
//! This module provides [`PersistentKeyedMap`], the associative container
//! that every other structure in the crate builds on, and
//! [`TransientKeyedMap`], its exclusively-owned draft for batched edits.
//!
//! # Overview
//!
//! `PersistentKeyedMap` is based on Hash Array Mapped Trie (HAMT), a data
//! structure that provides efficient immutable operations. It uses a 32-way
//! branching trie where hash bits are used to navigate the tree.
//!
//! - O(log32 N) get (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len, `is_empty`, and structural hash
//!
//! All operations return new maps without modifying the original, and
//! structural sharing ensures memory efficiency.
//!
//! # Examples
//!
//! ```rust
//! use fieldstone::persistent::PersistentKeyedMap;
//!
//! let map = PersistentKeyedMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```
//!
//! # Content hash
//!
//! Each map carries an order-independent structural hash, maintained
//! incrementally as versions are derived. Equal maps always report equal
//! hashes, `Hash` is O(1), and equality checks use hash inequality as a
//! fast path before falling back to entry-wise comparison. This requires
//! the usual contract that `V`'s `Hash` agrees with its `PartialEq`.
//!
//! # Internal structure
//!
//! The HAMT uses:
//! - 32-way branching (5 bits per level)
//! - Bitmap to track which slots are occupied
//! - Collision nodes for keys with the same hash
//! - Structural sharing via [`ReferenceCounter`](super::ReferenceCounter)

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::ReferenceCounter;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the trie
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting index within a node
const MASK: u64 = (BRANCHING_FACTOR - 1) as u64;

// =============================================================================
// Hash computation
// =============================================================================

/// Computes the hash of a key using `DefaultHasher`.
pub(crate) fn compute_hash<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Mixes a key hash and a value hash into a single entry contribution.
///
/// Entry contributions are combined with a wrapping sum, so the resulting
/// map hash is independent of insertion order; the asymmetric mix keeps a
/// key from cancelling against a value.
pub(crate) fn entry_hash(key_hash: u64, value_hash: u64) -> u64 {
    (key_hash ^ value_hash.rotate_left(32)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Extracts the index at a given depth from a hash.
#[inline]
const fn hash_index(hash: u64, depth: usize) -> usize {
    ((hash >> (depth * BITS_PER_LEVEL)) & MASK) as usize
}

// =============================================================================
// Node Definition
// =============================================================================

/// Internal node structure for the HAMT.
enum Node<K, V> {
    /// Empty node (used as sentinel)
    Empty,
    /// Single key-value entry
    Entry { hash: u64, key: K, value: V },
    /// Bitmap-indexed branch node
    Bitmap {
        /// Bitmap indicating which slots are occupied
        bitmap: u32,
        /// Children (entries or subnodes), compressed
        children: ReferenceCounter<[Child<K, V>]>,
    },
    /// Collision node for keys with the same hash
    Collision {
        hash: u64,
        entries: ReferenceCounter<[(K, V)]>,
    },
}

impl<K: Clone, V: Clone> Clone for Node<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Entry { hash, key, value } => Self::Entry {
                hash: *hash,
                key: key.clone(),
                value: value.clone(),
            },
            Self::Bitmap { bitmap, children } => Self::Bitmap {
                bitmap: *bitmap,
                children: children.clone(),
            },
            Self::Collision { hash, entries } => Self::Collision {
                hash: *hash,
                entries: entries.clone(),
            },
        }
    }
}

/// A child in a bitmap node.
enum Child<K, V> {
    /// A key-value entry
    Entry { key: K, value: V },
    /// A sub-node
    Node(ReferenceCounter<Node<K, V>>),
}

impl<K: Clone, V: Clone> Clone for Child<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Entry { key, value } => Self::Entry {
                key: key.clone(),
                value: value.clone(),
            },
            Self::Node(node) => Self::Node(node.clone()),
        }
    }
}

impl<K, V> Node<K, V> {
    /// Creates an empty node.
    const fn empty() -> Self {
        Self::Empty
    }
}

// =============================================================================
// PersistentKeyedMap Definition
// =============================================================================

/// A persistent (immutable) keyed map based on HAMT.
///
/// `PersistentKeyedMap` is an immutable data structure that uses structural
/// sharing: deriving an updated map from a base map costs O(log N), not an
/// O(N) copy, and old and new versions remain independently valid.
///
/// Iteration order is the deterministic trie order, a pure function of the
/// key set; updates that do not add or remove keys therefore preserve the
/// order of existing keys.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log32 N)        |
/// | `insert`       | O(log32 N)        |
/// | `remove`       | O(log32 N)        |
/// | `contains_key` | O(log32 N)        |
/// | `len`          | O(1)              |
/// | `hash`         | O(1)              |
///
/// # Examples
///
/// ```rust
/// use fieldstone::persistent::PersistentKeyedMap;
///
/// let map = PersistentKeyedMap::singleton("key".to_string(), 42);
/// assert_eq!(map.get("key"), Some(&42));
/// ```
pub struct PersistentKeyedMap<K, V> {
    /// Root node of the trie
    root: ReferenceCounter<Node<K, V>>,
    /// Number of entries
    length: usize,
    /// Order-independent structural hash of the contents
    content_hash: u64,
}

impl<K, V> Clone for PersistentKeyedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            length: self.length,
            content_hash: self.content_hash,
        }
    }
}

impl<K, V> PersistentKeyedMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map: PersistentKeyedMap<String, i32> = PersistentKeyedMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ReferenceCounter::new(Node::empty()),
            length: 0,
            content_hash: 0,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the cached structural hash of the contents.
    ///
    /// Equal maps always report the same value; unequal maps almost always
    /// differ, which is what makes the equality fast path sound.
    #[inline]
    #[must_use]
    pub(crate) const fn content_hash(&self) -> u64 {
        self.content_hash
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash> PersistentKeyedMap<K, V> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map = PersistentKeyedMap::singleton("key".to_string(), 42);
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map = PersistentKeyedMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(key);
        Self::get_from_node(&self.root, key, hash, 0)
    }

    /// Recursive helper for get.
    fn get_from_node<'a, Q>(node: &'a Node<K, V>, key: &Q, hash: u64, depth: usize) -> Option<&'a V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node {
            Node::Empty => None,
            Node::Entry {
                hash: entry_hash,
                key: entry_key,
                value,
            } => {
                if *entry_hash == hash && entry_key.borrow() == key {
                    Some(value)
                } else {
                    None
                }
            }
            Node::Bitmap { bitmap, children } => {
                let index = hash_index(hash, depth);
                let bit = 1u32 << index;

                if bitmap & bit == 0 {
                    // Slot is empty
                    None
                } else {
                    // Count bits to find position in children array
                    let position = (bitmap & (bit - 1)).count_ones() as usize;
                    match &children[position] {
                        Child::Entry {
                            key: child_key,
                            value,
                        } => {
                            if child_key.borrow() == key {
                                Some(value)
                            } else {
                                None
                            }
                        }
                        Child::Node(subnode) => Self::get_from_node(subnode, key, hash, depth + 1),
                    }
                }
            }
            Node::Collision { hash: _, entries } => {
                for (entry_key, value) in entries.iter() {
                    if entry_key.borrow() == key {
                        return Some(value);
                    }
                }
                None
            }
        }
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains the key, the value is replaced.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map1 = PersistentKeyedMap::new().insert("key".to_string(), 1);
    /// let map2 = map1.insert("key".to_string(), 2);
    ///
    /// assert_eq!(map1.get("key"), Some(&1)); // Original unchanged
    /// assert_eq!(map2.get("key"), Some(&2)); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let key_hash = compute_hash(&key);
        let value_hash = compute_hash(&value);
        let (new_root, previous) = Self::insert_into_node(&self.root, key, value, key_hash, 0);

        let mut content_hash = self
            .content_hash
            .wrapping_add(entry_hash(key_hash, value_hash));
        if let Some(previous_value) = &previous {
            content_hash =
                content_hash.wrapping_sub(entry_hash(key_hash, compute_hash(previous_value)));
        }

        Self {
            root: ReferenceCounter::new(new_root),
            length: if previous.is_some() {
                self.length
            } else {
                self.length + 1
            },
            content_hash,
        }
    }

    /// Recursive helper for insert.
    ///
    /// Returns (`new_node`, `previous_value`) where `previous_value` is the
    /// value evicted by a same-key replacement, if any.
    fn insert_into_node(
        node: &Node<K, V>,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        match node {
            Node::Empty => (Node::Entry { hash, key, value }, None),
            Node::Entry {
                hash: existing_hash,
                key: existing_key,
                value: existing_value,
            } => Self::insert_into_entry_node(
                *existing_hash,
                existing_key,
                existing_value,
                key,
                value,
                hash,
                depth,
            ),
            Node::Bitmap { bitmap, children } => {
                Self::insert_into_bitmap_node(*bitmap, children, key, value, hash, depth)
            }
            Node::Collision {
                hash: collision_hash,
                entries,
            } => Self::insert_into_collision_node(
                node,
                *collision_hash,
                entries,
                key,
                value,
                hash,
                depth,
            ),
        }
    }

    /// Helper for inserting into an Entry node.
    fn insert_into_entry_node(
        existing_hash: u64,
        existing_key: &K,
        existing_value: &V,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        if existing_hash == hash && *existing_key == key {
            // Same key, replace value
            (
                Node::Entry { hash, key, value },
                Some(existing_value.clone()),
            )
        } else if existing_hash == hash {
            // Hash collision - create collision node
            let entries = ReferenceCounter::from(vec![
                (existing_key.clone(), existing_value.clone()),
                (key, value),
            ]);
            (Node::Collision { hash, entries }, None)
        } else {
            // Different hash - need to create a bitmap node
            Self::create_bitmap_from_two_entries(
                existing_hash,
                existing_key,
                existing_value,
                key,
                value,
                hash,
                depth,
            )
        }
    }

    /// Creates a bitmap node from two entries with different hashes.
    fn create_bitmap_from_two_entries(
        existing_hash: u64,
        existing_key: &K,
        existing_value: &V,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        let existing_index = hash_index(existing_hash, depth);
        let new_index = hash_index(hash, depth);

        if existing_index == new_index {
            // Same index at this level - recurse
            let sub_entry = Node::Entry {
                hash: existing_hash,
                key: existing_key.clone(),
                value: existing_value.clone(),
            };
            let (subnode, previous) =
                Self::insert_into_node(&sub_entry, key, value, hash, depth + 1);
            let bitmap = 1u32 << existing_index;
            let children =
                ReferenceCounter::from(vec![Child::Node(ReferenceCounter::new(subnode))]);
            (Node::Bitmap { bitmap, children }, previous)
        } else {
            // Different indices - create bitmap with two children
            let bitmap = (1u32 << existing_index) | (1u32 << new_index);
            let children: Vec<Child<K, V>> = if existing_index < new_index {
                vec![
                    Child::Entry {
                        key: existing_key.clone(),
                        value: existing_value.clone(),
                    },
                    Child::Entry { key, value },
                ]
            } else {
                vec![
                    Child::Entry { key, value },
                    Child::Entry {
                        key: existing_key.clone(),
                        value: existing_value.clone(),
                    },
                ]
            };
            (
                Node::Bitmap {
                    bitmap,
                    children: ReferenceCounter::from(children),
                },
                None,
            )
        }
    }

    /// Helper for inserting into a Bitmap node.
    fn insert_into_bitmap_node(
        bitmap: u32,
        children: &ReferenceCounter<[Child<K, V>]>,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        let index = hash_index(hash, depth);
        let bit = 1u32 << index;
        let position = (bitmap & (bit - 1)).count_ones() as usize;

        if bitmap & bit == 0 {
            // Slot is empty - add new entry
            let mut new_children = children.to_vec();
            new_children.insert(position, Child::Entry { key, value });
            (
                Node::Bitmap {
                    bitmap: bitmap | bit,
                    children: ReferenceCounter::from(new_children),
                },
                None,
            )
        } else {
            // Slot is occupied
            Self::insert_into_occupied_slot(bitmap, children, position, key, value, hash, depth)
        }
    }

    /// Helper for inserting into an occupied slot in a Bitmap node.
    fn insert_into_occupied_slot(
        bitmap: u32,
        children: &ReferenceCounter<[Child<K, V>]>,
        position: usize,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        let mut new_children = children.to_vec();

        let (new_child, previous) = match &children[position] {
            Child::Entry {
                key: child_key,
                value: child_value,
            } => {
                let child_hash = compute_hash(child_key);
                if *child_key == key {
                    (Child::Entry { key, value }, Some(child_value.clone()))
                } else if child_hash == hash {
                    let collision = Node::Collision {
                        hash,
                        entries: ReferenceCounter::from(vec![
                            (child_key.clone(), child_value.clone()),
                            (key, value),
                        ]),
                    };
                    (Child::Node(ReferenceCounter::new(collision)), None)
                } else {
                    let child_entry = Node::Entry {
                        hash: child_hash,
                        key: child_key.clone(),
                        value: child_value.clone(),
                    };
                    let (subnode, previous) =
                        Self::insert_into_node(&child_entry, key, value, hash, depth + 1);
                    (Child::Node(ReferenceCounter::new(subnode)), previous)
                }
            }
            Child::Node(subnode) => {
                let (new_subnode, previous) =
                    Self::insert_into_node(subnode, key, value, hash, depth + 1);
                (Child::Node(ReferenceCounter::new(new_subnode)), previous)
            }
        };

        new_children[position] = new_child;
        (
            Node::Bitmap {
                bitmap,
                children: ReferenceCounter::from(new_children),
            },
            previous,
        )
    }

    /// Helper for inserting into a Collision node.
    fn insert_into_collision_node(
        node: &Node<K, V>,
        collision_hash: u64,
        entries: &ReferenceCounter<[(K, V)]>,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        if hash == collision_hash {
            // Same hash - update or add to collision node
            let mut new_entries = entries.to_vec();
            let mut previous = None;

            for entry in &mut new_entries {
                if entry.0 == key {
                    previous = Some(std::mem::replace(&mut entry.1, value.clone()));
                    break;
                }
            }

            if previous.is_none() {
                new_entries.push((key, value));
            }

            (
                Node::Collision {
                    hash: collision_hash,
                    entries: ReferenceCounter::from(new_entries),
                },
                previous,
            )
        } else {
            // Different hash - convert to bitmap node
            Self::convert_collision_to_bitmap(node, collision_hash, key, value, hash, depth)
        }
    }

    /// Converts a Collision node to a Bitmap node when a new hash is encountered.
    fn convert_collision_to_bitmap(
        node: &Node<K, V>,
        collision_hash: u64,
        key: K,
        value: V,
        hash: u64,
        depth: usize,
    ) -> (Node<K, V>, Option<V>) {
        let collision_index = hash_index(collision_hash, depth);
        let new_index = hash_index(hash, depth);

        if collision_index == new_index {
            // Same index - recurse with collision as subnode
            let (subnode, previous) = Self::insert_into_node(node, key, value, hash, depth + 1);
            let bitmap = 1u32 << collision_index;
            let children =
                ReferenceCounter::from(vec![Child::Node(ReferenceCounter::new(subnode))]);
            (Node::Bitmap { bitmap, children }, previous)
        } else {
            let bitmap = (1u32 << collision_index) | (1u32 << new_index);
            let children: Vec<Child<K, V>> = if collision_index < new_index {
                vec![
                    Child::Node(ReferenceCounter::new(node.clone())),
                    Child::Entry { key, value },
                ]
            } else {
                vec![
                    Child::Entry { key, value },
                    Child::Node(ReferenceCounter::new(node.clone())),
                ]
            };
            (
                Node::Bitmap {
                    bitmap,
                    children: ReferenceCounter::from(children),
                },
                None,
            )
        }
    }

    /// Removes a key from the map.
    ///
    /// Returns a new map without the key. If the key doesn't exist, the
    /// returned map shares its root with the original and compares equal
    /// to it.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map = PersistentKeyedMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let removed = map.remove("a");
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get("a"), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let key_hash = compute_hash(key);
        match Self::remove_from_node(&self.root, key, key_hash, 0) {
            Some((new_root, removed_value)) => Self {
                root: ReferenceCounter::new(new_root),
                length: self.length - 1,
                content_hash: self
                    .content_hash
                    .wrapping_sub(entry_hash(key_hash, compute_hash(&removed_value))),
            },
            None => self.clone(),
        }
    }

    /// Recursive helper for remove.
    ///
    /// Returns `Some((new_node, removed_value))`, or `None` if the key is
    /// absent and no change is needed.
    fn remove_from_node<Q>(
        node: &Node<K, V>,
        key: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<(Node<K, V>, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node {
            Node::Empty => None,
            Node::Entry {
                hash: entry_hash,
                key: entry_key,
                value,
            } => {
                if *entry_hash == hash && entry_key.borrow() == key {
                    Some((Node::Empty, value.clone()))
                } else {
                    None
                }
            }
            Node::Bitmap { bitmap, children } => {
                Self::remove_from_bitmap_node(*bitmap, children, key, hash, depth)
            }
            Node::Collision {
                hash: collision_hash,
                entries,
            } => Self::remove_from_collision_node(*collision_hash, entries, key, hash),
        }
    }

    /// Helper for removing from a Bitmap node.
    fn remove_from_bitmap_node<Q>(
        bitmap: u32,
        children: &ReferenceCounter<[Child<K, V>]>,
        key: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<(Node<K, V>, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = hash_index(hash, depth);
        let bit = 1u32 << index;

        if bitmap & bit == 0 {
            return None;
        }

        let position = (bitmap & (bit - 1)).count_ones() as usize;

        match &children[position] {
            Child::Entry {
                key: child_key,
                value,
            } => {
                if child_key.borrow() == key {
                    let removed_value = value.clone();
                    Some((
                        Self::remove_entry_from_bitmap(bitmap, children, position, bit),
                        removed_value,
                    ))
                } else {
                    None
                }
            }
            Child::Node(subnode) => {
                Self::remove_from_subnode(bitmap, children, position, subnode, key, hash, depth)
            }
        }
    }

    /// Helper for removing an entry from a Bitmap node.
    fn remove_entry_from_bitmap(
        bitmap: u32,
        children: &ReferenceCounter<[Child<K, V>]>,
        position: usize,
        bit: u32,
    ) -> Node<K, V> {
        let new_bitmap = bitmap & !bit;

        if new_bitmap == 0 {
            return Node::Empty;
        }

        let mut new_children = children.to_vec();
        new_children.remove(position);

        Self::simplify_bitmap(new_bitmap, new_children)
    }

    /// Helper for removing from a subnode within a Bitmap node.
    fn remove_from_subnode<Q>(
        bitmap: u32,
        children: &ReferenceCounter<[Child<K, V>]>,
        position: usize,
        subnode: &ReferenceCounter<Node<K, V>>,
        key: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<(Node<K, V>, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (new_subnode, removed_value) = Self::remove_from_node(subnode, key, hash, depth + 1)?;

        let mut new_children = children.to_vec();

        let node = match new_subnode {
            Node::Empty => {
                let new_bitmap = bitmap & !(1u32 << hash_index(hash, depth));
                if new_bitmap == 0 {
                    Node::Empty
                } else {
                    new_children.remove(position);
                    Self::simplify_bitmap(new_bitmap, new_children)
                }
            }
            Node::Entry { hash, key, value } => {
                if new_children.len() == 1 {
                    // The subnode collapsed to a single entry and it is the
                    // only child: lift it into this level.
                    Node::Entry { hash, key, value }
                } else {
                    new_children[position] = Child::Entry { key, value };
                    Node::Bitmap {
                        bitmap,
                        children: ReferenceCounter::from(new_children),
                    }
                }
            }
            other => {
                new_children[position] = Child::Node(ReferenceCounter::new(other));
                Node::Bitmap {
                    bitmap,
                    children: ReferenceCounter::from(new_children),
                }
            }
        };

        Some((node, removed_value))
    }

    /// Simplifies a Bitmap node to an Entry if it has only one child entry.
    fn simplify_bitmap(bitmap: u32, children: Vec<Child<K, V>>) -> Node<K, V> {
        if children.len() == 1
            && let Child::Entry { key, value } = &children[0]
        {
            Node::Entry {
                hash: compute_hash(key),
                key: key.clone(),
                value: value.clone(),
            }
        } else {
            Node::Bitmap {
                bitmap,
                children: ReferenceCounter::from(children),
            }
        }
    }

    /// Helper for removing from a Collision node.
    fn remove_from_collision_node<Q>(
        collision_hash: u64,
        entries: &ReferenceCounter<[(K, V)]>,
        key: &Q,
        hash: u64,
    ) -> Option<(Node<K, V>, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if hash != collision_hash {
            return None;
        }

        let mut new_entries = entries.to_vec();
        let found_index = new_entries
            .iter()
            .position(|(entry_key, _)| entry_key.borrow() == key)?;

        let (_, removed_value) = new_entries.remove(found_index);

        let node = if new_entries.is_empty() {
            Node::Empty
        } else if new_entries.len() == 1 {
            let (remaining_key, remaining_value) = new_entries.remove(0);
            Node::Entry {
                hash: collision_hash,
                key: remaining_key,
                value: remaining_value,
            }
        } else {
            Node::Collision {
                hash: collision_hash,
                entries: ReferenceCounter::from(new_entries),
            }
        };

        Some((node, removed_value))
    }

    /// Updates the value for a key using a function.
    ///
    /// Returns `None` if the key doesn't exist.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map = PersistentKeyedMap::new().insert("count".to_string(), 10);
    /// let updated = map.update("count", |value| value + 1);
    ///
    /// assert_eq!(updated.unwrap().get("count"), Some(&11));
    /// ```
    #[must_use]
    pub fn update<Q, F>(&self, key: &Q, function: F) -> Option<Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> V,
    {
        let value = self.get(key)?;
        let new_value = function(value);

        let hash = compute_hash(key);
        let actual_key = Self::find_key(&self.root, key, hash, 0)?;

        Some(self.insert(actual_key, new_value))
    }

    /// Finds and clones the key matching the given query key.
    fn find_key<Q>(node: &Node<K, V>, key: &Q, hash: u64, depth: usize) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node {
            Node::Empty => None,
            Node::Entry {
                hash: entry_hash,
                key: entry_key,
                ..
            } => {
                if *entry_hash == hash && entry_key.borrow() == key {
                    Some(entry_key.clone())
                } else {
                    None
                }
            }
            Node::Bitmap { bitmap, children } => {
                let index = hash_index(hash, depth);
                let bit = 1u32 << index;

                if bitmap & bit == 0 {
                    None
                } else {
                    let position = (bitmap & (bit - 1)).count_ones() as usize;
                    match &children[position] {
                        Child::Entry { key: child_key, .. } => {
                            if child_key.borrow() == key {
                                Some(child_key.clone())
                            } else {
                                None
                            }
                        }
                        Child::Node(subnode) => Self::find_key(subnode, key, hash, depth + 1),
                    }
                }
            }
            Node::Collision { entries, .. } => {
                for (entry_key, _) in entries.iter() {
                    if entry_key.borrow() == key {
                        return Some(entry_key.clone());
                    }
                }
                None
            }
        }
    }

    /// Updates or removes a value for a key using an updater function.
    ///
    /// The updater receives `Some(&V)` if the key exists, or `None` if it
    /// doesn't. If it returns `Some(V)` the value is inserted or updated;
    /// if it returns `None` the key is removed (if it exists).
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map = PersistentKeyedMap::new().insert("count".to_string(), 10);
    ///
    /// let updated = map.update_with("count", |value| value.map(|v| v + 1));
    /// assert_eq!(updated.get("count"), Some(&11));
    ///
    /// let removed = map.update_with("count", |_| None);
    /// assert_eq!(removed.get("count"), None);
    /// ```
    #[must_use]
    pub fn update_with<Q, F>(&self, key: &Q, updater: F) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let current_value = self.get(key);
        let new_value = updater(current_value);

        match (current_value.is_some(), new_value) {
            (true, Some(value)) => {
                let hash = compute_hash(key);
                let actual_key =
                    Self::find_key(&self.root, key, hash, 0).unwrap_or_else(|| key.to_owned());
                self.insert(actual_key, value)
            }
            (true, None) => self.remove(key),
            (false, Some(value)) => self.insert(key.to_owned(), value),
            (false, None) => self.clone(),
        }
    }

    /// Merges two maps, right-biased: values from `other` overwrite values
    /// of the receiver key by key, with no deep merge.
    ///
    /// # Complexity
    ///
    /// O(m log n) where m is the size of `other`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let left = PersistentKeyedMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let right = PersistentKeyedMap::new()
    ///     .insert("b".to_string(), 20)
    ///     .insert("c".to_string(), 3);
    ///
    /// let merged = left.merge(&right);
    ///
    /// assert_eq!(merged.get("a"), Some(&1));
    /// assert_eq!(merged.get("b"), Some(&20)); // From right
    /// assert_eq!(merged.get("c"), Some(&3));
    /// ```
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, value) in other {
            result = result.insert(key.clone(), value.clone());
        }
        result
    }

    /// Merges two maps with a conflict resolver.
    ///
    /// For keys present on both sides the resolver is invoked as
    /// `resolver(previous, next, key)` and its result replaces the plain
    /// right-biased overwrite; keys present only in `other` are inserted
    /// as-is.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let left = PersistentKeyedMap::new().insert("a".to_string(), 1);
    /// let right = PersistentKeyedMap::new().insert("a".to_string(), 10);
    ///
    /// let merged = left.merge_with(|previous, next, _key| previous + next, &right);
    /// assert_eq!(merged.get("a"), Some(&11));
    /// ```
    #[must_use]
    pub fn merge_with<F>(&self, mut resolver: F, other: &Self) -> Self
    where
        F: FnMut(&V, &V, &K) -> V,
    {
        let mut result = self.clone();
        for (key, next) in other {
            let merged = match self.get(key) {
                Some(previous) => resolver(previous, next, key),
                None => next.clone(),
            };
            result = result.insert(key.clone(), merged);
        }
        result
    }

    /// Returns an iterator over key-value pairs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map = PersistentKeyedMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let total: i32 = map.iter().map(|(_, value)| value).sum();
    /// assert_eq!(total, 3);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentKeyedMapIterator<'_, K, V> {
        let mut entries = Vec::with_capacity(self.length);
        Self::collect_entries(&self.root, &mut entries);
        PersistentKeyedMapIterator {
            entries,
            current_index: 0,
        }
    }

    /// Collects all entries from a node into a vector.
    fn collect_entries<'a>(node: &'a Node<K, V>, entries: &mut Vec<(&'a K, &'a V)>) {
        match node {
            Node::Empty => {}
            Node::Entry { key, value, .. } => {
                entries.push((key, value));
            }
            Node::Bitmap { children, .. } => {
                for child in children.iter() {
                    match child {
                        Child::Entry { key, value } => {
                            entries.push((key, value));
                        }
                        Child::Node(subnode) => {
                            Self::collect_entries(subnode, entries);
                        }
                    }
                }
            }
            Node::Collision {
                entries: collision_entries,
                ..
            } => {
                for (key, value) in collision_entries.iter() {
                    entries.push((key, value));
                }
            }
        }
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash + PartialEq> PersistentKeyedMap<K, V> {
    /// Converts the map into a [`TransientKeyedMap`] draft for batched
    /// edits.
    ///
    /// The original map is unaffected; the draft observes its entries and
    /// overlays edits until sealed with
    /// [`persistent`](TransientKeyedMap::persistent).
    #[must_use]
    pub fn transient(&self) -> TransientKeyedMap<K, V> {
        TransientKeyedMap {
            length: self.length,
            base: self.clone(),
            edits: FxHashMap::default(),
            altered: false,
            _marker: PhantomData,
        }
    }

    /// Opens a transient draft, applies `mutator` to it, and seals the
    /// result back into a persistent map.
    ///
    /// If the mutator makes no effective change the original map is
    /// returned unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    ///
    /// let map: PersistentKeyedMap<String, i32> = PersistentKeyedMap::new();
    /// let built = map.with_mutations(|draft| {
    ///     draft.insert("a".to_string(), 1);
    ///     draft.insert("b".to_string(), 2);
    /// });
    ///
    /// assert!(map.is_empty());
    /// assert_eq!(built.len(), 2);
    /// ```
    #[must_use]
    pub fn with_mutations<F>(&self, mutator: F) -> Self
    where
        F: FnOnce(&mut TransientKeyedMap<K, V>),
    {
        let mut transient = self.transient();
        mutator(&mut transient);
        if transient.was_altered() {
            transient.persistent()
        } else {
            self.clone()
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over key-value pairs of a [`PersistentKeyedMap`].
pub struct PersistentKeyedMapIterator<'a, K, V> {
    entries: Vec<(&'a K, &'a V)>,
    current_index: usize,
}

impl<'a, K, V> Iterator for PersistentKeyedMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.entries.len() {
            None
        } else {
            let entry = self.entries[self.current_index];
            self.current_index += 1;
            Some(entry)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<K, V> ExactSizeIterator for PersistentKeyedMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.current_index)
    }
}

/// An owning iterator over key-value pairs of a [`PersistentKeyedMap`].
pub struct PersistentKeyedMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for PersistentKeyedMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for PersistentKeyedMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for PersistentKeyedMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash> FromIterator<(K, V)> for PersistentKeyedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map = map.insert(key, value);
        }
        map
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash> IntoIterator for PersistentKeyedMap<K, V> {
    type Item = (K, V);
    type IntoIter = PersistentKeyedMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        PersistentKeyedMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentKeyedMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone + Hash,
{
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentKeyedMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash + PartialEq> PartialEq for PersistentKeyedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }
        if self.content_hash != other.content_hash {
            return false;
        }

        for (key, value) in self {
            match other.get(key) {
                Some(other_value) if other_value == value => {}
                _ => return false,
            }
        }

        true
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash + Eq> Eq for PersistentKeyedMap<K, V> {}

/// Writes the cached structural hash; O(1) regardless of map size.
impl<K, V> Hash for PersistentKeyedMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.length);
        state.write_u64(self.content_hash);
    }
}

impl<K: Clone + Hash + Eq + fmt::Debug, V: Clone + Hash + fmt::Debug> fmt::Debug
    for PersistentKeyedMap<K, V>
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for PersistentKeyedMap<K, V>
where
    K: Clone + Hash + Eq + serde::Serialize,
    V: Clone + Hash + serde::Serialize,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.length))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// =============================================================================
// TransientKeyedMap Definition
// =============================================================================

/// A transient (temporarily mutable) keyed map for batched edits.
///
/// `TransientKeyedMap` is the mutation-transaction counterpart of
/// [`PersistentKeyedMap`]: an exclusively-owned draft that overlays edits
/// on a base map without materializing an intermediate persistent map per
/// edit. Sealing with [`persistent`](Self::persistent) folds the overlay
/// into a single new persistent map; the base map and every other referent
/// of its structure are unaffected.
///
/// # Design
///
/// - Edits are recorded in a hash-map overlay; reads consult the overlay
///   first and fall through to the base map
/// - `PhantomData<Rc<()>>` ensures `!Send` and `!Sync` so a draft cannot
///   leak across threads
/// - Clone/Copy are intentionally not implemented (linear type semantics),
///   and sealing consumes the draft, so edits after sealing do not compile
///
/// # Examples
///
/// ```rust
/// use fieldstone::persistent::PersistentKeyedMap;
///
/// let persistent: PersistentKeyedMap<String, i32> =
///     [("a".to_string(), 1)].into_iter().collect();
///
/// let mut transient = persistent.transient();
/// transient.insert("b".to_string(), 2);
/// transient.remove("a");
/// assert!(transient.was_altered());
///
/// let sealed = transient.persistent();
/// assert_eq!(sealed.len(), 1);
/// assert_eq!(persistent.get("a"), Some(&1)); // base unaffected
/// ```
pub struct TransientKeyedMap<K, V> {
    base: PersistentKeyedMap<K, V>,
    edits: FxHashMap<K, Edit<V>>,
    length: usize,
    altered: bool,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

/// A single overlay edit.
enum Edit<V> {
    Insert(V),
    Remove,
}

// Static assertions to verify TransientKeyedMap is not Send/Sync
static_assertions::assert_not_impl_any!(TransientKeyedMap<String, i32>: Send, Sync);

impl<K, V> TransientKeyedMap<K, V> {
    /// Returns the number of entries the sealed map would contain.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the draft contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns `true` once any edit has actually changed an observable
    /// value; inserting a value equal to the current one does not count.
    #[inline]
    #[must_use]
    pub const fn was_altered(&self) -> bool {
        self.altered
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash + PartialEq> TransientKeyedMap<K, V> {
    /// Creates a new empty draft.
    #[must_use]
    pub fn new() -> Self {
        PersistentKeyedMap::new().transient()
    }

    /// Returns a reference to the value corresponding to the key, taking
    /// pending edits into account.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.edits.get(key) {
            Some(Edit::Insert(value)) => Some(value),
            Some(Edit::Remove) => None,
            None => self.base.get(key),
        }
    }

    /// Returns `true` if the draft contains a value for the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair, returning the previously observable value.
    ///
    /// Inserting a value equal to the current one is a no-op that does not
    /// set the altered flag.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.get(&key).cloned();
        if previous.as_ref() == Some(&value) {
            return previous;
        }

        if previous.is_none() {
            self.length += 1;
        }
        self.altered = true;
        self.edits.insert(key, Edit::Insert(value));
        previous
    }

    /// Removes a key, returning the previously observable value.
    ///
    /// Removing an absent key is a no-op.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let previous = self.get(key).cloned()?;

        if self.base.contains_key(key) {
            self.edits.insert(key.to_owned(), Edit::Remove);
        } else {
            // The key only ever existed as an overlay insert.
            self.edits.remove(key);
        }
        self.length -= 1;
        self.altered = true;
        Some(previous)
    }

    /// Applies every pair from the iterator as an insert, in order.
    pub fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }

    /// Seals the draft into a persistent map.
    ///
    /// Consumes the draft; the borrow checker rejects any further use, so
    /// a "mutation after sealing" error cannot occur at runtime.
    #[must_use]
    pub fn persistent(self) -> PersistentKeyedMap<K, V> {
        let mut map = self.base;
        for (key, edit) in self.edits {
            map = match edit {
                Edit::Insert(value) => map.insert(key, value),
                Edit::Remove => map.remove(&key),
            };
        }
        map
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Hash + PartialEq> Default for TransientKeyedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Key type whose hash is constant, forcing collision nodes.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct CollidingKey(u8);

    impl Hash for CollidingKey {
        fn hash<H: Hasher>(&self, state: &mut H) {
            state.write_u64(0xDEAD_BEEF);
        }
    }

    #[rstest]
    fn test_new_creates_empty() {
        let map: PersistentKeyedMap<String, i32> = PersistentKeyedMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[rstest]
    fn test_insert_and_get() {
        let map = PersistentKeyedMap::new()
            .insert("one".to_string(), 1)
            .insert("two".to_string(), 2);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("one"), Some(&1));
        assert_eq!(map.get("two"), Some(&2));
        assert_eq!(map.get("three"), None);
    }

    #[rstest]
    fn test_insert_overwrite_keeps_length() {
        let map1 = PersistentKeyedMap::new().insert("key".to_string(), 1);
        let map2 = map1.insert("key".to_string(), 2);

        assert_eq!(map1.get("key"), Some(&1));
        assert_eq!(map2.get("key"), Some(&2));
        assert_eq!(map2.len(), 1);
    }

    #[rstest]
    fn test_remove_missing_key_is_equal_to_original() {
        let map = PersistentKeyedMap::new().insert("a".to_string(), 1);
        let removed = map.remove("zzz");

        assert_eq!(map, removed);
    }

    #[rstest]
    fn test_collision_nodes_round_trip() {
        let map = PersistentKeyedMap::new()
            .insert(CollidingKey(1), "one")
            .insert(CollidingKey(2), "two")
            .insert(CollidingKey(3), "three");

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&CollidingKey(2)), Some(&"two"));

        let removed = map.remove(&CollidingKey(2));
        assert_eq!(removed.len(), 2);
        assert_eq!(removed.get(&CollidingKey(2)), None);
        assert_eq!(removed.get(&CollidingKey(3)), Some(&"three"));
    }

    #[rstest]
    fn test_collision_overwrite_reports_previous() {
        let map = PersistentKeyedMap::new()
            .insert(CollidingKey(1), 10)
            .insert(CollidingKey(2), 20);
        let replaced = map.insert(CollidingKey(2), 21);

        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced.get(&CollidingKey(2)), Some(&21));
    }

    #[rstest]
    fn test_content_hash_is_insertion_order_independent() {
        let forwards: PersistentKeyedMap<String, i32> = (0..64)
            .map(|index| (format!("key-{index}"), index))
            .collect();
        let backwards: PersistentKeyedMap<String, i32> = (0..64)
            .rev()
            .map(|index| (format!("key-{index}"), index))
            .collect();

        assert_eq!(forwards.content_hash(), backwards.content_hash());
        assert_eq!(forwards, backwards);
    }

    #[rstest]
    fn test_content_hash_restored_after_remove() {
        let base: PersistentKeyedMap<String, i32> =
            [("a".to_string(), 1), ("b".to_string(), 2)].into_iter().collect();
        let churned = base.insert("c".to_string(), 3).remove("c");

        assert_eq!(base.content_hash(), churned.content_hash());
        assert_eq!(base, churned);
    }

    #[rstest]
    fn test_merge_with_resolver() {
        let left = PersistentKeyedMap::new()
            .insert("a".to_string(), 1)
            .insert("b".to_string(), 2);
        let right = PersistentKeyedMap::new()
            .insert("b".to_string(), 20)
            .insert("c".to_string(), 3);

        let merged = left.merge_with(|previous, next, _key| previous + next, &right);

        assert_eq!(merged.get("a"), Some(&1));
        assert_eq!(merged.get("b"), Some(&22));
        assert_eq!(merged.get("c"), Some(&3));
    }

    #[rstest]
    fn test_transient_tracks_length_and_alteration() {
        let base: PersistentKeyedMap<String, i32> =
            [("a".to_string(), 1)].into_iter().collect();
        let mut transient = base.transient();

        assert!(!transient.was_altered());
        assert_eq!(transient.insert("a".to_string(), 1), Some(1));
        assert!(!transient.was_altered()); // equal insert is a no-op

        assert_eq!(transient.insert("b".to_string(), 2), None);
        assert_eq!(transient.len(), 2);
        assert!(transient.was_altered());

        assert_eq!(transient.remove("a"), Some(1));
        assert_eq!(transient.len(), 1);

        let sealed = transient.persistent();
        assert_eq!(sealed.get("a"), None);
        assert_eq!(sealed.get("b"), Some(&2));
        assert_eq!(base.get("a"), Some(&1));
    }

    #[rstest]
    fn test_transient_remove_of_overlay_insert() {
        let mut transient: TransientKeyedMap<String, i32> = TransientKeyedMap::new();
        transient.insert("x".to_string(), 1);
        assert_eq!(transient.remove("x"), Some(1));

        let sealed = transient.persistent();
        assert!(sealed.is_empty());
    }
}
