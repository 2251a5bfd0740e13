//! Schema-typed persistent records.
//!
//! A [`Record`] is a fixed-field, schema-bound immutable snapshot: every
//! instance of a record type has exactly the fields its [`Schema`]
//! declares, and any field that has not been overridden reads as its
//! schema default. Records are built by a [`RecordFactory`] and derive new
//! versions through the same persistent-update style as
//! [`PersistentKeyedMap`]: every mutator returns a new record and never
//! touches the receiver.
//!
//! Deleting a field never shrinks a record: it resets the field to its
//! schema default. `len` is therefore a constant of the schema, no matter
//! how many fields were overridden.
//!
//! # Unknown fields
//!
//! The `set` family fails fast with
//! [`Error::UnknownField`](crate::error::Error::UnknownField) on a field
//! name outside the schema, `get` returns `None`, and the merge family
//! silently skips unknown source fields. Each method documents which
//! policy it follows.
//!
//! # Examples
//!
//! ```rust
//! use fieldstone::record::RecordFactory;
//! use fieldstone::value::Value;
//!
//! let factory = RecordFactory::named("Foo", [
//!     ("x", Value::from(1)),
//!     ("y", Value::from(true)),
//! ]);
//!
//! let foo = factory.create();
//! assert_eq!(foo.get("x"), Some(&Value::from(1)));
//!
//! let updated = foo.set("y", false).unwrap();
//! assert_eq!(foo.get("y"), Some(&Value::from(true)));      // original unchanged
//! assert_eq!(updated.get("y"), Some(&Value::from(false))); // new version
//! assert_eq!(updated.to_string(), "Foo { \"x\": 1, \"y\": false }");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::persistent::{PersistentKeyedMap, ReferenceCounter, compute_hash, entry_hash};
use crate::value::{Value, merge_deep_value};

mod schema;
mod transient;

pub use schema::RecordFactory;
pub use schema::Schema;
pub use transient::TransientRecord;

// =============================================================================
// Record Definition
// =============================================================================

/// A schema-bound immutable record with per-field default values.
///
/// A record stores only the fields whose value differs from the schema
/// default (the sparse representation); reads fall through to the shared
/// schema. Cloning is cheap: a schema handle, a map root pointer, and a
/// cached hash.
///
/// Two records are equal iff they have the same field set and every
/// effective field value compares structurally equal; they do not need to
/// share a schema instance. The cached content hash makes `Hash` O(1) and
/// provides an inequality fast path for `==`.
#[derive(Clone)]
pub struct Record {
    /// The owning schema, shared by every instance of the record type.
    schema: ReferenceCounter<Schema>,
    /// Fields whose value differs from the schema default.
    ///
    /// Invariant: never holds a non-schema key, and never holds a value
    /// structurally equal to the field's default.
    overrides: PersistentKeyedMap<String, Value>,
    /// Order-independent structural hash over all effective field values.
    content_hash: u64,
}

impl Record {
    /// A record holding exactly the schema defaults.
    pub(crate) fn from_schema(schema: ReferenceCounter<Schema>) -> Self {
        let content_hash = schema.defaults_hash();
        Self {
            schema,
            overrides: PersistentKeyedMap::new(),
            content_hash,
        }
    }

    pub(crate) const fn from_parts(
        schema: ReferenceCounter<Schema>,
        overrides: PersistentKeyedMap<String, Value>,
        content_hash: u64,
    ) -> Self {
        Self {
            schema,
            overrides,
            content_hash,
        }
    }

    /// Returns the number of fields; a constant of the schema, independent
    /// of how many fields were overridden.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    /// Returns `true` for a record over an empty schema.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    /// The diagnostic type name, `"Record"` for anonymous schemas.
    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.display_name()
    }

    /// The owning schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns `true` if `field` is part of the schema.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.schema.contains_field(field)
    }

    /// Returns the effective value of a field: the override if present,
    /// else the schema default.
    ///
    /// `None` only for a field name outside the schema, the dynamic
    /// escape hatch; typed callers are expected to pass known names.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::record::RecordFactory;
    /// use fieldstone::value::Value;
    ///
    /// let factory = RecordFactory::new([("x", 1)]);
    /// let record = factory.create();
    ///
    /// assert_eq!(record.get("x"), Some(&Value::from(1)));
    /// assert_eq!(record.get("nope"), None);
    /// ```
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.overrides.get(field) {
            return Some(value);
        }
        self.schema.default_of(field)
    }

    /// Shared write path; `field` must be a schema field and `default` its
    /// schema default. Maintains the sparse-override and content-hash
    /// invariants, and returns a structure-sharing clone when the value is
    /// unchanged.
    fn set_resolved(&self, field: &str, default: &Value, value: Value) -> Self {
        let current = self.overrides.get(field).unwrap_or(default);
        if *current == value {
            return self.clone();
        }

        let field_hash = compute_hash(field);
        let delta = entry_hash(field_hash, compute_hash(&value))
            .wrapping_sub(entry_hash(field_hash, compute_hash(current)));

        let overrides = if value == *default {
            self.overrides.remove(field)
        } else {
            self.overrides.insert(field.to_owned(), value)
        };

        Self {
            schema: self.schema.clone(),
            overrides,
            content_hash: self.content_hash.wrapping_add(delta),
        }
    }

    fn unknown_field(&self, field: &str) -> Error {
        Error::UnknownField {
            field: field.to_owned(),
            type_name: self.name().to_owned(),
        }
    }

    /// Returns a new record with `field` replaced by `value`.
    ///
    /// Setting a field to its current value returns a clone sharing all
    /// structure with the receiver.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for a field name outside the schema.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<Self> {
        let default = self
            .schema
            .default_of(field)
            .ok_or_else(|| self.unknown_field(field))?;
        Ok(self.set_resolved(field, default, value.into()))
    }

    /// Resets `field` to its schema default.
    ///
    /// A record never truly loses a field; deleting means "revert to
    /// default". Returns a structure-sharing clone if the field already
    /// holds its default.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for a field name outside the schema.
    pub fn delete(&self, field: &str) -> Result<Self> {
        let default = self
            .schema
            .default_of(field)
            .ok_or_else(|| self.unknown_field(field))?;
        Ok(self.set_resolved(field, default, default.clone()))
    }

    /// Alias for [`delete`](Self::delete).
    ///
    /// # Errors
    ///
    /// As [`delete`](Self::delete).
    pub fn remove(&self, field: &str) -> Result<Self> {
        self.delete(field)
    }

    /// Returns a record with every field reset to its schema default.
    #[must_use]
    pub fn clear(&self) -> Self {
        Self::from_schema(self.schema.clone())
    }

    /// Applies `updater` to the whole record, returning its result.
    #[must_use]
    pub fn update<F>(&self, updater: F) -> Self
    where
        F: FnOnce(&Self) -> Self,
    {
        updater(self)
    }

    /// Applies `updater` to the effective value of `field`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for a field name outside the schema.
    pub fn update_field<F>(&self, field: &str, updater: F) -> Result<Self>
    where
        F: FnOnce(&Value) -> Value,
    {
        let default = self
            .schema
            .default_of(field)
            .ok_or_else(|| self.unknown_field(field))?;
        let current = self.overrides.get(field).unwrap_or(default);
        let new_value = updater(current);
        Ok(self.set_resolved(field, default, new_value))
    }

    // =========================================================================
    // Merge family
    // =========================================================================

    /// Field-wise right-biased merge: each known source field overwrites
    /// the receiver's value, later entries overwriting earlier ones.
    /// Unknown source fields are silently ignored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::record::RecordFactory;
    /// use fieldstone::value::Value;
    ///
    /// let factory = RecordFactory::new([("x", 1), ("y", 2)]);
    /// let merged = factory.create().merge([("y", 20), ("z", 99)]);
    ///
    /// assert_eq!(merged.get("x"), Some(&Value::from(1)));
    /// assert_eq!(merged.get("y"), Some(&Value::from(20)));
    /// assert_eq!(merged.get("z"), None); // unknown field ignored
    /// ```
    #[must_use]
    pub fn merge<N, T, I>(&self, values: I) -> Self
    where
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        let mut result = self.clone();
        for (name, value) in values {
            let name = name.into();
            if let Some(default) = self.schema.default_of(&name) {
                result = result.set_resolved(&name, default, value.into());
            }
        }
        result
    }

    /// Field-wise merge with a conflict resolver.
    ///
    /// Every known source field conflicts by definition (a record field
    /// always has a value), so the resolver is invoked as
    /// `resolver(previous, next, field)` for each of them; unknown source
    /// fields are silently ignored.
    #[must_use]
    pub fn merge_with<F, N, T, I>(&self, mut resolver: F, values: I) -> Self
    where
        F: FnMut(&Value, &Value, &str) -> Value,
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        let mut result = self.clone();
        for (name, value) in values {
            let name = name.into();
            if let Some(default) = self.schema.default_of(&name) {
                let incoming = value.into();
                let resolved = resolver(result.get(&name).unwrap_or(default), &incoming, &name);
                result = result.set_resolved(&name, default, resolved);
            }
        }
        result
    }

    /// Field-wise deep merge: when both the current and the incoming value
    /// are the same kind of keyed container, their contents merge
    /// recursively; any other pairing overwrites. Unknown source fields
    /// are silently ignored.
    #[must_use]
    pub fn merge_deep<N, T, I>(&self, values: I) -> Self
    where
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        self.merge_deep_entries(values, &mut |_previous: &Value, next: &Value, _key: &Value| {
            next.clone()
        })
    }

    /// Deep merge with a conflict resolver, invoked as
    /// `resolver(previous, next, key)` at every non-recursing position.
    /// At the top level the key is the field name as a string value.
    #[must_use]
    pub fn merge_deep_with<F, N, T, I>(&self, mut resolver: F, values: I) -> Self
    where
        F: FnMut(&Value, &Value, &Value) -> Value,
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        self.merge_deep_entries(values, &mut resolver)
    }

    fn merge_deep_entries<F, N, T, I>(&self, values: I, resolver: &mut F) -> Self
    where
        F: FnMut(&Value, &Value, &Value) -> Value,
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        let mut result = self.clone();
        for (name, value) in values {
            let name = name.into();
            if let Some(default) = self.schema.default_of(&name) {
                let incoming = value.into();
                let key = Value::from(name.as_str());
                let merged = merge_deep_value(
                    result.get(&name).unwrap_or(default),
                    &incoming,
                    &key,
                    resolver,
                );
                result = result.set_resolved(&name, default, merged);
            }
        }
        result
    }

    /// Deep merge with another record as the source, restricted to the
    /// receiver's schema. Used when deep merges recurse through nested
    /// record values.
    pub(crate) fn merge_deep_record<F>(&self, other: &Self, resolver: &mut F) -> Self
    where
        F: FnMut(&Value, &Value, &Value) -> Value,
    {
        let mut result = self.clone();
        for (field, incoming) in other.iter() {
            if let Some(default) = self.schema.default_of(field) {
                let key = Value::from(field);
                let merged =
                    merge_deep_value(result.get(field).unwrap_or(default), incoming, &key, resolver);
                result = result.set_resolved(field, default, merged);
            }
        }
        result
    }

    // =========================================================================
    // Key paths
    // =========================================================================

    /// Walks a key path starting at a field of this record; see
    /// [`path::get_in`](crate::path::get_in).
    ///
    /// An empty path yields `None`; a record is not a `Value`.
    #[must_use]
    pub fn get_in(&self, path: &[Value]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        crate::path::get_in(self.get(first.as_str()?)?, rest)
    }

    /// Sets the value at a key path starting at a field of this record,
    /// creating empty maps for missing intermediates.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyPath`] for an empty path (a record cannot be replaced
    /// by an arbitrary value), [`Error::UnknownField`] when the first key
    /// does not name a schema field, and
    /// [`Error::PathConflict`] when the path traverses a non-container.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::record::RecordFactory;
    /// use fieldstone::value::Value;
    /// use fieldstone::path;
    ///
    /// let foo = RecordFactory::named("Foo", [("x", 1)]).create();
    /// let bar = RecordFactory::named("Bar", [("c", Value::from(foo))]).create();
    ///
    /// let updated = bar.set_in(&path!["c", "x"], 0).unwrap();
    /// assert_eq!(updated.get_in(&path!["c", "x"]), Some(&Value::from(0)));
    /// assert_eq!(bar.get_in(&path!["c", "x"]), Some(&Value::from(1)));
    /// ```
    pub fn set_in(&self, path: &[Value], value: impl Into<Value>) -> Result<Self> {
        let (first, rest) = path.split_first().ok_or(Error::EmptyPath)?;
        let field = first
            .as_str()
            .ok_or_else(|| self.unknown_field(&first.to_string()))?;
        let default = self
            .schema
            .default_of(field)
            .ok_or_else(|| self.unknown_field(field))?;
        let current = self.overrides.get(field).unwrap_or(default);
        let new_child = crate::path::set_in_at(current, rest, value.into(), 1)?;
        Ok(self.set_resolved(field, default, new_child))
    }

    /// Updates the value at a key path with `updater`, which receives
    /// `Some` of the current value or `None` when any step is absent.
    ///
    /// # Errors
    ///
    /// As [`set_in`](Self::set_in).
    pub fn update_in<F>(&self, path: &[Value], updater: F) -> Result<Self>
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        if path.is_empty() {
            return Err(Error::EmptyPath);
        }
        let current = self.get_in(path).cloned();
        self.set_in(path, updater(current))
    }

    /// Deletes the value at a key path: the terminal key is removed from a
    /// map, or reset to its default on a record. Absent intermediates, an
    /// unknown first field, and the empty path are no-ops returning an
    /// equal record.
    ///
    /// # Errors
    ///
    /// [`Error::PathConflict`] when the path traverses a non-container.
    pub fn delete_in(&self, path: &[Value]) -> Result<Self> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(self.clone());
        };
        let Some(field) = first.as_str() else {
            return Ok(self.clone());
        };
        let Some(default) = self.schema.default_of(field) else {
            return Ok(self.clone());
        };
        if rest.is_empty() {
            return self.delete(field);
        }
        let current = self.overrides.get(field).unwrap_or(default);
        let new_child = crate::path::delete_in_at(current, rest, 1)?;
        Ok(self.set_resolved(field, default, new_child))
    }

    /// Alias for [`delete_in`](Self::delete_in).
    ///
    /// # Errors
    ///
    /// As [`delete_in`](Self::delete_in).
    pub fn remove_in(&self, path: &[Value]) -> Result<Self> {
        self.delete_in(path)
    }

    // =========================================================================
    // Mutation transactions
    // =========================================================================

    /// Opens a [`TransientRecord`] draft over this record.
    ///
    /// The receiver is unaffected; the draft batches edits and seals into
    /// a new record with [`persistent`](TransientRecord::persistent).
    #[must_use]
    pub fn transient(&self) -> TransientRecord {
        TransientRecord::from_record(self)
    }

    /// Opens a draft, applies `mutator`, and seals the result.
    ///
    /// All edits become visible together on the returned record and are
    /// invisible on the receiver. If the mutator makes no effective change
    /// the original record is returned unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::record::RecordFactory;
    /// use fieldstone::value::Value;
    ///
    /// let factory = RecordFactory::new([("x", 1), ("y", 2)]);
    /// let record = factory.create();
    ///
    /// let updated = record.with_mutations(|draft| {
    ///     draft.set("x", 10).unwrap();
    ///     draft.set("y", 20).unwrap();
    ///     assert!(draft.was_altered());
    /// });
    ///
    /// assert_eq!(record.get("x"), Some(&Value::from(1)));
    /// assert_eq!(updated.get("x"), Some(&Value::from(10)));
    /// assert_eq!(updated.get("y"), Some(&Value::from(20)));
    /// ```
    #[must_use]
    pub fn with_mutations<F>(&self, mutator: F) -> Self
    where
        F: FnOnce(&mut TransientRecord),
    {
        let mut draft = self.transient();
        mutator(&mut draft);
        if draft.was_altered() {
            draft.persistent()
        } else {
            self.clone()
        }
    }

    /// Fallible variant of [`with_mutations`](Self::with_mutations) for
    /// mutators that want to propagate field errors with `?`.
    ///
    /// # Errors
    ///
    /// Whatever the mutator returns.
    pub fn try_with_mutations<F>(&self, mutator: F) -> Result<Self>
    where
        F: FnOnce(&mut TransientRecord) -> Result<()>,
    {
        let mut draft = self.transient();
        mutator(&mut draft)?;
        Ok(if draft.was_altered() {
            draft.persistent()
        } else {
            self.clone()
        })
    }

    // =========================================================================
    // Iteration and snapshots
    // =========================================================================

    /// Iterates `(field, effective value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .defaults()
            .map(|(field, default)| (field, self.overrides.get(field).unwrap_or(default)))
    }

    /// Shallow snapshot: field names to effective values, in schema order.
    #[must_use]
    pub fn to_object(&self) -> IndexMap<String, Value> {
        self.iter()
            .map(|(field, value)| (field.to_owned(), value.clone()))
            .collect()
    }

    /// Converts into a generic keyed map with the field names as string
    /// keys. Nested values are shared, not copied.
    #[must_use]
    pub fn to_keyed_map(&self) -> PersistentKeyedMap<Value, Value> {
        self.iter()
            .map(|(field, value)| (Value::from(field), value.clone()))
            .collect()
    }

    /// Deep plain snapshot as JSON, fields in schema order; see
    /// [`Value::to_json`] for the conversion rules.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::with_capacity(self.len());
        for (field, value) in self.iter() {
            object.insert(field.to_owned(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        if self.content_hash != other.content_hash {
            return false;
        }
        if ReferenceCounter::ptr_eq(&self.schema, &other.schema) {
            // Shared schema and the sparse-override invariant reduce
            // field-wise comparison to comparing the overrides.
            return self.overrides == other.overrides;
        }
        self.iter()
            .all(|(field, value)| other.get(field) == Some(value))
    }
}

impl Eq for Record {}

/// Writes the cached content hash; O(1) regardless of field count or
/// nesting depth.
impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        state.write_u64(self.content_hash);
    }
}

/// Renders as `Name { "field": value, ... }` in schema order with
/// double-quoted field names and JSON-ish values; `Name {}` for an empty
/// schema.
impl fmt::Display for Record {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())?;
        if self.is_empty() {
            return formatter.write_str(" {}");
        }

        formatter.write_str(" { ")?;
        for (index, (field, value)) in self.iter().enumerate() {
            if index > 0 {
                formatter.write_str(", ")?;
            }
            write!(formatter, "{}: {value}", serde_json::Value::from(field))?;
        }
        formatter.write_str(" }")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, formatter)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut state = serializer.serialize_map(Some(self.len()))?;
        for (field, value) in self.iter() {
            state.serialize_entry(field, value)?;
        }
        state.end()
    }
}
