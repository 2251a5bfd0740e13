//! Mutation transactions over records.

use std::marker::PhantomData;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::persistent::{PersistentKeyedMap, ReferenceCounter, compute_hash, entry_hash};
use crate::value::Value;

use super::{Record, Schema};

/// A transient (temporarily mutable) draft over a [`Record`].
///
/// A `TransientRecord` is the record-level mutation transaction: created
/// from an immutable record, exclusively owned, edited in place, and
/// sealed back into a new immutable record with
/// [`persistent`](Self::persistent). Edits are applied in call order,
/// later edits to the same field overwriting earlier ones, and no
/// intermediate record is materialized per edit. The base record and
/// every other referent of its structure are unaffected throughout.
///
/// [`was_altered`](Self::was_altered) flips to `true` on the first edit
/// that actually changes an effective field value; edits that re-assign
/// the current value do not count.
///
/// # Sealing
///
/// Sealing consumes the draft, so "mutation after sealing" is a compile
/// error rather than a runtime one. Drafts are `!Send`/`!Sync` and
/// deliberately not `Clone`: exactly one execution context owns a draft
/// for its whole lifetime.
///
/// # Examples
///
/// ```rust
/// use fieldstone::record::RecordFactory;
/// use fieldstone::value::Value;
///
/// let factory = RecordFactory::named("Foo", [("x", 1), ("y", 2)]);
/// let record = factory.create();
///
/// let mut draft = record.transient();
/// draft.set("x", 10).unwrap();
/// draft.set("x", 100).unwrap(); // later edit wins
/// let sealed = draft.persistent();
///
/// assert_eq!(sealed.get("x"), Some(&Value::from(100)));
/// assert_eq!(record.get("x"), Some(&Value::from(1)));
/// ```
#[derive(Debug)]
pub struct TransientRecord {
    schema: ReferenceCounter<Schema>,
    /// The base record's sparse overrides, untouched until sealing.
    base_overrides: PersistentKeyedMap<String, Value>,
    /// Pending effective values, folded into the overrides on seal.
    edits: FxHashMap<String, Value>,
    content_hash: u64,
    altered: bool,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

// Static assertions to verify TransientRecord is not Send/Sync
static_assertions::assert_not_impl_any!(TransientRecord: Send, Sync);

impl TransientRecord {
    pub(crate) fn from_record(record: &Record) -> Self {
        Self {
            schema: record.schema.clone(),
            base_overrides: record.overrides.clone(),
            edits: FxHashMap::default(),
            content_hash: record.content_hash,
            altered: false,
            _marker: PhantomData,
        }
    }

    /// Returns the number of fields; a constant of the schema.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    /// Returns `true` for a draft over an empty schema.
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

    /// Returns `true` if `field` is part of the schema.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.schema.contains_field(field)
    }

    /// Returns `true` once any edit has actually changed an effective
    /// field value.
    #[inline]
    #[must_use]
    pub const fn was_altered(&self) -> bool {
        self.altered
    }

    /// Returns the effective value of a field, taking pending edits into
    /// account; `None` only for a field name outside the schema.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.edits.get(field) {
            return Some(value);
        }
        if let Some(value) = self.base_overrides.get(field) {
            return Some(value);
        }
        self.schema.default_of(field)
    }

    /// Assigns `value` to `field` in place.
    ///
    /// Assigning the current value is a no-op that does not set the
    /// altered flag. Returns the draft for chaining.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for a field name outside the schema.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        if !self.schema.contains_field(field) {
            return Err(Error::UnknownField {
                field: field.to_owned(),
                type_name: self.schema.display_name().to_owned(),
            });
        }

        let field_hash = compute_hash(field);
        let (unchanged, old_entry_hash) = {
            // contains_field above guarantees an effective value
            let Some(current) = self.get(field) else {
                return Ok(self);
            };
            (
                *current == value,
                entry_hash(field_hash, compute_hash(current)),
            )
        };
        if unchanged {
            return Ok(self);
        }

        self.content_hash = self
            .content_hash
            .wrapping_add(entry_hash(field_hash, compute_hash(&value)))
            .wrapping_sub(old_entry_hash);
        self.edits.insert(field.to_owned(), value);
        self.altered = true;
        Ok(self)
    }

    /// Resets `field` to its schema default in place.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for a field name outside the schema.
    pub fn delete(&mut self, field: &str) -> Result<&mut Self> {
        let default = self
            .schema
            .default_of(field)
            .cloned()
            .ok_or_else(|| Error::UnknownField {
                field: field.to_owned(),
                type_name: self.schema.display_name().to_owned(),
            })?;
        self.set(field, default)
    }

    /// Alias for [`delete`](Self::delete).
    ///
    /// # Errors
    ///
    /// As [`delete`](Self::delete).
    pub fn remove(&mut self, field: &str) -> Result<&mut Self> {
        self.delete(field)
    }

    /// Applies `updater` to the effective value of `field` in place.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for a field name outside the schema.
    pub fn update_field<F>(&mut self, field: &str, updater: F) -> Result<&mut Self>
    where
        F: FnOnce(&Value) -> Value,
    {
        let current = self.get(field).cloned().ok_or_else(|| Error::UnknownField {
            field: field.to_owned(),
            type_name: self.schema.display_name().to_owned(),
        })?;
        let new_value = updater(&current);
        self.set(field, new_value)
    }

    /// Resets every field to its schema default in place.
    pub fn clear(&mut self) {
        let schema = self.schema.clone();
        for (field, default) in schema.defaults() {
            // known field, set cannot fail
            if self.set(field, default.clone()).is_err() {
                break;
            }
        }
    }

    /// Seals the draft into an immutable [`Record`], folding all pending
    /// edits into the sparse overrides in one pass.
    ///
    /// Consumes the draft; the borrow checker rejects any further use, so
    /// a "mutation after sealing" error cannot occur at runtime.
    #[must_use]
    pub fn persistent(self) -> Record {
        let mut overrides = self.base_overrides;
        for (field, value) in self.edits {
            let is_default = self.schema.default_of(&field) == Some(&value);
            overrides = if is_default {
                overrides.remove(&field)
            } else {
                overrides.insert(field, value)
            };
        }
        Record::from_parts(self.schema, overrides, self.content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordFactory;
    use rstest::rstest;

    #[rstest]
    fn equal_assignment_does_not_alter() {
        let record = RecordFactory::new([("x", 1)]).create();
        let mut draft = record.transient();

        draft.set("x", 1).unwrap();
        assert!(!draft.was_altered());

        draft.set("x", 2).unwrap();
        assert!(draft.was_altered());
    }

    #[rstest]
    fn sealing_restores_sparse_invariant() {
        let factory = RecordFactory::new([("x", 1), ("y", 2)]);
        let record = factory.build([("x", 10)]);

        let mut draft = record.transient();
        draft.set("x", 1).unwrap(); // back to the default
        let sealed = draft.persistent();

        assert_eq!(sealed, factory.create());
        assert_eq!(sealed.get("x"), Some(&Value::from(1)));
    }

    #[rstest]
    fn unknown_field_fails_fast() {
        let record = RecordFactory::named("Foo", [("x", 1)]).create();
        let mut draft = record.transient();

        let error = draft.set("nope", 1).unwrap_err();
        assert_eq!(
            error,
            Error::UnknownField {
                field: "nope".to_string(),
                type_name: "Foo".to_string(),
            }
        );
    }

    #[rstest]
    fn clear_resets_every_field() {
        let factory = RecordFactory::new([("x", 1), ("y", 2)]);
        let record = factory.build([("x", 10), ("y", 20)]);

        let mut draft = record.transient();
        draft.clear();
        assert!(draft.was_altered());
        assert_eq!(draft.persistent(), factory.create());
    }
}
