//! Schemas and the record factory.

use indexmap::IndexMap;

use crate::persistent::{ReferenceCounter, compute_hash, entry_hash};
use crate::value::Value;

use super::Record;

// =============================================================================
// Schema
// =============================================================================

/// The field universe of a record type: an ordered field-name to
/// default-value mapping plus an optional diagnostic type name.
///
/// A schema is created once per record type, shared by every instance
/// through a reference-counted handle, and never mutated afterwards. Its
/// field order defines record iteration and display order; its field
/// count defines record `len`.
#[derive(Debug)]
pub struct Schema {
    /// Diagnostic type name surfaced by `Display` and error messages.
    name: Option<String>,
    /// Ordered field-name to default-value mapping.
    defaults: IndexMap<String, Value>,
    /// Content hash of a record holding exactly the defaults.
    defaults_hash: u64,
}

impl Schema {
    pub(crate) fn new(name: Option<String>, defaults: IndexMap<String, Value>) -> Self {
        let defaults_hash = defaults.iter().fold(0u64, |accumulator, (field, value)| {
            accumulator.wrapping_add(entry_hash(compute_hash(field.as_str()), compute_hash(value)))
        });
        Self {
            name,
            defaults,
            defaults_hash,
        }
    }

    /// Returns the number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// Returns `true` if the schema declares no fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// The diagnostic type name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The name used in rendering and error messages; `"Record"` for
    /// anonymous schemas.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Record")
    }

    /// Returns `true` if `field` is declared by this schema.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.defaults.contains_key(field)
    }

    /// Returns the default value of `field`, if declared.
    #[must_use]
    pub fn default_of(&self, field: &str) -> Option<&Value> {
        self.defaults.get(field)
    }

    /// Iterates field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Iterates `(field, default)` pairs in declaration order.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.defaults.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// Content hash of an all-defaults record; the starting point for the
    /// incremental record hash.
    pub(crate) const fn defaults_hash(&self) -> u64 {
        self.defaults_hash
    }
}

// =============================================================================
// RecordFactory
// =============================================================================

/// Builds [`Record`] instances of one schema.
///
/// A factory captures an ordered field-name to default-value mapping once;
/// it holds no other state, and cloning it shares the schema.
///
/// # Examples
///
/// ```rust
/// use fieldstone::record::RecordFactory;
/// use fieldstone::value::Value;
///
/// let factory = RecordFactory::named("Foo", [
///     ("x", Value::from(1)),
///     ("y", Value::from(true)),
/// ]);
///
/// // No overrides: exactly the defaults.
/// let foo = factory.create();
/// assert_eq!(foo.get("x"), Some(&Value::from(1)));
///
/// // Partial overrides; unknown names are ignored.
/// let other = factory.build([("y", Value::from(false)), ("z", Value::from(9))]);
/// assert_eq!(other.get("x"), Some(&Value::from(1)));
/// assert_eq!(other.get("y"), Some(&Value::from(false)));
/// assert_eq!(other.get("z"), None);
/// ```
#[derive(Debug, Clone)]
pub struct RecordFactory {
    schema: ReferenceCounter<Schema>,
}

impl RecordFactory {
    /// Creates a factory for an anonymous record type from an ordered
    /// field-name to default-value mapping.
    ///
    /// Later duplicates of a field name overwrite the default but keep the
    /// first occurrence's position.
    #[must_use]
    pub fn new<N, T, I>(defaults: I) -> Self
    where
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        Self::from_parts(None, defaults)
    }

    /// Creates a factory with a diagnostic type name, surfaced by record
    /// `Display` and error messages.
    #[must_use]
    pub fn named<N, T, I>(name: impl Into<String>, defaults: I) -> Self
    where
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        Self::from_parts(Some(name.into()), defaults)
    }

    fn from_parts<N, T, I>(name: Option<String>, defaults: I) -> Self
    where
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        let defaults: IndexMap<String, Value> = defaults
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        Self {
            schema: ReferenceCounter::new(Schema::new(name, defaults)),
        }
    }

    /// The factory's schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Builds a record holding exactly the schema defaults.
    #[must_use]
    pub fn create(&self) -> Record {
        Record::from_schema(self.schema.clone())
    }

    /// Builds a record from partial overrides; absent fields take their
    /// schema defaults, unknown field names are silently ignored, and
    /// later duplicates overwrite earlier ones.
    #[must_use]
    pub fn build<N, T, I>(&self, values: I) -> Record
    where
        N: Into<String>,
        T: Into<Value>,
        I: IntoIterator<Item = (N, T)>,
    {
        self.create().merge(values)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn schema_preserves_declaration_order() {
        let factory = RecordFactory::new([("b", 1), ("a", 2), ("c", 3)]);
        let fields: Vec<&str> = factory.schema().fields().collect();
        assert_eq!(fields, vec!["b", "a", "c"]);
    }

    #[rstest]
    fn duplicate_defaults_keep_first_position_last_value() {
        let factory = RecordFactory::new([("a", 1), ("b", 2), ("a", 10)]);
        let fields: Vec<&str> = factory.schema().fields().collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(
            factory.schema().default_of("a"),
            Some(&Value::from(10))
        );
    }

    #[rstest]
    fn anonymous_schema_displays_as_record() {
        let factory = RecordFactory::new([("x", 1)]);
        assert_eq!(factory.schema().name(), None);
        assert_eq!(factory.schema().display_name(), "Record");
    }
}
