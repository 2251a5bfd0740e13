//! The dynamic value universe shared by maps and records.
//!
//! Every field of a record and every entry of a [`PersistentKeyedMap`]
//! holds a [`Value`]: either a primitive (`Null`, `Bool`, `Int`, `Float`,
//! `String`) or a nested keyed container (`Map`, `Record`).
//!
//! # Equality and hashing
//!
//! Equality is structural: primitives compare by value, containers compare
//! by recursive field-wise comparison, independent of which internal tree
//! nodes happen to be shared. Containers cache an order-independent
//! structural hash at construction time, so `Hash` is O(1) and repeated
//! equality checks can short-circuit on hash inequality. Values are
//! immutable once constructed, so the cache never needs invalidation.
//!
//! Two deliberate deviations from IEEE-754 semantics make `Value: Eq`
//! possible: floats compare and hash **bitwise**, so `NaN == NaN` and
//! `0.0 != -0.0`; and distinct variants are never equal, so
//! `Int(1) != Float(1.0)`.
//!
//! # Examples
//!
//! ```rust
//! use fieldstone::value::Value;
//!
//! let value = Value::from("hello");
//! assert_eq!(value.as_str(), Some("hello"));
//! assert_eq!(value.to_string(), "\"hello\"");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::persistent::PersistentKeyedMap;
use crate::record::Record;

// =============================================================================
// ValueKind
// =============================================================================

/// Discriminant of a [`Value`], used in diagnostics and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// The null value.
    Null,
    /// A boolean.
    Bool,
    /// A 64-bit signed integer.
    Int,
    /// A 64-bit float.
    Float,
    /// A UTF-8 string.
    String,
    /// A persistent keyed map.
    Map,
    /// A schema-typed record.
    Record,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Map => "map",
            Self::Record => "record",
        };
        formatter.write_str(name)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A dynamically-typed value: a primitive or a nested keyed container.
///
/// `Value` is cheap to clone: primitives copy their payload and containers
/// copy a reference-counted root pointer.
///
/// # Examples
///
/// ```rust
/// use fieldstone::persistent::PersistentKeyedMap;
/// use fieldstone::value::Value;
///
/// let map: PersistentKeyedMap<Value, Value> =
///     [(Value::from("answer"), Value::from(42))].into_iter().collect();
/// let value = Value::from(map);
///
/// assert_eq!(value.to_string(), "Map { \"answer\": 42 }");
/// ```
#[derive(Clone)]
pub enum Value {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float; compares and hashes bitwise.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// A persistent keyed map with arbitrary `Value` keys.
    Map(PersistentKeyedMap<Value, Value>),
    /// A schema-typed record.
    Record(Record),
}

impl Value {
    /// Returns the kind discriminant of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Map(_) => ValueKind::Map,
            Self::Record(_) => ValueKind::Record,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this value is a keyed container (map or record)
    /// that key paths can traverse.
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Map(_) | Self::Record(_))
    }

    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float payload, if this is a `Float`.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the map payload, if this is a `Map`.
    #[must_use]
    pub const fn as_map(&self) -> Option<&PersistentKeyedMap<Self, Self>> {
        match self {
            Self::Map(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the record payload, if this is a `Record`.
    #[must_use]
    pub const fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(value) => Some(value),
            _ => None,
        }
    }

    /// Produces a plain, recursively converted JSON snapshot of this value.
    ///
    /// Containers become JSON objects: record fields appear in schema
    /// order, map keys are stringified through their display form (string
    /// keys verbatim, everything else as rendered). Non-finite floats map
    /// to JSON null.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::record::RecordFactory;
    /// use serde_json::json;
    ///
    /// let factory = RecordFactory::new([("x", 1), ("y", 2)]);
    /// let record = factory.create();
    ///
    /// assert_eq!(fieldstone::value::Value::from(record).to_json(), json!({"x": 1, "y": 2}));
    /// ```
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => (*value).into(),
            Self::Int(value) => (*value).into(),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(value) => value.clone().into(),
            Self::Map(map) => {
                let mut object = serde_json::Map::with_capacity(map.len());
                for (key, value) in map.iter() {
                    object.insert(key_string(key), value.to_json());
                }
                serde_json::Value::Object(object)
            }
            Self::Record(record) => record.to_json(),
        }
    }
}

/// The string form a map key takes in JSON output: string keys verbatim,
/// everything else through its display rendering.
pub(crate) fn key_string(key: &Value) -> String {
    match key {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Equality & Hashing
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left.to_bits() == right.to_bits(),
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Map(left), Self::Map(right)) => left == right,
            (Self::Record(left), Self::Record(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Structural hash; containers write their cached content hash, so hashing
/// is O(1) even for deep values.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => state.write_u8(0),
            Self::Bool(value) => {
                state.write_u8(1);
                value.hash(state);
            }
            Self::Int(value) => {
                state.write_u8(2);
                value.hash(state);
            }
            Self::Float(value) => {
                state.write_u8(3);
                value.to_bits().hash(state);
            }
            Self::String(value) => {
                state.write_u8(4);
                value.hash(state);
            }
            Self::Map(map) => {
                state.write_u8(5);
                map.hash(state);
            }
            Self::Record(record) => {
                state.write_u8(6);
                record.hash(state);
            }
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

macro_rules! impl_from_integer {
    ($($source:ty),+) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )+
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<PersistentKeyedMap<Value, Value>> for Value {
    fn from(value: PersistentKeyedMap<Self, Self>) -> Self {
        Self::Map(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

/// `None` converts to [`Value::Null`].
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// JSON-ish rendering: primitives as JSON scalars, strings JSON-escaped,
/// containers in the `Map { "key": value }` / `Name { "field": value }`
/// brace form.
impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("null"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Float(value) => match serde_json::Number::from_f64(*value) {
                Some(number) => write!(formatter, "{number}"),
                None => formatter.write_str("null"),
            },
            Self::String(value) => write!(formatter, "{}", serde_json::Value::from(value.as_str())),
            Self::Map(map) => write!(formatter, "{map}"),
            Self::Record(record) => write!(formatter, "{record}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, formatter)
    }
}

/// Renders as `Map { "key": value, ... }` in iteration order, `Map {}`
/// when empty.
impl fmt::Display for PersistentKeyedMap<Value, Value> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return formatter.write_str("Map {}");
        }

        formatter.write_str("Map { ")?;
        for (index, (key, value)) in self.iter().enumerate() {
            if index > 0 {
                formatter.write_str(", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        formatter.write_str(" }")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Map(map) => {
                let mut state = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    state.serialize_entry(&key_string(key), value)?;
                }
                state.end()
            }
            Self::Record(record) => record.serialize(serializer),
        }
    }
}

// =============================================================================
// Deep merge over Value containers
// =============================================================================

/// Resolves one deep-merge position.
///
/// Recurses when both sides hold the same kind of keyed container; any
/// other pairing is a leaf conflict handed to the resolver (plain deep
/// merge passes an overwrite resolver).
pub(crate) fn merge_deep_value<F>(
    previous: &Value,
    next: &Value,
    key: &Value,
    resolver: &mut F,
) -> Value
where
    F: FnMut(&Value, &Value, &Value) -> Value,
{
    match (previous, next) {
        (Value::Map(left), Value::Map(right)) => Value::Map(left.merge_deep_resolver(right, resolver)),
        (Value::Record(left), Value::Record(right)) => {
            Value::Record(left.merge_deep_record(right, resolver))
        }
        _ => resolver(previous, next, key),
    }
}

impl PersistentKeyedMap<Value, Value> {
    /// Deep merge: when both the receiver and `other` hold a keyed
    /// container of the same kind at a key, their contents are merged
    /// recursively instead of overwritten; mismatched kinds and plain
    /// values are overwritten right-biased.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fieldstone::persistent::PersistentKeyedMap;
    /// use fieldstone::value::Value;
    ///
    /// let inner_left: PersistentKeyedMap<Value, Value> =
    ///     [(Value::from("a"), Value::from(1))].into_iter().collect();
    /// let inner_right: PersistentKeyedMap<Value, Value> =
    ///     [(Value::from("b"), Value::from(2))].into_iter().collect();
    ///
    /// let left: PersistentKeyedMap<Value, Value> =
    ///     [(Value::from("nested"), Value::from(inner_left))].into_iter().collect();
    /// let right: PersistentKeyedMap<Value, Value> =
    ///     [(Value::from("nested"), Value::from(inner_right))].into_iter().collect();
    ///
    /// let merged = left.merge_deep(&right);
    /// let nested = merged.get(&Value::from("nested")).and_then(Value::as_map).unwrap();
    /// assert_eq!(nested.len(), 2); // both "a" and "b" survive
    /// ```
    #[must_use]
    pub fn merge_deep(&self, other: &Self) -> Self {
        self.merge_deep_resolver(other, &mut |_previous: &Value, next: &Value, _key: &Value| {
            next.clone()
        })
    }

    /// Deep merge with a conflict resolver, invoked as
    /// `resolver(previous, next, key)` at every position where both sides
    /// are present but not recursively mergeable.
    #[must_use]
    pub fn merge_deep_with<F>(&self, mut resolver: F, other: &Self) -> Self
    where
        F: FnMut(&Value, &Value, &Value) -> Value,
    {
        self.merge_deep_resolver(other, &mut resolver)
    }

    /// Shared recursion body for the deep-merge entry points.
    pub(crate) fn merge_deep_resolver<F>(&self, other: &Self, resolver: &mut F) -> Self
    where
        F: FnMut(&Value, &Value, &Value) -> Value,
    {
        let mut result = self.clone();
        for (key, next) in other {
            let merged = match self.get(key) {
                Some(previous) => merge_deep_value(previous, next, key, resolver),
                None => next.clone(),
            };
            result = result.insert(key.clone(), merged);
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
