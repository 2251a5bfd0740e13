//! Key-path navigation across nested containers.
//!
//! A [`KeyPath`] is an ordered sequence of keys addressing a location
//! nested arbitrarily deep inside maps and records. The functions in this
//! module walk a path one key at a time from a [`Value`] root:
//!
//! - [`get_in`] reads; a missing key or a non-container along the way is
//!   treated as absence and yields `None`
//! - [`set_in`] and [`update_in`] write, creating empty maps for missing
//!   intermediate keys
//! - [`delete_in`] removes the terminal key (resetting record fields to
//!   their default), and is a no-op when an intermediate key is absent
//!
//! Traversing *through* a non-container value is a programmer error for
//! the writing operations and fails fast with
//! [`Error::PathConflict`](crate::error::Error::PathConflict) rather than
//! silently overwriting a scalar with a container.
//!
//! [`Record`](crate::record::Record) and
//! [`PersistentKeyedMap<Value, Value>`] expose the same operations as
//! methods; the [`path!`](crate::path!) macro builds key paths from
//! anything convertible to [`Value`].
//!
//! # Examples
//!
//! ```rust
//! use fieldstone::persistent::PersistentKeyedMap;
//! use fieldstone::value::Value;
//! use fieldstone::path;
//!
//! let empty: PersistentKeyedMap<Value, Value> = PersistentKeyedMap::new();
//! let nested = empty.set_in(&path!["a", "b"], Value::from(1)).unwrap();
//!
//! assert_eq!(nested.get_in(&path!["a", "b"]), Some(&Value::from(1)));
//! assert_eq!(nested.get_in(&path!["a", "missing"]), None);
//! ```

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::persistent::PersistentKeyedMap;
use crate::value::Value;

/// An ordered sequence of keys addressing a nested location.
///
/// Stored inline for the short paths that dominate in practice.
pub type KeyPath = SmallVec<[Value; 4]>;

// =============================================================================
// Reading
// =============================================================================

/// Walks `path` from `root`, returning the addressed value.
///
/// The empty path returns the root itself. A missing key, a non-string key
/// into a record, or a non-container along the way yields `None`.
///
/// # Examples
///
/// ```rust
/// use fieldstone::value::Value;
/// use fieldstone::path::get_in;
///
/// let root = Value::from(7);
/// assert_eq!(get_in(&root, &[]), Some(&root));
/// assert_eq!(get_in(&root, &[Value::from("x")]), None);
/// ```
#[must_use]
pub fn get_in<'a>(root: &'a Value, path: &[Value]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = match current {
            Value::Map(map) => map.get(key)?,
            Value::Record(record) => record.get(key.as_str()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// =============================================================================
// Writing
// =============================================================================

/// Sets the value at `path`, returning a new root.
///
/// Missing intermediate keys are filled with empty maps. The empty path
/// returns `value` itself. Record steps require a string key naming a
/// schema field ([`Error::UnknownField`] otherwise), and traversing
/// through a non-container fails with [`Error::PathConflict`].
///
/// # Errors
///
/// `PathConflict` on scalar traversal, `UnknownField` on a bad record
/// step.
pub fn set_in(root: &Value, path: &[Value], value: Value) -> Result<Value> {
    set_in_at(root, path, value, 0)
}

/// Recursive body of [`set_in`]; `consumed` counts the keys already
/// traversed, for error reporting.
pub(crate) fn set_in_at(root: &Value, path: &[Value], value: Value, consumed: usize) -> Result<Value> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(value);
    };

    match root {
        Value::Map(map) => {
            let child = map
                .get(first)
                .cloned()
                .unwrap_or_else(|| Value::Map(PersistentKeyedMap::new()));
            let new_child = set_in_at(&child, rest, value, consumed + 1)?;
            Ok(Value::Map(map.insert(first.clone(), new_child)))
        }
        Value::Record(record) => {
            let field = record_step(record, first)?;
            let child = record.get(field).cloned().ok_or_else(|| Error::UnknownField {
                field: field.to_owned(),
                type_name: record.name().to_owned(),
            })?;
            let new_child = set_in_at(&child, rest, value, consumed + 1)?;
            Ok(Value::Record(record.set(field, new_child)?))
        }
        other => Err(Error::PathConflict {
            depth: consumed,
            kind: other.kind(),
        }),
    }
}

/// Updates the value at `path` with `updater`, returning a new root.
///
/// The updater receives `Some` of the current value when the path
/// resolves, and `None` when any step is absent; its result is written
/// back with [`set_in`], creating intermediate maps as needed.
///
/// # Errors
///
/// Same as [`set_in`].
pub fn update_in<F>(root: &Value, path: &[Value], updater: F) -> Result<Value>
where
    F: FnOnce(Option<Value>) -> Value,
{
    let current = get_in(root, path).cloned();
    set_in(root, path, updater(current))
}

/// Deletes the value at `path`, returning a new root.
///
/// Deleting through an absent intermediate key, an unknown record field,
/// or with an empty path is a no-op returning an equal root. The terminal
/// delete removes a map key outright and resets a record field to its
/// schema default.
///
/// # Errors
///
/// `PathConflict` when the path traverses a non-container value.
pub fn delete_in(root: &Value, path: &[Value]) -> Result<Value> {
    delete_in_at(root, path, 0)
}

/// Recursive body of [`delete_in`].
pub(crate) fn delete_in_at(root: &Value, path: &[Value], consumed: usize) -> Result<Value> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(root.clone());
    };

    match root {
        Value::Map(map) => {
            if rest.is_empty() {
                return Ok(Value::Map(map.remove(first)));
            }
            match map.get(first) {
                None => Ok(root.clone()),
                Some(child) => {
                    let new_child = delete_in_at(child, rest, consumed + 1)?;
                    Ok(Value::Map(map.insert(first.clone(), new_child)))
                }
            }
        }
        Value::Record(record) => {
            let Some(field) = first.as_str() else {
                return Ok(root.clone());
            };
            if !record.contains_field(field) {
                return Ok(root.clone());
            }
            if rest.is_empty() {
                return Ok(Value::Record(record.delete(field)?));
            }
            let Some(child) = record.get(field).cloned() else {
                return Ok(root.clone());
            };
            let new_child = delete_in_at(&child, rest, consumed + 1)?;
            Ok(Value::Record(record.set(field, new_child)?))
        }
        other => Err(Error::PathConflict {
            depth: consumed,
            kind: other.kind(),
        }),
    }
}

/// Validates a record path step: the key must be a string naming a field.
fn record_step<'a>(record: &crate::record::Record, key: &'a Value) -> Result<&'a str> {
    key.as_str().ok_or_else(|| Error::UnknownField {
        field: key.to_string(),
        type_name: record.name().to_owned(),
    })
}

// =============================================================================
// Path methods on the Value map
// =============================================================================

impl PersistentKeyedMap<Value, Value> {
    /// Walks `path` into this map; see [`get_in`].
    ///
    /// An empty path yields `None`; use the map itself.
    #[must_use]
    pub fn get_in(&self, path: &[Value]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        get_in(self.get(first)?, rest)
    }

    /// Sets the value at `path` inside this map; see [`set_in`].
    ///
    /// # Errors
    ///
    /// `EmptyPath` for an empty path, otherwise as [`set_in`].
    pub fn set_in(&self, path: &[Value], value: Value) -> Result<Self> {
        let (first, rest) = path.split_first().ok_or(Error::EmptyPath)?;
        let child = self
            .get(first)
            .cloned()
            .unwrap_or_else(|| Value::Map(Self::new()));
        let new_child = set_in_at(&child, rest, value, 1)?;
        Ok(self.insert(first.clone(), new_child))
    }

    /// Updates the value at `path` inside this map; see [`update_in`].
    ///
    /// # Errors
    ///
    /// `EmptyPath` for an empty path, otherwise as [`set_in`].
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

    /// Deletes the value at `path` inside this map; see [`delete_in`].
    ///
    /// # Errors
    ///
    /// `PathConflict` when the path traverses a non-container value.
    pub fn delete_in(&self, path: &[Value]) -> Result<Self> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(self.clone());
        };
        if rest.is_empty() {
            return Ok(self.remove(first));
        }
        match self.get(first) {
            None => Ok(self.clone()),
            Some(child) => {
                let new_child = delete_in_at(child, rest, 1)?;
                Ok(self.insert(first.clone(), new_child))
            }
        }
    }

    /// Alias for [`delete_in`](Self::delete_in).
    ///
    /// # Errors
    ///
    /// As [`delete_in`](Self::delete_in).
    pub fn remove_in(&self, path: &[Value]) -> Result<Self> {
        self.delete_in(path)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::value::ValueKind;
    use rstest::rstest;

    fn leaf_map(key: &str, value: i64) -> Value {
        Value::Map(PersistentKeyedMap::singleton(
            Value::from(key),
            Value::from(value),
        ))
    }

    #[rstest]
    fn get_in_empty_path_returns_root() {
        let root = leaf_map("a", 1);
        assert_eq!(get_in(&root, &[]), Some(&root));
    }

    #[rstest]
    fn get_in_scalar_traversal_is_absence() {
        let root = leaf_map("a", 1);
        assert_eq!(get_in(&root, &path!["a", "b"]), None);
    }

    #[rstest]
    fn set_in_creates_intermediate_maps() {
        let root = Value::Map(PersistentKeyedMap::new());
        let updated = set_in(&root, &path!["a", "b", "c"], Value::from(3)).unwrap();
        assert_eq!(get_in(&updated, &path!["a", "b", "c"]), Some(&Value::from(3)));
    }

    #[rstest]
    fn set_in_overwrites_scalar_terminal() {
        let root = leaf_map("a", 1);
        let updated = set_in(&root, &path!["a"], Value::from(2)).unwrap();
        assert_eq!(get_in(&updated, &path!["a"]), Some(&Value::from(2)));
    }

    #[rstest]
    fn set_in_through_scalar_reports_conflict() {
        let root = leaf_map("a", 1);
        let error = set_in(&root, &path!["a", "b"], Value::from(2)).unwrap_err();
        assert_eq!(
            error,
            Error::PathConflict {
                depth: 1,
                kind: ValueKind::Int
            }
        );
    }

    #[rstest]
    fn update_in_sees_none_for_absent_target() {
        let root = Value::Map(PersistentKeyedMap::new());
        let updated = update_in(&root, &path!["missing"], |current| {
            assert_eq!(current, None);
            Value::from(1)
        })
        .unwrap();
        assert_eq!(get_in(&updated, &path!["missing"]), Some(&Value::from(1)));
    }

    #[rstest]
    fn delete_in_absent_intermediate_is_noop() {
        let root = leaf_map("a", 1);
        let unchanged = delete_in(&root, &path!["x", "y"]).unwrap();
        assert_eq!(unchanged, root);
    }

    #[rstest]
    fn delete_in_through_scalar_reports_conflict() {
        let root = leaf_map("a", 1);
        let error = delete_in(&root, &path!["a", "b"]).unwrap_err();
        assert!(matches!(error, Error::PathConflict { depth: 1, .. }));
    }

    #[rstest]
    fn map_set_in_rejects_empty_path() {
        let map: PersistentKeyedMap<Value, Value> = PersistentKeyedMap::new();
        assert_eq!(
            map.set_in(&[], Value::from(1)).unwrap_err(),
            Error::EmptyPath
        );
    }
}
