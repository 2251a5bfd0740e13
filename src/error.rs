//! Error types for record and path operations.
//!
//! Every failure in this crate is a deterministic programmer-error
//! condition reported synchronously at the call that triggered it; no
//! operation performs I/O, so there are no transient or retryable errors.
//!
//! A sealed-transaction misuse has no error variant on purpose: sealing a
//! [`TransientKeyedMap`](crate::persistent::TransientKeyedMap) or
//! [`TransientRecord`](crate::record::TransientRecord) consumes the draft,
//! so mutation-after-seal is rejected at compile time.

use crate::value::ValueKind;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by record accessors and key-path operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A field name was used that is not part of the record's schema.
    ///
    /// Raised by the `set` family of record operations, which fail fast.
    /// Merges silently skip unknown fields instead, and `get` returns
    /// `None`; each method documents which policy it follows.
    #[error("unknown field {field:?} on {type_name}")]
    UnknownField {
        /// The offending field name (display form for non-string keys).
        field: String,
        /// The record type name, `"Record"` for anonymous schemas.
        type_name: String,
    },

    /// A key path tried to traverse through a value that is not a keyed
    /// container.
    ///
    /// `get_in` treats this as absence and returns `None`; the writing
    /// path operations surface it so that a scalar is never silently
    /// overwritten by an intermediate container.
    #[error("key path reached a {kind} value after {depth} steps, expected a keyed container")]
    PathConflict {
        /// Number of path keys successfully traversed before the conflict.
        depth: usize,
        /// Kind of the non-container value that blocked traversal.
        kind: ValueKind,
    },

    /// An empty key path was given to an operation that needs at least one
    /// key, such as `set_in` on a record.
    #[error("key path must not be empty")]
    EmptyPath,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn unknown_field_display_names_field_and_type() {
        let error = Error::UnknownField {
            field: "z".to_string(),
            type_name: "Foo".to_string(),
        };
        assert_eq!(error.to_string(), "unknown field \"z\" on Foo");
    }

    #[rstest]
    fn path_conflict_display_reports_depth_and_kind() {
        let error = Error::PathConflict {
            depth: 2,
            kind: ValueKind::Int,
        };
        assert_eq!(
            error.to_string(),
            "key path reached a int value after 2 steps, expected a keyed container"
        );
    }
}
