//! # fieldstone
//!
//! Schema-typed persistent records over a structurally shared keyed map.
//!
//! ## Overview
//!
//! This library provides the engine a typed, persistent record type needs:
//!
//! - **Persistent keyed map**: [`persistent::PersistentKeyedMap`], an
//!   immutable HAMT with O(log N) derived updates and full structural
//!   sharing between versions
//! - **Records with defaults**: [`record::RecordFactory`] captures an
//!   ordered field-name to default-value schema once;
//!   [`record::Record`] instances store only their overridden fields and
//!   read everything else from the shared schema
//! - **Structural equality**: deep, field-wise comparison with cached
//!   content hashes, so `Hash` is O(1) and equality short-circuits
//! - **Key paths**: [`path`] resolves key sequences through nested maps
//!   and records for `get_in`/`set_in`/`update_in`/`delete_in`
//! - **Mutation transactions**: transient drafts
//!   ([`persistent::TransientKeyedMap`], [`record::TransientRecord`])
//!   batch many edits into one persistent update; sealing consumes the
//!   draft, so use-after-seal does not compile
//!
//! ## Feature Flags
//!
//! - `arc`: use `Arc` instead of `Rc` for structural sharing, making the
//!   persistent structures `Send + Sync` when their contents are
//! - `serde`: `serde::Serialize` implementations mirroring `to_json`
//!
//! ## Example
//!
//! ```rust
//! use fieldstone::prelude::*;
//! use fieldstone::{fields, path};
//!
//! let foo_factory = RecordFactory::named("Foo", fields! { "x" => 1, "y" => true });
//! let bar_factory = RecordFactory::named("Bar", fields! {
//!     "a" => "boop",
//!     "b" => 0,
//!     "c" => foo_factory.create(),
//! });
//!
//! let bar = bar_factory.create();
//! assert_eq!(bar.get_in(&path!["c", "x"]), Some(&Value::from(1)));
//!
//! let updated = bar.update_in(&path!["c", "x"], |x| {
//!     Value::from(x.and_then(|v| v.as_int()).unwrap_or(0) + 1)
//! }).unwrap();
//! assert_eq!(updated.get_in(&path!["c", "x"]), Some(&Value::from(2)));
//! assert_eq!(bar.get_in(&path!["c", "x"]), Some(&Value::from(1)));
//! ```
//!
//! ## Typed facades
//!
//! The core is dynamic and string-keyed. A statically-typed record is a
//! thin wrapper forwarding named accessors to `get`/`set`:
//!
//! ```rust
//! use fieldstone::prelude::*;
//! use fieldstone::fields;
//!
//! struct Point(Record);
//!
//! impl Point {
//!     fn factory() -> RecordFactory {
//!         RecordFactory::named("Point", fields! { "x" => 0, "y" => 0 })
//!     }
//!
//!     fn x(&self) -> i64 {
//!         self.0.get("x").and_then(Value::as_int).unwrap_or_default()
//!     }
//!
//!     fn with_x(&self, x: i64) -> Self {
//!         Self(self.0.set("x", x).expect("schema field"))
//!     }
//! }
//!
//! let point = Point(Point::factory().create()).with_x(3);
//! assert_eq!(point.x(), 3);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types.
///
/// # Usage
///
/// ```rust
/// use fieldstone::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::path::KeyPath;
    pub use crate::persistent::{PersistentKeyedMap, TransientKeyedMap};
    pub use crate::record::{Record, RecordFactory, Schema, TransientRecord};
    pub use crate::value::{Value, ValueKind};
}

pub mod error;
pub mod path;
pub mod persistent;
pub mod record;
pub mod value;

mod macros;
