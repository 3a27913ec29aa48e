//! Typed rows, packed flags and paginated traversal over a sharded row store.
//!
//! The crate sits between application code and a [`store::RowStore`]:
//!
//! - [`flags`] packs typed fields into each row's 16-bit flags word and
//!   persists only the bits that changed.
//! - [`rows`] wraps store rows and saves values with a compare-and-set
//!   against the last value read, or unconditionally when forced.
//! - [`traversal`] pages through children, aliases, names and edges, and
//!   joins edges to the nodes on their far side.
//!
//! Types are declared once at startup through a [`schema::Registry`] and
//! bound to a store with [`db::Db`].

#![warn(missing_docs)]

pub mod db;
pub mod error;
pub mod flags;
pub mod logging;
pub mod rows;
pub mod schema;
pub mod store;
pub mod traversal;
pub mod types;

pub use db::{Db, DbOptions};
pub use error::{Result, RowGraphError};
pub use flags::{BitLayout, FieldSchema, FlagSet, FlagValue};
pub use rows::{Alias, Edge, Lock, Name, Node, Prop, Row};
pub use schema::{Registry, Schema};
pub use store::{MemoryStore, RowStore};
pub use traversal::{Cursor, EdgeMode, Relation, Traversed};
pub use types::{Context, Guid, RowKey, RowKind, Value, ValueKind};
