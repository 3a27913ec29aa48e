//! Type declarations and the context registry.
//!
//! Types are declared with builders, each of which collects flag fields and
//! then allocates its bit layout and store context in one `build` call:
//!
//! ```
//! use rowgraph::flags::FieldSchema;
//! use rowgraph::schema::{NodeSchema, Registry, RelationSchema};
//!
//! let mut registry = Registry::new();
//! let user = NodeSchema::new("User")
//!     .flag("verified", FieldSchema::bool(false))
//!     .build(&mut registry)?;
//! let doc = registry.forward("Doc");
//! let owns = RelationSchema::new("User.owns", &user, doc).build(&mut registry)?;
//! NodeSchema::new("Doc").build(&mut registry)?;
//! let schema = registry.finish()?;
//! assert!(schema.def(owns.ctx()).is_some());
//! # Ok::<(), rowgraph::RowGraphError>(())
//! ```

mod builder;
mod handle;
mod registry;

pub use builder::{AliasSchema, NameSchema, NodeSchema, PropSchema, RelationSchema};
pub use handle::{AliasType, NameType, NodeType, PropType, RelationType};
pub use registry::{ContextDef, Registry, Schema, TypeRef};
