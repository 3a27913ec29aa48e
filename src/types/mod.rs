//! Identifiers shared by every row kind.

use std::fmt;

mod value;

pub use value::{Value, ValueKind};

/// Globally unique id the store assigns to a node row.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Guid(pub u64);

/// Opaque tag naming a row type for store-level indexing.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Context(pub u32);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Guid {
    fn from(value: u64) -> Self {
        Guid(value)
    }
}

impl From<u32> for Context {
    fn from(value: u32) -> Self {
        Context(value)
    }
}

/// Family a context belongs to; fixes which identity shape its rows use.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RowKind {
    /// Guid-addressed row, optionally the child of another node.
    Node,
    /// One row per `(owner, context)`.
    Prop,
    /// Globally unique string owned by one row.
    Alias,
    /// Non-unique searchable string.
    Name,
    /// Relationship between a base row and a related row.
    Edge,
}

impl RowKind {
    /// Short lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RowKind::Node => "node",
            RowKind::Prop => "prop",
            RowKind::Alias => "alias",
            RowKind::Name => "name",
            RowKind::Edge => "edge",
        }
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store identity of a row within its context.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RowKey {
    /// A node, addressed by its guid.
    Node(Guid),
    /// The single property row of `base`.
    Prop {
        /// Owning row.
        base: Guid,
    },
    /// An alias or name entry of `base` holding `value`.
    Lookup {
        /// Owning row.
        base: Guid,
        /// Stored string (scoped aliases include their prefix).
        value: String,
    },
    /// An edge from `base` to `rel`.
    Edge {
        /// Base side.
        base: Guid,
        /// Related side.
        rel: Guid,
    },
}

impl RowKey {
    /// The row that owns this one, if any.
    pub fn base(&self) -> Option<Guid> {
        match self {
            RowKey::Node(_) => None,
            RowKey::Prop { base } | RowKey::Lookup { base, .. } | RowKey::Edge { base, .. } => {
                Some(*base)
            }
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Node(id) => write!(f, "node({id})"),
            RowKey::Prop { base } => write!(f, "prop({base})"),
            RowKey::Lookup { base, value } => write!(f, "lookup({base}, {value:?})"),
            RowKey::Edge { base, rel } => write!(f, "edge({base} -> {rel})"),
        }
    }
}
