use crate::error::Result;
use crate::flags::{BitLayout, FieldSchema};
use crate::store::SearchMode;
use crate::types::{RowKind, ValueKind};

use super::handle::{AliasType, NameType, NodeType, PropType, RelationType};
use super::registry::{ContextSpec, Registry, TypeRef};

type Fields = Vec<(String, FieldSchema)>;

fn layout_of(fields: Fields) -> Result<BitLayout> {
    let mut layout = BitLayout::new();
    for (name, schema) in fields {
        layout.allocate(name, schema)?;
    }
    Ok(layout)
}

/// Declares a node type.
#[derive(Clone, Debug)]
pub struct NodeSchema {
    name: String,
    value_kind: ValueKind,
    parent: Option<TypeRef>,
    fields: Fields,
}

impl NodeSchema {
    /// Node type called `name`, holding JSON values by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_kind: ValueKind::Json,
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Kind of payload nodes of this type carry.
    pub fn value(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    /// Type nodes of this type are created under.
    pub fn parent(mut self, parent: impl Into<TypeRef>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declares a flag field; offsets are assigned at [`NodeSchema::build`].
    pub fn flag(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    /// Allocates the layout and the context, resolving pending references
    /// to this name.
    pub fn build(self, registry: &mut Registry) -> Result<NodeType> {
        let def = registry.register(ContextSpec {
            kind: RowKind::Node,
            name: self.name,
            value_kind: self.value_kind,
            layout: layout_of(self.fields)?,
            base: self.parent,
            target: None,
            directed: true,
            search: None,
            scoped: false,
        })?;
        Ok(NodeType::new(def))
    }
}

/// Declares a property type: one row per owner.
#[derive(Clone, Debug)]
pub struct PropSchema {
    name: String,
    owner: TypeRef,
    value_kind: ValueKind,
    fields: Fields,
}

impl PropSchema {
    /// Property `name` of `owner`, holding JSON values by default.
    pub fn new(name: impl Into<String>, owner: &NodeType) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            value_kind: ValueKind::Json,
            fields: Vec::new(),
        }
    }

    /// Kind of payload the property carries.
    pub fn value(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    /// Declares a flag field.
    pub fn flag(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    /// Allocates the layout and the context.
    pub fn build(self, registry: &mut Registry) -> Result<PropType> {
        let base = registry.resolve(self.owner)?;
        let def = registry.register(ContextSpec {
            kind: RowKind::Prop,
            name: self.name,
            value_kind: self.value_kind,
            layout: layout_of(self.fields)?,
            base: Some(self.owner),
            target: None,
            directed: true,
            search: None,
            scoped: false,
        })?;
        Ok(PropType::new(def, base))
    }
}

/// Declares an alias type: unique strings mapped to one owner each.
#[derive(Clone, Debug)]
pub struct AliasSchema {
    name: String,
    owner: TypeRef,
    scoped: bool,
    fields: Fields,
}

impl AliasSchema {
    /// Alias `name` of `owner`, unique across the whole context.
    pub fn new(name: impl Into<String>, owner: &NodeType) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            scoped: false,
            fields: Vec::new(),
        }
    }

    /// Makes values unique only among owners sharing a parent.
    pub fn scoped_to_parent(mut self) -> Self {
        self.scoped = true;
        self
    }

    /// Declares a flag field.
    pub fn flag(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    /// Allocates the layout and the context.
    pub fn build(self, registry: &mut Registry) -> Result<AliasType> {
        let base = registry.resolve(self.owner)?;
        let def = registry.register(ContextSpec {
            kind: RowKind::Alias,
            name: self.name,
            value_kind: ValueKind::Str,
            layout: layout_of(self.fields)?,
            base: Some(self.owner),
            target: None,
            directed: true,
            search: None,
            scoped: self.scoped,
        })?;
        Ok(AliasType::new(def, base))
    }
}

/// Declares a name type: searchable, non-unique strings.
#[derive(Clone, Debug)]
pub struct NameSchema {
    name: String,
    owner: TypeRef,
    search: SearchMode,
    fields: Fields,
}

impl NameSchema {
    /// Name `name` of `owner`, searched by prefix by default.
    pub fn new(name: impl Into<String>, owner: &NodeType) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            search: SearchMode::Prefix,
            fields: Vec::new(),
        }
    }

    /// Search strategy requested from the store.
    pub fn search(mut self, mode: SearchMode) -> Self {
        self.search = mode;
        self
    }

    /// Declares a flag field.
    pub fn flag(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    /// Allocates the layout and the context.
    pub fn build(self, registry: &mut Registry) -> Result<NameType> {
        let base = registry.resolve(self.owner)?;
        let def = registry.register(ContextSpec {
            kind: RowKind::Name,
            name: self.name,
            value_kind: ValueKind::Str,
            layout: layout_of(self.fields)?,
            base: Some(self.owner),
            target: None,
            directed: true,
            search: Some(self.search),
            scoped: false,
        })?;
        Ok(NameType::new(def, base))
    }
}

/// Declares a relation between a base node type and a target node type.
///
/// The target may be a forward reference from [`Registry::forward`].
#[derive(Clone, Debug)]
pub struct RelationSchema {
    name: String,
    base: TypeRef,
    target: TypeRef,
    value_kind: ValueKind,
    directed: bool,
    fields: Fields,
}

impl RelationSchema {
    /// Directed relation `name` from `base` to `target`, without payload.
    pub fn new(name: impl Into<String>, base: &NodeType, target: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
            target: target.into(),
            value_kind: ValueKind::Null,
            directed: true,
            fields: Vec::new(),
        }
    }

    /// Kind of payload edges carry.
    pub fn value(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    /// Stores each pair once regardless of which side added it.
    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }

    /// Declares a flag field.
    pub fn flag(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    /// Allocates the layout and the context; returns the forward accessor.
    pub fn build(self, registry: &mut Registry) -> Result<RelationType> {
        let base = registry.resolve(self.base)?;
        let def = registry.register(ContextSpec {
            kind: RowKind::Edge,
            name: self.name,
            value_kind: self.value_kind,
            layout: layout_of(self.fields)?,
            base: Some(self.base),
            target: Some(self.target),
            directed: self.directed,
            search: None,
            scoped: false,
        })?;
        Ok(RelationType::new(def, base, self.target))
    }
}
