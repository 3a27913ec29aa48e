use std::sync::Arc;

use crate::flags::{BitLayout, FlagSet};
use crate::store::SearchMode;
use crate::types::{Context, ValueKind};

use super::registry::{ContextDef, TypeRef};

macro_rules! context_accessors {
    ($ty:ident) => {
        impl $ty {
            /// Store context of this type.
            pub fn ctx(&self) -> Context {
                self.def.ctx
            }

            /// Declared name.
            pub fn name(&self) -> &str {
                &self.def.name
            }

            /// Payload kind.
            pub fn value_kind(&self) -> ValueKind {
                self.def.value_kind
            }

            /// Frozen flags layout.
            pub fn layout(&self) -> &Arc<BitLayout> {
                &self.def.layout
            }

            /// Detached flag set at the layout defaults.
            pub fn flags(&self) -> FlagSet {
                self.def.layout.flags()
            }

            /// Full frozen definition.
            pub fn def(&self) -> &ContextDef {
                &self.def
            }
        }
    };
}

/// Built node type.
#[derive(Clone, Debug)]
pub struct NodeType {
    def: ContextDef,
}

impl NodeType {
    pub(crate) fn new(def: ContextDef) -> Self {
        Self { def }
    }

    /// Type nodes of this type are created under, if declared.
    pub fn parent(&self) -> Option<TypeRef> {
        self.def.base
    }
}

impl From<&NodeType> for TypeRef {
    fn from(ty: &NodeType) -> Self {
        TypeRef::Resolved(ty.def.ctx)
    }
}

/// Built property type.
#[derive(Clone, Debug)]
pub struct PropType {
    def: ContextDef,
    owner: Context,
}

impl PropType {
    pub(crate) fn new(def: ContextDef, owner: Context) -> Self {
        Self { def, owner }
    }

    /// Node type owning the property.
    pub fn owner(&self) -> Context {
        self.owner
    }
}

/// Built alias type.
#[derive(Clone, Debug)]
pub struct AliasType {
    def: ContextDef,
    owner: Context,
}

impl AliasType {
    pub(crate) fn new(def: ContextDef, owner: Context) -> Self {
        Self { def, owner }
    }

    /// Node type owning the aliases.
    pub fn owner(&self) -> Context {
        self.owner
    }

    /// Whether values are unique only under the owner's parent.
    pub fn is_scoped(&self) -> bool {
        self.def.scoped
    }
}

/// Built name type.
#[derive(Clone, Debug)]
pub struct NameType {
    def: ContextDef,
    owner: Context,
}

impl NameType {
    pub(crate) fn new(def: ContextDef, owner: Context) -> Self {
        Self { def, owner }
    }

    /// Node type owning the names.
    pub fn owner(&self) -> Context {
        self.owner
    }

    /// Search strategy requested from the store.
    pub fn search_mode(&self) -> SearchMode {
        self.def.search.unwrap_or(SearchMode::Prefix)
    }
}

/// One side of a built relation.
///
/// [`RelationSchema::build`](super::RelationSchema::build) returns the
/// forward side, declared on the base type; [`RelationType::mirror`] gives
/// the side declared on the target type. Both address the same context.
#[derive(Clone, Debug)]
pub struct RelationType {
    def: ContextDef,
    base: Context,
    target: TypeRef,
    forward: bool,
}

impl RelationType {
    pub(crate) fn new(def: ContextDef, base: Context, target: TypeRef) -> Self {
        Self {
            def,
            base,
            target,
            forward: true,
        }
    }

    /// Node type on the base side.
    pub fn base(&self) -> Context {
        self.base
    }

    /// Node type on the related side.
    pub fn target(&self) -> TypeRef {
        self.target
    }

    /// Whether this accessor is declared on the base side.
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Whether the relation distinguishes base and related sides.
    pub fn is_directed(&self) -> bool {
        self.def.directed
    }

    /// Accessor for the opposite side of the same context.
    pub fn mirror(&self) -> Self {
        Self {
            forward: !self.forward,
            ..self.clone()
        }
    }
}

context_accessors!(NodeType);
context_accessors!(PropType);
context_accessors!(AliasType);
context_accessors!(NameType);
context_accessors!(RelationType);
