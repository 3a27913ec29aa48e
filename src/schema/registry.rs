use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Result, RowGraphError};
use crate::flags::BitLayout;
use crate::store::SearchMode;
use crate::types::{Context, RowKind, ValueKind};

/// Reference to a node type, possibly declared later.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeRef {
    /// Context of an already-built type.
    Resolved(Context),
    /// Slot in the registry's placeholder arena.
    Pending(usize),
}

impl From<Context> for TypeRef {
    fn from(ctx: Context) -> Self {
        TypeRef::Resolved(ctx)
    }
}

/// Frozen description of one context.
#[derive(Clone, Debug)]
pub struct ContextDef {
    /// Store context number.
    pub ctx: Context,
    /// Row family.
    pub kind: RowKind,
    /// Declared type name.
    pub name: String,
    /// Payload kind.
    pub value_kind: ValueKind,
    /// Frozen flags layout.
    pub layout: Arc<BitLayout>,
    /// Owner type (prop, alias, name, edge) or parent type (node).
    pub base: Option<TypeRef>,
    /// Related type of an edge context.
    pub target: Option<TypeRef>,
    /// Whether an edge context distinguishes its two sides.
    pub directed: bool,
    /// Name search strategy.
    pub search: Option<SearchMode>,
    /// Whether alias values are unique only under the owner's parent.
    pub scoped: bool,
    /// Bits the layout occupies.
    pub flags_mask: u16,
}

pub(crate) struct ContextSpec {
    pub kind: RowKind,
    pub name: String,
    pub value_kind: ValueKind,
    pub layout: BitLayout,
    pub base: Option<TypeRef>,
    pub target: Option<TypeRef>,
    pub directed: bool,
    pub search: Option<SearchMode>,
    pub scoped: bool,
}

#[derive(Debug)]
struct Placeholder {
    name: String,
    resolved: Option<Context>,
}

/// Allocates contexts and freezes layouts while types are being declared.
///
/// Created once at startup and passed to every schema builder. Once all
/// types are built, [`Registry::finish`] checks that every forward
/// reference was resolved and yields the immutable [`Schema`].
#[derive(Debug, Default)]
pub struct Registry {
    defs: Vec<ContextDef>,
    names: FxHashMap<String, Context>,
    placeholders: Vec<Placeholder>,
}

impl Registry {
    /// Creates an empty registry; the first context is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference to the node type `name`, declared now or later.
    pub fn forward(&mut self, name: &str) -> TypeRef {
        if let Some(ctx) = self
            .names
            .get(name)
            .copied()
            .filter(|ctx| self.def(*ctx).is_some_and(|def| def.kind == RowKind::Node))
        {
            return TypeRef::Resolved(ctx);
        }
        if let Some(idx) = self.placeholders.iter().position(|p| p.name == name) {
            return TypeRef::Pending(idx);
        }
        self.placeholders.push(Placeholder {
            name: name.to_owned(),
            resolved: None,
        });
        TypeRef::Pending(self.placeholders.len() - 1)
    }

    /// Context a reference points at, if known yet.
    pub fn resolve(&self, reference: TypeRef) -> Result<Context> {
        resolve_in(&self.placeholders, reference)
    }

    /// Definition of `ctx`.
    pub fn def(&self, ctx: Context) -> Option<&ContextDef> {
        def_in(&self.defs, ctx)
    }

    /// Number of contexts allocated so far.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether no contexts were allocated.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub(crate) fn register(&mut self, spec: ContextSpec) -> Result<ContextDef> {
        if self.names.contains_key(&spec.name) {
            return Err(RowGraphError::DuplicateType(spec.name));
        }
        let ctx = Context(self.defs.len() as u32 + 1);
        let mut layout = spec.layout;
        layout.freeze();
        let def = ContextDef {
            ctx,
            kind: spec.kind,
            name: spec.name,
            value_kind: spec.value_kind,
            flags_mask: layout.used_mask(),
            layout: Arc::new(layout),
            base: spec.base,
            target: spec.target,
            directed: spec.directed,
            search: spec.search,
            scoped: spec.scoped,
        };
        if def.kind == RowKind::Node {
            for placeholder in self.placeholders.iter_mut() {
                if placeholder.name == def.name && placeholder.resolved.is_none() {
                    placeholder.resolved = Some(ctx);
                    debug!(name = %def.name, ctx = %ctx, "schema.forward.resolved");
                }
            }
        }
        debug!(
            name = %def.name,
            ctx = %ctx,
            kind = %def.kind,
            bits = def.layout.bits_used(),
            "schema.context.registered"
        );
        self.names.insert(def.name.clone(), ctx);
        self.defs.push(def.clone());
        Ok(def)
    }

    /// Freezes the registry, failing if a forward reference never resolved.
    pub fn finish(self) -> Result<Arc<Schema>> {
        if let Some(missing) = self.placeholders.iter().find(|p| p.resolved.is_none()) {
            return Err(RowGraphError::UnresolvedType(missing.name.clone()));
        }
        Ok(Arc::new(Schema {
            defs: self.defs,
            names: self.names,
            placeholders: self.placeholders,
        }))
    }
}

fn resolve_in(placeholders: &[Placeholder], reference: TypeRef) -> Result<Context> {
    match reference {
        TypeRef::Resolved(ctx) => Ok(ctx),
        TypeRef::Pending(idx) => {
            let placeholder = placeholders
                .get(idx)
                .ok_or_else(|| RowGraphError::invalid(format!("unknown type reference #{idx}")))?;
            placeholder
                .resolved
                .ok_or_else(|| RowGraphError::UnresolvedType(placeholder.name.clone()))
        }
    }
}

fn def_in(defs: &[ContextDef], ctx: Context) -> Option<&ContextDef> {
    (ctx.0 as usize)
        .checked_sub(1)
        .and_then(|idx| defs.get(idx))
}

/// Immutable set of declared contexts shared by a [`crate::db::Db`].
#[derive(Debug)]
pub struct Schema {
    defs: Vec<ContextDef>,
    names: FxHashMap<String, Context>,
    placeholders: Vec<Placeholder>,
}

impl Schema {
    /// Definition of `ctx`.
    pub fn def(&self, ctx: Context) -> Option<&ContextDef> {
        def_in(&self.defs, ctx)
    }

    /// Definition of the type declared as `name`.
    pub fn by_name(&self, name: &str) -> Option<&ContextDef> {
        self.names.get(name).and_then(|ctx| self.def(*ctx))
    }

    /// Context a reference points at.
    pub fn resolve(&self, reference: TypeRef) -> Result<Context> {
        resolve_in(&self.placeholders, reference)
    }

    /// All definitions in context order.
    pub fn defs(&self) -> impl Iterator<Item = &ContextDef> {
        self.defs.iter()
    }
}
