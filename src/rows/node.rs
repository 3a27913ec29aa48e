use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::flags::FlagSet;
use crate::schema::{ContextDef, NodeType};
use crate::store::{CreateOutcome, Dir, NewRow, RawRow};
use crate::types::{Guid, RowKey, RowKind, Value};

use super::{initial_flags, Row};

/// A guid-addressed row, optionally the child of another node.
#[derive(Clone, Debug)]
pub struct Node {
    id: Guid,
    row: Row,
}

impl Node {
    pub(crate) fn from_raw(raw: RawRow, def: &ContextDef) -> Result<Self> {
        let RowKey::Node(id) = raw.key else {
            return Err(RowGraphError::Store(format!(
                "expected a node row in context {}, got {}",
                raw.ctx, raw.key
            )));
        };
        Ok(Self {
            id,
            row: Row::hydrate(raw, def),
        })
    }

    /// Creates a node of type `ty`, as a child of `parent` when given.
    ///
    /// `flags` must come from `ty`'s layout; `None` stores the defaults.
    pub async fn create(
        db: &Db,
        ty: &NodeType,
        value: impl Into<Value>,
        parent: Option<Guid>,
        flags: Option<&FlagSet>,
    ) -> Result<Node> {
        let value = value.into();
        if !ty.value_kind().admits(&value) {
            return Err(RowGraphError::invalid(format!(
                "`{}` holds {} values, got {}",
                ty.name(),
                ty.value_kind().as_str(),
                value.kind().as_str()
            )));
        }
        let row = NewRow {
            kind: RowKind::Node,
            ctx: ty.ctx(),
            base: parent,
            rel: None,
            value,
            flags: initial_flags(flags, ty.def())?,
        };
        match db.store_create(row).await? {
            CreateOutcome::Created(raw) => Node::from_raw(raw, ty.def()),
            other => Err(RowGraphError::Store(format!(
                "node create in context {} returned {other:?}",
                ty.ctx()
            ))),
        }
    }

    /// Fetches node `id` of type `ty`.
    pub async fn get(db: &Db, ty: &NodeType, id: Guid) -> Result<Option<Node>> {
        db.store_get(&RowKey::Node(id), ty.ctx())
            .await?
            .map(|raw| Node::from_raw(raw, ty.def()))
            .transpose()
    }

    /// Fetches many nodes in one store call, aligned with `ids`.
    pub async fn get_many(db: &Db, ty: &NodeType, ids: &[Guid]) -> Result<Vec<Option<Node>>> {
        let request: Vec<_> = ids.iter().map(|id| (*id, ty.ctx())).collect();
        db.store_batch_get(&request)
            .await?
            .into_iter()
            .map(|raw| raw.map(|raw| Node::from_raw(raw, ty.def())).transpose())
            .collect()
    }

    /// Store-assigned id.
    pub fn guid(&self) -> Guid {
        self.id
    }

    /// Parent node, if this node was created under one.
    pub fn parent(&self) -> Option<Guid> {
        self.row.parent()
    }

    /// Moves this node to `index` among its parent's children.
    pub async fn shift(&self, db: &Db, index: usize) -> Result<bool> {
        self.row.shift_in(db, Dir::Out, index).await
    }

    /// Reparents this node under `parent`.
    ///
    /// Returns false if the store no longer has this node under the parent
    /// this copy last saw.
    pub async fn move_to(&mut self, db: &Db, parent: Guid) -> Result<bool> {
        let moved = db
            .store_move_node(self.id, self.row.ctx(), self.row.parent(), parent)
            .await?;
        if moved {
            debug!(node = %self.id, parent = %parent, "node.moved");
            self.row.set_parent(Some(parent));
        }
        Ok(moved)
    }

    /// Unwraps the row envelope.
    pub fn into_row(self) -> Row {
        self.row
    }
}

impl Deref for Node {
    type Target = Row;

    fn deref(&self) -> &Row {
        &self.row
    }
}

impl DerefMut for Node {
    fn deref_mut(&mut self) -> &mut Row {
        &mut self.row
    }
}
