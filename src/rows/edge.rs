use std::ops::{Deref, DerefMut};

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::schema::{ContextDef, RelationType};
use crate::store::{Dir, RawRow};
use crate::types::{Guid, RowKey};

use super::Row;

/// A relationship row from `base_id` to `rel_id`.
#[derive(Clone, Debug)]
pub struct Edge {
    base: Guid,
    rel: Guid,
    side: Dir,
    row: Row,
}

impl Edge {
    pub(crate) fn from_raw(raw: RawRow, def: &ContextDef, side: Dir) -> Result<Self> {
        let RowKey::Edge { base, rel } = raw.key else {
            return Err(RowGraphError::Store(format!(
                "expected an edge row in context {}, got {}",
                raw.ctx, raw.key
            )));
        };
        Ok(Self {
            base,
            rel,
            side,
            row: Row::hydrate(raw, def),
        })
    }

    /// Fetches the edge `base -> rel` of relation `ty`.
    pub async fn get(db: &Db, ty: &RelationType, base: Guid, rel: Guid) -> Result<Option<Edge>> {
        db.store_get(&RowKey::Edge { base, rel }, ty.ctx())
            .await?
            .map(|raw| Edge::from_raw(raw, ty.def(), Dir::Out))
            .transpose()
    }

    /// Base side.
    pub fn base_id(&self) -> Guid {
        self.base
    }

    /// Related side.
    pub fn rel_id(&self) -> Guid {
        self.rel
    }

    /// The side that is not `owner`. A self-loop returns `owner`.
    pub fn other(&self, owner: Guid) -> Guid {
        if self.base == owner {
            self.rel
        } else {
            self.base
        }
    }

    /// List this edge was read from: the base's outgoing or the related
    /// side's incoming list.
    pub fn side(&self) -> Dir {
        self.side
    }

    /// Moves this edge to `index` within the list it was read from.
    ///
    /// The store shifts every displaced sibling, so this is linear in the
    /// list length.
    pub async fn shift(&self, db: &Db, index: usize) -> Result<bool> {
        self.row.shift_in(db, self.side, index).await
    }
}

impl Deref for Edge {
    type Target = Row;

    fn deref(&self) -> &Row {
        &self.row
    }
}

impl DerefMut for Edge {
    fn deref_mut(&mut self) -> &mut Row {
        &mut self.row
    }
}
