use std::collections::VecDeque;

use tracing::debug;

use crate::db::Db;
use crate::error::Result;
use crate::flags::FlagSet;
use crate::rows::{initial_flags, Edge, Node};
use crate::schema::RelationType;
use crate::store::{CreateOutcome, Dir, ListQuery, NewRow, RawRow};
use crate::types::{Context, Guid, RowKey, RowKind, Value};

use super::cursor::{self, Cursor, RowPager};

/// What a relation listing yields per edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeMode {
    /// Edge rows only.
    Only,
    /// Edge rows paired with the far node, batch-fetched per page.
    Joined,
    /// The far nodes only.
    None,
}

/// One item of a relation listing.
#[derive(Clone, Debug)]
pub enum Traversed {
    /// Produced by [`EdgeMode::Only`].
    Edge(Edge),
    /// Produced by [`EdgeMode::Joined`]; the node is `None` if it was removed.
    Joined(Edge, Option<Node>),
    /// Produced by [`EdgeMode::None`].
    Node(Option<Node>),
}

impl Traversed {
    /// The edge, unless this item came from [`EdgeMode::None`].
    pub fn edge(&self) -> Option<&Edge> {
        match self {
            Traversed::Edge(edge) | Traversed::Joined(edge, _) => Some(edge),
            Traversed::Node(_) => None,
        }
    }

    /// The far node, when it was fetched and still exists.
    pub fn node(&self) -> Option<&Node> {
        match self {
            Traversed::Joined(_, node) | Traversed::Node(node) => node.as_ref(),
            Traversed::Edge(_) => None,
        }
    }
}

/// Edges of one owner through one side of a relation.
///
/// Directed relations list the owner's outgoing edges through the forward
/// accessor and its incoming edges through the mirror. Undirected relations
/// store each pair once under `(min, max)` and list both halves from either
/// side; the far node is always the side that is not the owner.
#[derive(Clone, Debug)]
pub struct Relation {
    ty: RelationType,
    owner: Guid,
}

impl RelationType {
    /// Accessor for the edges of `owner` on this side.
    pub fn of(&self, owner: Guid) -> Relation {
        Relation {
            ty: self.clone(),
            owner,
        }
    }
}

impl Relation {
    /// Owning node.
    pub fn owner(&self) -> Guid {
        self.owner
    }

    /// Relation side this accessor reads.
    pub fn relation(&self) -> &RelationType {
        &self.ty
    }

    fn dir(&self) -> Dir {
        if self.ty.is_directed() {
            Dir::from_forward(self.ty.is_forward())
        } else {
            Dir::Both
        }
    }

    /// `(base, rel)` of the edge between the owner and `other`.
    fn endpoints(&self, other: Guid) -> (Guid, Guid) {
        if !self.ty.is_directed() {
            (self.owner.min(other), self.owner.max(other))
        } else if self.ty.is_forward() {
            (self.owner, other)
        } else {
            (other, self.owner)
        }
    }

    fn edge_key(&self, other: Guid) -> RowKey {
        let (base, rel) = self.endpoints(other);
        RowKey::Edge { base, rel }
    }

    fn side_of(&self, base: Guid) -> Dir {
        match self.dir() {
            Dir::Both if base == self.owner => Dir::Out,
            Dir::Both => Dir::In,
            dir => dir,
        }
    }

    fn query(&self) -> ListQuery {
        ListQuery {
            kind: RowKind::Edge,
            owner: self.owner,
            ctx: self.ty.ctx(),
            dir: self.dir(),
        }
    }

    fn far_ctx(&self, db: &Db) -> Result<Context> {
        if self.ty.is_forward() {
            db.schema().resolve(self.ty.target())
        } else {
            Ok(self.ty.base())
        }
    }

    fn edge_from(&self, raw: RawRow) -> Result<Edge> {
        let side = match &raw.key {
            RowKey::Edge { base, .. } => self.side_of(*base),
            _ => self.dir(),
        };
        Edge::from_raw(raw, self.ty.def(), side)
    }

    /// Connects the owner to `other` with a null value and default flags.
    pub async fn add(&self, db: &Db, other: Guid) -> Result<bool> {
        self.add_with(db, other, Value::Null, None).await
    }

    /// Connects the owner to `other`.
    ///
    /// Returns false, writing nothing, if the edge already exists.
    pub async fn add_with(
        &self,
        db: &Db,
        other: Guid,
        value: Value,
        flags: Option<&FlagSet>,
    ) -> Result<bool> {
        let (base, rel) = self.endpoints(other);
        let row = NewRow {
            kind: RowKind::Edge,
            ctx: self.ty.ctx(),
            base: Some(base),
            rel: Some(rel),
            value,
            flags: initial_flags(flags, self.ty.def())?,
        };
        match db.store_create(row).await? {
            CreateOutcome::Created(_) => Ok(true),
            CreateOutcome::Exists | CreateOutcome::Conflict => {
                debug!(ctx = %self.ty.ctx(), base = %base, rel = %rel, "relation.add.exists");
                Ok(false)
            }
        }
    }

    /// The edge between the owner and `other`.
    pub async fn get(&self, db: &Db, other: Guid) -> Result<Option<Edge>> {
        db.store_get(&self.edge_key(other), self.ty.ctx())
            .await?
            .map(|raw| self.edge_from(raw))
            .transpose()
    }

    /// Disconnects the owner from `other`.
    pub async fn remove(&self, db: &Db, other: Guid) -> Result<bool> {
        db.store_remove(&self.edge_key(other), self.ty.ctx()).await
    }

    /// Moves the edge to `other` to `index` in the owner's list.
    ///
    /// Linear in the list length at the store.
    pub async fn shift(&self, db: &Db, other: Guid, index: usize) -> Result<bool> {
        let (base, rel) = self.endpoints(other);
        let side = self.side_of(base);
        db.store_shift(&RowKey::Edge { base, rel }, self.ty.ctx(), side, index)
            .await
    }

    /// Edge at `index` of the owner's listing.
    pub async fn nth(&self, db: &Db, index: u64) -> Result<Option<Edge>> {
        cursor::nth(db, self.query(), index)
            .await?
            .map(|raw| self.edge_from(raw))
            .transpose()
    }

    /// Lists the owner's edges from `cursor`, yielding items per `mode`.
    pub fn list(&self, db: &Db, mode: EdgeMode, cursor: Cursor) -> Result<RelationIter> {
        let far_ctx = match mode {
            EdgeMode::Only => None,
            EdgeMode::Joined | EdgeMode::None => Some(self.far_ctx(db)?),
        };
        Ok(RelationIter {
            relation: self.clone(),
            pager: RowPager::list(db, self.query(), cursor)?,
            mode,
            far_ctx,
            buffer: VecDeque::new(),
        })
    }

    /// Edge rows from offset 0 with the configured page size.
    pub fn edges(&self, db: &Db) -> Result<RelationIter> {
        self.list(db, EdgeMode::Only, db.cursor())
    }

    /// Edge and far-node pairs from offset 0 with the configured page size.
    pub fn joined(&self, db: &Db) -> Result<RelationIter> {
        self.list(db, EdgeMode::Joined, db.cursor())
    }

    /// Far nodes from offset 0 with the configured page size.
    pub fn nodes(&self, db: &Db) -> Result<RelationIter> {
        self.list(db, EdgeMode::None, db.cursor())
    }
}

/// Lazy relation listing; one `list` call per page, plus one `batch_get`
/// per page when nodes are requested.
#[derive(Debug)]
pub struct RelationIter {
    relation: Relation,
    pager: RowPager,
    mode: EdgeMode,
    far_ctx: Option<Context>,
    buffer: VecDeque<Traversed>,
}

impl RelationIter {
    /// Next item, fetching a page when the buffer runs dry.
    pub async fn next(&mut self) -> Result<Option<Traversed>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.fetch_page().await? {
                None => return Ok(None),
                Some(items) => self.buffer.extend(items),
            }
        }
    }

    /// Buffered items, or else the next page.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Traversed>>> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        self.fetch_page().await
    }

    /// Drains the remaining items into one vector.
    pub async fn try_collect(mut self) -> Result<Vec<Traversed>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Drains the remaining items, keeping only the edges.
    pub async fn try_collect_edges(self) -> Result<Vec<Edge>> {
        Ok(self
            .try_collect()
            .await?
            .into_iter()
            .filter_map(|item| match item {
                Traversed::Edge(edge) | Traversed::Joined(edge, _) => Some(edge),
                Traversed::Node(_) => None,
            })
            .collect())
    }

    /// Underlying pager position and state.
    pub fn pager(&self) -> &RowPager {
        &self.pager
    }

    async fn fetch_page(&mut self) -> Result<Option<Vec<Traversed>>> {
        let Some(rows) = self.pager.next_page().await? else {
            return Ok(None);
        };
        let edges = rows
            .into_iter()
            .map(|raw| self.relation.edge_from(raw))
            .collect::<Result<Vec<_>>>()?;
        let Some(far_ctx) = self.far_ctx else {
            return Ok(Some(edges.into_iter().map(Traversed::Edge).collect()));
        };
        let owner = self.relation.owner;
        let ids: Vec<(Guid, Context)> = edges.iter().map(|e| (e.other(owner), far_ctx)).collect();
        let db = self.pager.db();
        let far_def = db.def(far_ctx)?;
        let nodes = db
            .store_batch_get(&ids)
            .await?
            .into_iter()
            .map(|raw| raw.map(|raw| Node::from_raw(raw, far_def)).transpose())
            .collect::<Result<Vec<_>>>()?;
        debug!(
            ctx = %self.relation.ty.ctx(),
            owner = %owner,
            items = edges.len(),
            "relation.join.fetched"
        );
        let items = edges.into_iter().zip(nodes);
        Ok(Some(match self.mode {
            EdgeMode::None => items.map(|(_, node)| Traversed::Node(node)).collect(),
            _ => items
                .map(|(edge, node)| Traversed::Joined(edge, node))
                .collect(),
        }))
    }
}
