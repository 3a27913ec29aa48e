use tracing::debug;

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::flags::FlagSet;
use crate::rows::{initial_flags, required_scope, scoped_value, Alias, Name, Node};
use crate::schema::{AliasType, NameType, NodeType};
use crate::store::{CreateOutcome, Dir, ListQuery, NewRow};
use crate::types::{Context, Guid, RowKey, RowKind, Value};

use super::cursor::{self, Cursor, RowIter, RowPager, Source};

impl Node {
    /// Children of this node with type `ty`, in list order.
    pub fn children(&self, db: &Db, ty: &NodeType, cursor: Cursor) -> Result<RowIter<Node>> {
        let def = ty.def().clone();
        let pager = RowPager::list(db, self.child_query(ty), cursor)?;
        Ok(RowIter::new(pager, move |_, raw| Node::from_raw(raw, &def)))
    }

    /// Child of type `ty` at `index`.
    pub async fn nth_child(&self, db: &Db, ty: &NodeType, index: u64) -> Result<Option<Node>> {
        cursor::nth(db, self.child_query(ty), index)
            .await?
            .map(|raw| Node::from_raw(raw, ty.def()))
            .transpose()
    }

    fn child_query(&self, ty: &NodeType) -> ListQuery {
        ListQuery {
            kind: RowKind::Node,
            owner: self.guid(),
            ctx: ty.ctx(),
            dir: Dir::Out,
        }
    }
}

/// Aliases of one owner in one alias context.
#[derive(Clone, Debug)]
pub struct Aliases {
    ty: AliasType,
    owner: Guid,
    scope: Option<Guid>,
}

impl AliasType {
    /// Accessor for the aliases of `owner`.
    ///
    /// Scoped alias types take the owner's parent as their scope, so the
    /// owner must have one.
    pub fn of(&self, owner: &Node) -> Result<Aliases> {
        let scope = if self.is_scoped() {
            Some(owner.parent().ok_or_else(|| {
                RowGraphError::invalid(format!(
                    "alias type `{}` is scoped to a parent but node {} has none",
                    self.name(),
                    owner.guid()
                ))
            })?)
        } else {
            None
        };
        Ok(Aliases {
            ty: self.clone(),
            owner: owner.guid(),
            scope: required_scope(self, scope)?,
        })
    }
}

impl Aliases {
    /// Owning node.
    pub fn owner(&self) -> Guid {
        self.owner
    }

    /// Claims `value` for the owner with default flags.
    pub async fn add(&self, db: &Db, value: &str) -> Result<bool> {
        self.add_with(db, value, None).await
    }

    /// Claims `value` for the owner.
    ///
    /// Returns false if the owner already holds it and fails with
    /// [`RowGraphError::AliasInUse`] if another owner does.
    pub async fn add_with(&self, db: &Db, value: &str, flags: Option<&FlagSet>) -> Result<bool> {
        let stored = scoped_value(self.scope, value);
        let row = NewRow {
            kind: RowKind::Alias,
            ctx: self.ty.ctx(),
            base: Some(self.owner),
            rel: None,
            value: Value::Str(stored.clone()),
            flags: initial_flags(flags, self.ty.def())?,
        };
        match db.store_create(row).await? {
            CreateOutcome::Created(_) => Ok(true),
            CreateOutcome::Exists => Ok(false),
            CreateOutcome::Conflict => {
                debug!(ctx = %self.ty.ctx(), value = %stored, "alias.add.conflict");
                Err(RowGraphError::AliasInUse {
                    ctx: self.ty.ctx(),
                    value: stored,
                })
            }
        }
    }

    /// The owner's alias row holding `value`.
    pub async fn get(&self, db: &Db, value: &str) -> Result<Option<Alias>> {
        db.store_get(&self.key(value), self.ty.ctx())
            .await?
            .map(|raw| Alias::from_raw(raw, self.ty.def(), self.scope))
            .transpose()
    }

    /// Drops `value` from the owner.
    pub async fn remove(&self, db: &Db, value: &str) -> Result<bool> {
        db.store_remove(&self.key(value), self.ty.ctx()).await
    }

    /// Alias at `index` of the owner's list.
    pub async fn nth(&self, db: &Db, index: u64) -> Result<Option<Alias>> {
        cursor::nth(db, self.query(), index)
            .await?
            .map(|raw| Alias::from_raw(raw, self.ty.def(), self.scope))
            .transpose()
    }

    /// The owner's aliases in list order.
    pub fn list(&self, db: &Db, cursor: Cursor) -> Result<RowIter<Alias>> {
        let def = self.ty.def().clone();
        let scope = self.scope;
        let pager = RowPager::list(db, self.query(), cursor)?;
        Ok(RowIter::new(pager, move |_, raw| Alias::from_raw(raw, &def, scope)))
    }

    fn key(&self, value: &str) -> RowKey {
        RowKey::Lookup {
            base: self.owner,
            value: scoped_value(self.scope, value),
        }
    }

    fn query(&self) -> ListQuery {
        lookup_query(self.owner, self.ty.ctx(), RowKind::Alias)
    }
}

/// Names of one owner in one name context.
#[derive(Clone, Debug)]
pub struct Names {
    ty: NameType,
    owner: Guid,
}

impl NameType {
    /// Accessor for the names of `owner`.
    pub fn of(&self, owner: Guid) -> Names {
        Names {
            ty: self.clone(),
            owner,
        }
    }

    /// Names across all owners matching `query`, using the type's search mode.
    pub fn search(&self, db: &Db, query: &str, cursor: Cursor) -> Result<RowIter<Name>> {
        let def = self.def().clone();
        let source = Source::Search {
            ctx: self.ctx(),
            query: query.to_owned(),
            mode: self.search_mode(),
        };
        let pager = RowPager::new(db, source, cursor)?;
        Ok(RowIter::new(pager, move |_, raw| Name::from_raw(raw, &def)))
    }
}

impl Names {
    /// Owning node.
    pub fn owner(&self) -> Guid {
        self.owner
    }

    /// Adds `value` with default flags.
    pub async fn add(&self, db: &Db, value: &str) -> Result<bool> {
        self.add_with(db, value, None).await
    }

    /// Adds `value`; false if the owner already has it.
    pub async fn add_with(&self, db: &Db, value: &str, flags: Option<&FlagSet>) -> Result<bool> {
        let row = NewRow {
            kind: RowKind::Name,
            ctx: self.ty.ctx(),
            base: Some(self.owner),
            rel: None,
            value: Value::Str(value.to_owned()),
            flags: initial_flags(flags, self.ty.def())?,
        };
        Ok(matches!(
            db.store_create(row).await?,
            CreateOutcome::Created(_)
        ))
    }

    /// The owner's name row holding `value`.
    pub async fn get(&self, db: &Db, value: &str) -> Result<Option<Name>> {
        db.store_get(&self.key(value), self.ty.ctx())
            .await?
            .map(|raw| Name::from_raw(raw, self.ty.def()))
            .transpose()
    }

    /// Drops `value` from the owner.
    pub async fn remove(&self, db: &Db, value: &str) -> Result<bool> {
        db.store_remove(&self.key(value), self.ty.ctx()).await
    }

    /// Name at `index` of the owner's list.
    pub async fn nth(&self, db: &Db, index: u64) -> Result<Option<Name>> {
        cursor::nth(db, lookup_query(self.owner, self.ty.ctx(), RowKind::Name), index)
            .await?
            .map(|raw| Name::from_raw(raw, self.ty.def()))
            .transpose()
    }

    /// The owner's names in list order.
    pub fn list(&self, db: &Db, cursor: Cursor) -> Result<RowIter<Name>> {
        let def = self.ty.def().clone();
        let query = lookup_query(self.owner, self.ty.ctx(), RowKind::Name);
        let pager = RowPager::list(db, query, cursor)?;
        Ok(RowIter::new(pager, move |_, raw| Name::from_raw(raw, &def)))
    }

    fn key(&self, value: &str) -> RowKey {
        RowKey::Lookup {
            base: self.owner,
            value: value.to_owned(),
        }
    }
}

fn lookup_query(owner: Guid, ctx: Context, kind: RowKind) -> ListQuery {
    ListQuery {
        kind,
        owner,
        ctx,
        dir: Dir::Out,
    }
}
