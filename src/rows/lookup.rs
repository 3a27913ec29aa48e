use std::ops::{Deref, DerefMut};

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::schema::{AliasType, ContextDef};
use crate::store::{Dir, RawRow};
use crate::types::{Guid, RowKey};

use super::{Node, Row};

/// Stored form of an alias value; scoped values carry `"<scope>:"` in front.
pub(crate) fn scoped_value(scope: Option<Guid>, value: &str) -> String {
    match scope {
        Some(scope) => format!("{scope}:{value}"),
        None => value.to_owned(),
    }
}

/// Inverse of [`scoped_value`].
pub(crate) fn strip_scope(scope: Option<Guid>, stored: &str) -> &str {
    match scope {
        Some(scope) => stored
            .strip_prefix(&format!("{scope}:"))
            .unwrap_or(stored),
        None => stored,
    }
}

fn lookup_owner(raw: &RawRow) -> Result<Guid> {
    match raw.key {
        RowKey::Lookup { base, .. } => Ok(base),
        ref other => Err(RowGraphError::Store(format!(
            "expected a lookup row in context {}, got {other}",
            raw.ctx
        ))),
    }
}

/// A unique string owned by one node.
#[derive(Clone, Debug)]
pub struct Alias {
    owner: Guid,
    scope: Option<Guid>,
    row: Row,
}

impl Alias {
    pub(crate) fn from_raw(raw: RawRow, def: &ContextDef, scope: Option<Guid>) -> Result<Self> {
        Ok(Self {
            owner: lookup_owner(&raw)?,
            scope,
            row: Row::hydrate(raw, def),
        })
    }

    /// Finds the alias row holding `value`.
    ///
    /// Scoped alias types need the `scope` the value was added under.
    pub async fn lookup(
        db: &Db,
        ty: &AliasType,
        value: &str,
        scope: Option<Guid>,
    ) -> Result<Option<Alias>> {
        let scope = required_scope(ty, scope)?;
        db.store_lookup_alias(ty.ctx(), &scoped_value(scope, value))
            .await?
            .map(|raw| Alias::from_raw(raw, ty.def(), scope))
            .transpose()
    }

    /// Resolves `value` straight to its owning node.
    pub async fn lookup_owner(
        db: &Db,
        ty: &AliasType,
        value: &str,
        scope: Option<Guid>,
    ) -> Result<Option<Node>> {
        let Some(alias) = Alias::lookup(db, ty, value, scope).await? else {
            return Ok(None);
        };
        let owner_def = db.def(ty.owner())?;
        db.store_get(&RowKey::Node(alias.owner), ty.owner())
            .await?
            .map(|raw| Node::from_raw(raw, owner_def))
            .transpose()
    }

    /// Owning node.
    pub fn owner(&self) -> Guid {
        self.owner
    }

    /// Scope the value is unique within, for scoped alias types.
    pub fn scope(&self) -> Option<Guid> {
        self.scope
    }

    /// Alias text without its scope prefix.
    pub fn text(&self) -> &str {
        strip_scope(self.scope, self.row.value().as_str().unwrap_or_default())
    }

    /// Replaces the text locally; [`Row::save`] renames it in the store.
    pub fn rename(&mut self, value: &str) -> Result<()> {
        let stored = scoped_value(self.scope, value);
        self.row.set_value(stored)
    }

    /// Moves this alias to `index` in its owner's list.
    pub async fn shift(&self, db: &Db, index: usize) -> Result<bool> {
        self.row.shift_in(db, Dir::Out, index).await
    }
}

pub(crate) fn required_scope(ty: &AliasType, scope: Option<Guid>) -> Result<Option<Guid>> {
    match (ty.is_scoped(), scope) {
        (true, None) => Err(RowGraphError::invalid(format!(
            "alias type `{}` is scoped to a parent; a scope is required",
            ty.name()
        ))),
        (true, scope) => Ok(scope),
        (false, _) => Ok(None),
    }
}

impl Deref for Alias {
    type Target = Row;

    fn deref(&self) -> &Row {
        &self.row
    }
}

impl DerefMut for Alias {
    fn deref_mut(&mut self) -> &mut Row {
        &mut self.row
    }
}

/// A searchable, non-unique string owned by one node.
#[derive(Clone, Debug)]
pub struct Name {
    owner: Guid,
    row: Row,
}

impl Name {
    pub(crate) fn from_raw(raw: RawRow, def: &ContextDef) -> Result<Self> {
        Ok(Self {
            owner: lookup_owner(&raw)?,
            row: Row::hydrate(raw, def),
        })
    }

    /// Owning node.
    pub fn owner(&self) -> Guid {
        self.owner
    }

    /// Stored text.
    pub fn text(&self) -> &str {
        self.row.value().as_str().unwrap_or_default()
    }

    /// Moves this name to `index` in its owner's list.
    pub async fn shift(&self, db: &Db, index: usize) -> Result<bool> {
        self.row.shift_in(db, Dir::Out, index).await
    }
}

impl Deref for Name {
    type Target = Row;

    fn deref(&self) -> &Row {
        &self.row
    }
}

impl DerefMut for Name {
    fn deref_mut(&mut self) -> &mut Row {
        &mut self.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_prefix_round_trips() {
        let stored = scoped_value(Some(Guid(42)), "readme");
        assert_eq!(stored, "42:readme");
        assert_eq!(strip_scope(Some(Guid(42)), &stored), "readme");
        assert_eq!(strip_scope(None, &stored), "42:readme");
        assert_eq!(scoped_value(None, "readme"), "readme");
    }
}
