use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::flags::FlagSet;
use crate::schema::ContextDef;
use crate::store::{CreateOutcome, Dir, Expect, Increment, NewRow, RawRow, UpdateOutcome};
use crate::types::{Context, Guid, RowKey, RowKind, Value, ValueKind};

/// Where a row stands relative to its last confirmed store state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RowState {
    /// Never written; the first save creates it.
    New,
    /// Value equals the last persisted value.
    Clean,
    /// Value was changed locally and awaits a save.
    Dirty,
}

/// Generic row envelope shared by every row kind.
///
/// `old_value` is the last value the store confirmed for this row and is the
/// comparison basis of a non-forced [`Row::save`]. It is only rebound after
/// the store accepts a write.
#[derive(Clone, Debug)]
pub struct Row {
    key: RowKey,
    ctx: Context,
    kind: RowKind,
    value_kind: ValueKind,
    value: Value,
    old_value: Value,
    flags: FlagSet,
    parent: Option<Guid>,
    persisted: bool,
}

impl Row {
    pub(crate) fn hydrate(raw: RawRow, def: &ContextDef) -> Self {
        Self {
            key: raw.key,
            ctx: raw.ctx,
            kind: def.kind,
            value_kind: def.value_kind,
            old_value: raw.value.clone(),
            value: raw.value,
            flags: FlagSet::from_raw(Arc::clone(&def.layout), raw.flags),
            parent: raw.parent,
            persisted: true,
        }
    }

    pub(crate) fn unsaved(key: RowKey, def: &ContextDef) -> Self {
        let value = def.value_kind.default_value();
        Self {
            key,
            ctx: def.ctx,
            kind: def.kind,
            value_kind: def.value_kind,
            old_value: value.clone(),
            value,
            flags: def.layout.flags(),
            parent: None,
            persisted: false,
        }
    }

    /// Store identity.
    pub fn key(&self) -> &RowKey {
        &self.key
    }

    /// Row context.
    pub fn ctx(&self) -> Context {
        self.ctx
    }

    /// Row family.
    pub fn kind(&self) -> RowKind {
        self.kind
    }

    /// Current value, including unsaved changes.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Last value the store confirmed.
    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    /// Flags decoded against the context layout.
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Mutable flags; changes reach the store on [`Row::save_flags`].
    pub fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }

    pub(crate) fn parent(&self) -> Option<Guid> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Guid>) {
        self.parent = parent;
    }

    /// Whether the row exists in the store as far as this copy knows.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// New, clean or dirty.
    pub fn state(&self) -> RowState {
        if !self.persisted {
            RowState::New
        } else if self.value != self.old_value {
            RowState::Dirty
        } else {
            RowState::Clean
        }
    }

    /// Replaces the value locally. Nothing is written until a save.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if !self.value_kind.admits(&value) {
            return Err(RowGraphError::invalid(format!(
                "context {} holds {} values, got {}",
                self.ctx,
                self.value_kind.as_str(),
                value.kind().as_str()
            )));
        }
        self.value = value;
        Ok(())
    }

    /// Writes the value with a compare-and-set against `old_value`, then the
    /// flags delta.
    pub async fn save(&mut self, db: &Db) -> Result<()> {
        self.save_with(db, false).await
    }

    /// Like [`Row::save`]; `force` writes the value unconditionally.
    ///
    /// The value write and the flags write are separate store calls. If the
    /// second fails, the first has already taken effect and the flags stay
    /// dirty for a retry.
    pub async fn save_with(&mut self, db: &Db, force: bool) -> Result<()> {
        self.save_value(db, force).await?;
        self.save_flags(db).await
    }

    /// Writes only the value.
    ///
    /// An unpersisted property is created by this call. Any other unpersisted
    /// row was removed, so the save reports [`RowGraphError::RowNotFound`].
    pub async fn save_value(&mut self, db: &Db, force: bool) -> Result<()> {
        if !self.persisted {
            if !matches!(self.key, RowKey::Prop { .. }) {
                return Err(self.not_found());
            }
            return self.create_from_local(db, force).await;
        }
        let expect = if force {
            Expect::Any
        } else {
            Expect::Value(self.old_value.clone())
        };
        self.write_value(db, expect).await
    }

    async fn write_value(&mut self, db: &Db, expect: Expect) -> Result<()> {
        let force = expect == Expect::Any;
        match db.store_update(&self.key, self.ctx, &self.value, expect).await? {
            UpdateOutcome::Updated => {
                if let RowKey::Lookup { value, .. } = &mut self.key {
                    if let Some(text) = self.value.as_str() {
                        *value = text.to_owned();
                    }
                }
                self.old_value = self.value.clone();
                db.metrics().row_updated();
                debug!(ctx = %self.ctx, key = %self.key, force, "row.update.applied");
                Ok(())
            }
            UpdateOutcome::Stale => {
                db.metrics().cas_conflict();
                warn!(ctx = %self.ctx, key = %self.key, "row.update.stale");
                Err(RowGraphError::StaleRow {
                    key: self.key.clone(),
                    ctx: self.ctx,
                })
            }
            UpdateOutcome::NotFound => Err(self.not_found()),
            UpdateOutcome::Conflict => Err(RowGraphError::AliasInUse {
                ctx: self.ctx,
                value: self.value.as_str().unwrap_or_default().to_owned(),
            }),
        }
    }

    async fn create_from_local(&mut self, db: &Db, force: bool) -> Result<()> {
        let RowKey::Prop { base } = self.key else {
            return Err(RowGraphError::invalid(format!(
                "{} rows are created through their type, not by saving",
                self.kind
            )));
        };
        let row = NewRow {
            kind: self.kind,
            ctx: self.ctx,
            base: Some(base),
            rel: None,
            value: self.value.clone(),
            flags: self.flags.raw(),
        };
        match db.store_create(row).await? {
            CreateOutcome::Created(raw) => {
                self.old_value = self.value.clone();
                self.flags = FlagSet::from_raw(Arc::clone(self.flags.layout()), raw.flags);
                self.persisted = true;
                Ok(())
            }
            CreateOutcome::Exists if force => {
                self.persisted = true;
                self.write_value(db, Expect::Any).await
            }
            CreateOutcome::Exists | CreateOutcome::Conflict => {
                db.metrics().cas_conflict();
                warn!(ctx = %self.ctx, key = %self.key, "row.update.stale");
                Err(RowGraphError::StaleRow {
                    key: self.key.clone(),
                    ctx: self.ctx,
                })
            }
        }
    }

    /// Sends the pending flags delta, if any.
    pub async fn save_flags(&mut self, db: &Db) -> Result<()> {
        if !self.flags.is_dirty() {
            return Ok(());
        }
        if !self.persisted {
            return Err(self.not_found());
        }
        self.flags.save(db, &self.key, self.ctx).await
    }

    /// Re-reads value and flags, discarding local changes.
    pub async fn refresh(&mut self, db: &Db) -> Result<()> {
        let raw = db
            .store_get(&self.key, self.ctx)
            .await?
            .ok_or_else(|| self.not_found())?;
        self.old_value = raw.value.clone();
        self.value = raw.value;
        self.flags = FlagSet::from_raw(Arc::clone(self.flags.layout()), raw.flags);
        self.parent = raw.parent;
        self.persisted = true;
        Ok(())
    }

    /// Adds `by` to an integer row in the store.
    ///
    /// Returns the new value, or `None` when `limit` would be passed. A
    /// positive `by` treats `limit` as a ceiling, a negative one as a floor.
    pub async fn increment(&mut self, db: &Db, by: i64, limit: Option<i64>) -> Result<Option<i64>> {
        if self.value_kind != ValueKind::Int {
            return Err(RowGraphError::NotNumeric(self.ctx));
        }
        match db.store_increment(&self.key, self.ctx, by, limit).await? {
            Increment::Value(next) => {
                self.value = Value::Int(next);
                self.old_value = Value::Int(next);
                self.persisted = true;
                Ok(Some(next))
            }
            Increment::AtLimit => Ok(None),
            Increment::NotFound => Err(self.not_found()),
        }
    }

    /// Deletes the row. Returns false if it was already gone.
    pub async fn remove(&mut self, db: &Db) -> Result<bool> {
        let removed = db.store_remove(&self.key, self.ctx).await?;
        self.persisted = false;
        Ok(removed)
    }

    /// Moves the row to `index` within its owner's list.
    ///
    /// Costs one store call, but the store shifts every displaced sibling.
    pub(crate) async fn shift_in(&self, db: &Db, dir: Dir, index: usize) -> Result<bool> {
        db.store_shift(&self.key, self.ctx, dir, index).await
    }

    fn not_found(&self) -> RowGraphError {
        RowGraphError::RowNotFound {
            key: self.key.clone(),
            ctx: self.ctx,
        }
    }
}
