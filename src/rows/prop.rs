use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::schema::PropType;
use crate::store::{CreateOutcome, NewRow};
use crate::types::{Guid, RowKey, RowKind, Value, ValueKind};

use super::Row;

/// The single property row of one owner in one context.
#[derive(Clone, Debug)]
pub struct Prop {
    owner: Guid,
    row: Row,
}

impl Prop {
    /// Unsaved property at the type's default value and flags.
    ///
    /// The first [`Row::save`] creates it; a concurrent creation makes that
    /// save fail as stale unless forced.
    pub fn new(ty: &PropType, owner: Guid) -> Self {
        Self {
            owner,
            row: Row::unsaved(RowKey::Prop { base: owner }, ty.def()),
        }
    }

    /// Fetches the property of `owner`, or an unsaved default if none exists.
    pub async fn get(db: &Db, ty: &PropType, owner: Guid) -> Result<Prop> {
        let key = RowKey::Prop { base: owner };
        Ok(match db.store_get(&key, ty.ctx()).await? {
            Some(raw) => Self {
                owner,
                row: Row::hydrate(raw, ty.def()),
            },
            None => Self::new(ty, owner),
        })
    }

    /// Owning node.
    pub fn owner(&self) -> Guid {
        self.owner
    }

    pub(crate) async fn ensure_created(&mut self, db: &Db) -> Result<()> {
        if self.row.is_persisted() {
            return Ok(());
        }
        let row = NewRow {
            kind: RowKind::Prop,
            ctx: self.row.ctx(),
            base: Some(self.owner),
            rel: None,
            value: self.row.value().clone(),
            flags: self.row.flags().raw(),
        };
        match db.store_create(row).await? {
            CreateOutcome::Created(_) | CreateOutcome::Exists => self.row.refresh(db).await,
            CreateOutcome::Conflict => Err(RowGraphError::Store(format!(
                "property create for {} reported a conflict",
                self.owner
            ))),
        }
    }
}

impl Deref for Prop {
    type Target = Row;

    fn deref(&self) -> &Row {
        &self.row
    }
}

impl DerefMut for Prop {
    fn deref_mut(&mut self) -> &mut Row {
        &mut self.row
    }
}

/// Integer property used as a mutex: 1 while held, 0 while free.
#[derive(Clone, Debug)]
pub struct Lock {
    prop: Prop,
    held: bool,
}

impl Lock {
    /// Lock on `owner` stored in integer property type `ty`.
    pub fn new(ty: &PropType, owner: Guid) -> Result<Self> {
        if ty.value_kind() != ValueKind::Int {
            return Err(RowGraphError::NotNumeric(ty.ctx()));
        }
        Ok(Self {
            prop: Prop::new(ty, owner),
            held: false,
        })
    }

    /// Whether this handle acquired the lock and has not released it.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Polls until the lock is taken or `timeout` passes.
    pub async fn acquire(&mut self, db: &Db, timeout: Duration, retry_after: Duration) -> Result<()> {
        self.prop.ensure_created(db).await?;
        let started = Instant::now();
        loop {
            if self.prop.increment(db, 1, Some(1)).await?.is_some() {
                debug!(owner = %self.prop.owner(), ctx = %self.prop.ctx(), "lock.acquired");
                self.held = true;
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(RowGraphError::LockTimeout {
                    key: self.prop.key().clone(),
                    ctx: self.prop.ctx(),
                    after: timeout,
                });
            }
            tokio::time::sleep(retry_after.min(timeout - elapsed)).await;
        }
    }

    /// Frees the lock unconditionally.
    pub async fn release(&mut self, db: &Db) -> Result<()> {
        self.prop.set_value(Value::Int(0))?;
        self.prop.save_value(db, true).await?;
        self.held = false;
        debug!(owner = %self.prop.owner(), ctx = %self.prop.ctx(), "lock.released");
        Ok(())
    }
}
