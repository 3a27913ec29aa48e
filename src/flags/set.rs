use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::types::{Context, RowKey};

use super::field::{FieldKind, FlagValue};
use super::layout::{BitLayout, FLAGS_WORD_BITS};

/// Bit positions (0-based, least significant first) to set and clear.
pub type BitList = SmallVec<[u8; 16]>;

/// Minimal delta a dirty [`FlagSet`] sends to the store.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlagDiff {
    /// Dirty bits that are currently 1.
    pub add: BitList,
    /// Dirty bits that are currently 0.
    pub clear: BitList,
}

impl FlagDiff {
    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.clear.is_empty()
    }
}

/// Flags word of one row decoded against its layout.
///
/// Mutation is local: `set` only touches `raw` and the dirty mask, and the
/// store sees the change once [`FlagSet::save`] (or the owning row's
/// `save_flags`) runs.
#[derive(Clone)]
pub struct FlagSet {
    layout: Arc<BitLayout>,
    raw: u16,
    dirty: u16,
}

impl FlagSet {
    /// Flag set holding the layout defaults, with nothing dirty.
    pub fn new(layout: Arc<BitLayout>) -> Self {
        let raw = layout.default_word();
        Self {
            layout,
            raw,
            dirty: 0,
        }
    }

    /// Flag set mirroring a persisted word.
    pub fn from_raw(layout: Arc<BitLayout>, raw: u16) -> Self {
        Self {
            layout,
            raw,
            dirty: 0,
        }
    }

    /// Layout the word is decoded against.
    pub fn layout(&self) -> &Arc<BitLayout> {
        &self.layout
    }

    /// Current word, including unsaved changes.
    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// Bits touched since the last successful save.
    pub fn dirty_mask(&self) -> u16 {
        self.dirty
    }

    /// Whether any bit awaits saving.
    pub fn is_dirty(&self) -> bool {
        self.dirty != 0
    }

    /// Decodes field `name`.
    pub fn get(&self, name: &str) -> Result<FlagValue> {
        let slot = self.layout.field(name)?;
        slot.schema().decode(name, slot.extract(self.raw))
    }

    /// Decodes a bool field.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            FlagValue::Bool(v) => Ok(v),
            other => Err(self.mismatch(name, FieldKind::Bool, &other)),
        }
    }

    /// Decodes an int field.
    pub fn get_int(&self, name: &str) -> Result<u16> {
        match self.get(name)? {
            FlagValue::Int(v) => Ok(v),
            other => Err(self.mismatch(name, FieldKind::Int, &other)),
        }
    }

    /// Decodes an enum field, borrowing the token from the layout.
    pub fn get_enum(&self, name: &str) -> Result<&str> {
        let slot = self.layout.field(name)?;
        let schema = slot.schema();
        if schema.kind() != FieldKind::Enum {
            return Err(RowGraphError::FlagKindMismatch {
                field: name.to_owned(),
                expected: FieldKind::Enum.as_str(),
                got: schema.kind().as_str(),
            });
        }
        let index = slot.extract(self.raw);
        schema
            .enum_values()
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| RowGraphError::UnknownEnumIndex {
                field: name.to_owned(),
                index,
                len: schema.enum_values().len(),
            })
    }

    /// Encodes `value` into field `name` and marks the field's bits dirty.
    ///
    /// On error nothing changes.
    pub fn set(&mut self, name: &str, value: impl Into<FlagValue>) -> Result<()> {
        let slot = self.layout.field(name)?;
        let encoded = slot.schema().encode(name, &value.into())?;
        let mask = slot.word_mask();
        self.raw = (self.raw & !mask) | ((encoded << slot.offset()) & mask);
        self.dirty |= mask;
        Ok(())
    }

    /// Splits the dirty bits into add/clear lists by their current value.
    ///
    /// Pure: repeated calls without an intervening `set` return the same diff.
    pub fn diff(&self) -> FlagDiff {
        let mut diff = FlagDiff::default();
        for bit in 0..FLAGS_WORD_BITS {
            let probe = 1u16 << bit;
            if self.dirty & probe == 0 {
                continue;
            }
            if self.raw & probe != 0 {
                diff.add.push(bit);
            } else {
                diff.clear.push(bit);
            }
        }
        diff
    }

    /// Marks every declared bit dirty so the next save writes the whole layout.
    pub fn touch_all(&mut self) {
        self.dirty |= self.layout.used_mask();
    }

    /// Sends the pending delta for row `key` and clears the dirty mask.
    ///
    /// A clean set makes no store call. On failure the dirty mask is kept so
    /// the save can be retried.
    pub async fn save(&mut self, db: &Db, key: &RowKey, ctx: Context) -> Result<()> {
        if self.dirty == 0 {
            return Ok(());
        }
        let diff = self.diff();
        match db.store_set_flags(key, ctx, &diff.add, &diff.clear).await? {
            Some(word) => {
                debug!(
                    ctx = %ctx,
                    key = %key,
                    add = ?diff.add.as_slice(),
                    clear = ?diff.clear.as_slice(),
                    word,
                    "flags.save.applied"
                );
                self.raw = word;
                self.dirty = 0;
                db.metrics().flags_saved();
                Ok(())
            }
            None => Err(RowGraphError::RowNotFound {
                key: key.clone(),
                ctx,
            }),
        }
    }

    fn mismatch(&self, name: &str, expected: FieldKind, got: &FlagValue) -> RowGraphError {
        RowGraphError::FlagKindMismatch {
            field: name.to_owned(),
            expected: expected.as_str(),
            got: match got {
                FlagValue::Bool(_) => "bool",
                FlagValue::Int(_) => "int",
                FlagValue::Enum(_) => "enum",
            },
        }
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for slot in self.layout.fields() {
            match slot.schema().decode(slot.name(), slot.extract(self.raw)) {
                Ok(value) => map.entry(&slot.name(), &value),
                Err(_) => map.entry(&slot.name(), &"<invalid>"),
            };
        }
        map.finish()?;
        write!(f, " raw={:#06x} dirty={:#06x}", self.raw, self.dirty)
    }
}
