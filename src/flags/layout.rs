use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Result, RowGraphError};

use super::field::{FieldKind, FieldSchema, FlagValue};
use super::set::FlagSet;

/// Width of the per-row flags word.
pub const FLAGS_WORD_BITS: u8 = 16;

/// A field placed at a fixed offset inside the flags word.
#[derive(Clone, Debug)]
pub struct FieldSlot {
    name: String,
    schema: FieldSchema,
    offset: u8,
}

impl FieldSlot {
    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema.
    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// First bit of the field.
    pub fn offset(&self) -> u8 {
        self.offset
    }

    /// Mask of the field's bits in word position.
    pub fn word_mask(&self) -> u16 {
        self.schema.mask() << self.offset
    }

    pub(crate) fn extract(&self, word: u16) -> u16 {
        (word >> self.offset) & self.schema.mask()
    }
}

/// Ordered, non-overlapping allocation of fields inside one flags word.
///
/// Fields are packed contiguously in declaration order. Once frozen the
/// layout is shared behind an [`Arc`] and never changes again.
#[derive(Clone, Debug, Default)]
pub struct BitLayout {
    slots: Vec<FieldSlot>,
    index: FxHashMap<String, usize>,
    next_free_bit: u8,
    frozen: bool,
}

impl BitLayout {
    /// Creates an empty, unfrozen layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `schema` at the next free bit.
    ///
    /// Fails without modifying the layout when the word is full, the name is
    /// taken, or the layout is frozen.
    pub fn allocate(&mut self, name: impl Into<String>, schema: FieldSchema) -> Result<()> {
        let name = name.into();
        if self.frozen {
            return Err(RowGraphError::LayoutFrozen(name));
        }
        if self.index.contains_key(&name) {
            return Err(RowGraphError::invalid(format!(
                "flag field `{name}` declared twice"
            )));
        }
        let width = schema.bit_width();
        if self.next_free_bit as u16 + width as u16 > FLAGS_WORD_BITS as u16 {
            return Err(RowGraphError::LayoutOverflow {
                field: name,
                width,
                offset: self.next_free_bit,
            });
        }
        let offset = self.next_free_bit;
        trace!(field = %name, offset, width, "flags.layout.allocate");
        self.index.insert(name.clone(), self.slots.len());
        self.slots.push(FieldSlot {
            name,
            schema,
            offset,
        });
        self.next_free_bit += width;
        Ok(())
    }

    /// Stops further allocation. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether [`BitLayout::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of bits allocated so far.
    pub fn bits_used(&self) -> u8 {
        self.next_free_bit
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fields in allocation order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSlot> {
        self.slots.iter()
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Result<&FieldSlot> {
        self.index
            .get(name)
            .map(|&idx| &self.slots[idx])
            .ok_or_else(|| RowGraphError::UnknownField(name.to_owned()))
    }

    /// Union of every field's bits.
    pub fn used_mask(&self) -> u16 {
        self.slots.iter().fold(0, |acc, slot| acc | slot.word_mask())
    }

    /// Word with every field at its declared default.
    pub fn default_word(&self) -> u16 {
        self.slots.iter().fold(0, |acc, slot| {
            acc | ((slot.schema.default_encoded() & slot.schema.mask()) << slot.offset)
        })
    }

    /// Read-only projection of an enum field's tokens.
    pub fn enum_values(&self, name: &str) -> Result<EnumValues<'_>> {
        let slot = self.field(name)?;
        if slot.schema.kind() != FieldKind::Enum {
            return Err(RowGraphError::FlagKindMismatch {
                field: name.to_owned(),
                expected: FieldKind::Enum.as_str(),
                got: slot.schema.kind().as_str(),
            });
        }
        Ok(EnumValues {
            field: slot.name(),
            values: slot.schema.enum_values(),
        })
    }

    /// Detached flag set holding the defaults, for passing to row creation.
    pub fn flags(self: &Arc<Self>) -> FlagSet {
        FlagSet::new(Arc::clone(self))
    }

    /// Detached flag set with `values` applied over the defaults.
    pub fn preset<'a, I, V>(self: &Arc<Self>, values: I) -> Result<FlagSet>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<FlagValue>,
    {
        let mut flags = self.flags();
        for (name, value) in values {
            flags.set(name, value)?;
        }
        Ok(flags)
    }
}

/// Legal tokens of one enum field, so callers can name values without
/// repeating string literals.
#[derive(Copy, Clone, Debug)]
pub struct EnumValues<'a> {
    field: &'a str,
    values: &'a [String],
}

impl<'a> EnumValues<'a> {
    /// Returns the declared token equal to `token`.
    pub fn token(&self, token: &str) -> Result<&'a str> {
        self.values
            .iter()
            .find(|candidate| candidate.as_str() == token)
            .map(String::as_str)
            .ok_or_else(|| RowGraphError::UnknownEnumValue {
                field: self.field.to_owned(),
                value: token.to_owned(),
                declared: self.values.to_vec(),
            })
    }

    /// Position of `token` in declaration order.
    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.values.iter().position(|candidate| candidate == token)
    }

    /// Tokens in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &'a str> {
        self.values.iter().map(String::as_str)
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; enum fields declare at least one token.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_contiguous_in_allocation_order() {
        let mut layout = BitLayout::new();
        layout.allocate("count", FieldSchema::int(5)).unwrap();
        layout.allocate("seen", FieldSchema::bool(false)).unwrap();
        layout
            .allocate("role", FieldSchema::enumeration(["a", "b", "c"]).unwrap())
            .unwrap();
        let offsets: Vec<_> = layout.fields().map(|f| (f.name(), f.offset())).collect();
        assert_eq!(offsets, vec![("count", 0), ("seen", 3), ("role", 4)]);
        assert_eq!(layout.bits_used(), 6);
        assert_eq!(layout.used_mask(), 0b11_1111);
    }

    #[test]
    fn overflow_leaves_layout_unchanged() {
        let mut layout = BitLayout::new();
        layout.allocate("wide", FieldSchema::int_bits(12).unwrap()).unwrap();
        let err = layout
            .allocate("too_wide", FieldSchema::int_bits(5).unwrap())
            .unwrap_err();
        assert!(matches!(err, RowGraphError::LayoutOverflow { width: 5, offset: 12, .. }));
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.bits_used(), 12);
        assert!(layout.field("too_wide").is_err());
        layout.allocate("fits", FieldSchema::int_bits(4).unwrap()).unwrap();
        assert_eq!(layout.bits_used(), 16);
    }

    #[test]
    fn frozen_layout_rejects_fields() {
        let mut layout = BitLayout::new();
        layout.allocate("a", FieldSchema::bool(false)).unwrap();
        layout.freeze();
        layout.freeze();
        let err = layout.allocate("b", FieldSchema::bool(false)).unwrap_err();
        assert!(matches!(err, RowGraphError::LayoutFrozen(name) if name == "b"));
        assert_eq!(layout.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut layout = BitLayout::new();
        layout.allocate("a", FieldSchema::bool(false)).unwrap();
        assert!(layout.allocate("a", FieldSchema::int(3)).is_err());
        assert_eq!(layout.bits_used(), 1);
    }

    #[test]
    fn enum_projection_exposes_tokens() {
        let mut layout = BitLayout::new();
        layout
            .allocate("status", FieldSchema::enumeration(["new", "sent"]).unwrap())
            .unwrap();
        layout.allocate("flag", FieldSchema::bool(true)).unwrap();
        let status = layout.enum_values("status").unwrap();
        assert_eq!(status.token("sent").unwrap(), "sent");
        assert!(status.token("lost").is_err());
        assert_eq!(status.iter().collect::<Vec<_>>(), vec!["new", "sent"]);
        assert!(layout.enum_values("flag").is_err());
        assert_eq!(layout.default_word(), 0b10);
    }
}
