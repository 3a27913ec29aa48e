use std::fmt;

use crate::error::{Result, RowGraphError};

/// Largest width a single field may declare.
pub const MAX_FIELD_BITS: u8 = 16;

/// Kind of a packed flag field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FieldKind {
    /// Single bit, decoded as a boolean.
    Bool,
    /// Unsigned integer bounded by `max_value`.
    Int,
    /// Index into a declared list of string tokens.
    Enum,
}

impl FieldKind {
    /// Short lowercase label used in errors.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Enum => "enum",
        }
    }
}

/// Decoded value of one flag field.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FlagValue {
    /// Value of a [`FieldKind::Bool`] field.
    Bool(bool),
    /// Value of a [`FieldKind::Int`] field.
    Int(u16),
    /// Token of a [`FieldKind::Enum`] field.
    Enum(String),
}

impl FlagValue {
    fn kind_str(&self) -> &'static str {
        match self {
            FlagValue::Bool(_) => "bool",
            FlagValue::Int(_) => "int",
            FlagValue::Enum(_) => "enum",
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(v) => write!(f, "{v}"),
            FlagValue::Int(v) => write!(f, "{v}"),
            FlagValue::Enum(v) => f.write_str(v),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<u16> for FlagValue {
    fn from(value: u16) -> Self {
        FlagValue::Int(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Enum(value.to_owned())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Enum(value)
    }
}

/// Declarative description of one packed sub-field.
///
/// Widths follow the field's range: `ceil(log2(max_value + 1))` for ints,
/// `ceil(log2(len(enum_values)))` for enums and a single bit for bools.
/// Immutable once constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldSchema {
    kind: FieldKind,
    bit_width: u8,
    max_value: u16,
    enum_values: Vec<String>,
    default: u16,
}

fn bit_len(n: u32) -> u8 {
    (u32::BITS - n.leading_zeros()) as u8
}

impl FieldSchema {
    /// One-bit boolean field.
    pub fn bool(default: bool) -> Self {
        Self {
            kind: FieldKind::Bool,
            bit_width: 1,
            max_value: 1,
            enum_values: Vec::new(),
            default: default as u16,
        }
    }

    /// Integer field holding `0..=max_value`, defaulting to zero.
    pub fn int(max_value: u16) -> Self {
        Self {
            kind: FieldKind::Int,
            bit_width: bit_len(max_value as u32),
            max_value,
            enum_values: Vec::new(),
            default: 0,
        }
    }

    /// Integer field spanning exactly `bits` bits.
    pub fn int_bits(bits: u8) -> Result<Self> {
        if bits == 0 || bits > MAX_FIELD_BITS {
            return Err(RowGraphError::invalid(format!(
                "int flag width must be 1..={MAX_FIELD_BITS} bits, got {bits}"
            )));
        }
        let max_value = if bits == MAX_FIELD_BITS {
            u16::MAX
        } else {
            (1u16 << bits) - 1
        };
        Ok(Self::int(max_value))
    }

    /// Enumerated field over distinct, non-empty tokens. Defaults to the first token.
    pub fn enumeration<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let enum_values: Vec<String> = values.into_iter().map(Into::into).collect();
        if enum_values.is_empty() {
            return Err(RowGraphError::invalid("enum flag needs at least one value"));
        }
        if enum_values.len() > 1 << MAX_FIELD_BITS {
            return Err(RowGraphError::invalid("enum flag declares too many values"));
        }
        for (i, value) in enum_values.iter().enumerate() {
            if value.is_empty() {
                return Err(RowGraphError::invalid("enum flag values must be non-empty"));
            }
            if enum_values[..i].contains(value) {
                return Err(RowGraphError::invalid(format!(
                    "enum flag value `{value}` declared twice"
                )));
            }
        }
        let max_value = (enum_values.len() - 1) as u16;
        Ok(Self {
            kind: FieldKind::Enum,
            bit_width: bit_len(max_value as u32),
            max_value,
            enum_values,
            default: 0,
        })
    }

    /// Replaces the default with `value`, validated like a `set`.
    pub fn with_default(mut self, value: impl Into<FlagValue>) -> Result<Self> {
        self.default = self.encode("<default>", &value.into())?;
        Ok(self)
    }

    /// Field kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Number of bits the field occupies.
    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    /// Largest encoded value the field accepts.
    pub fn max_value(&self) -> u16 {
        self.max_value
    }

    /// Declared tokens of an enum field; empty for other kinds.
    pub fn enum_values(&self) -> &[String] {
        &self.enum_values
    }

    /// Default, already encoded and unshifted.
    pub fn default_encoded(&self) -> u16 {
        self.default
    }

    /// Field-relative mask covering `bit_width` low bits.
    pub fn mask(&self) -> u16 {
        match self.bit_width {
            0 => 0,
            w if w >= MAX_FIELD_BITS => u16::MAX,
            w => (1u16 << w) - 1,
        }
    }

    /// Encodes `value` into the field-relative (unshifted) integer.
    pub fn encode(&self, field: &str, value: &FlagValue) -> Result<u16> {
        match (self.kind, value) {
            (FieldKind::Bool, FlagValue::Bool(v)) => Ok(*v as u16),
            (FieldKind::Int, FlagValue::Int(v)) => {
                if *v > self.max_value {
                    return Err(RowGraphError::FlagOverflow {
                        field: field.to_owned(),
                        value: *v as u64,
                        max: self.max_value,
                    });
                }
                Ok(*v)
            }
            (FieldKind::Enum, FlagValue::Enum(token)) => self
                .enum_values
                .iter()
                .position(|candidate| candidate == token)
                .map(|idx| idx as u16)
                .ok_or_else(|| RowGraphError::UnknownEnumValue {
                    field: field.to_owned(),
                    value: token.clone(),
                    declared: self.enum_values.clone(),
                }),
            (kind, other) => Err(RowGraphError::FlagKindMismatch {
                field: field.to_owned(),
                expected: kind.as_str(),
                got: other.kind_str(),
            }),
        }
    }

    /// Decodes a field-relative (unshifted) integer.
    pub fn decode(&self, field: &str, encoded: u16) -> Result<FlagValue> {
        let encoded = encoded & self.mask();
        match self.kind {
            FieldKind::Bool => Ok(FlagValue::Bool(encoded != 0)),
            FieldKind::Int => Ok(FlagValue::Int(encoded)),
            FieldKind::Enum => self
                .enum_values
                .get(encoded as usize)
                .map(|token| FlagValue::Enum(token.clone()))
                .ok_or_else(|| RowGraphError::UnknownEnumIndex {
                    field: field.to_owned(),
                    index: encoded,
                    len: self.enum_values.len(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_declared_range() {
        assert_eq!(FieldSchema::bool(false).bit_width(), 1);
        assert_eq!(FieldSchema::int(0).bit_width(), 0);
        assert_eq!(FieldSchema::int(1).bit_width(), 1);
        assert_eq!(FieldSchema::int(5).bit_width(), 3);
        assert_eq!(FieldSchema::int(7).bit_width(), 3);
        assert_eq!(FieldSchema::int(8).bit_width(), 4);
        assert_eq!(FieldSchema::int(u16::MAX).bit_width(), 16);
        assert_eq!(FieldSchema::int_bits(4).unwrap().max_value(), 15);
        assert_eq!(FieldSchema::int_bits(16).unwrap().max_value(), u16::MAX);
        assert_eq!(FieldSchema::enumeration(["a"]).unwrap().bit_width(), 0);
        assert_eq!(FieldSchema::enumeration(["a", "b"]).unwrap().bit_width(), 1);
        assert_eq!(FieldSchema::enumeration(["a", "b", "c"]).unwrap().bit_width(), 2);
        assert_eq!(
            FieldSchema::enumeration(["a", "b", "c", "d"]).unwrap().bit_width(),
            2
        );
        assert_eq!(
            FieldSchema::enumeration(["a", "b", "c", "d", "e"])
                .unwrap()
                .bit_width(),
            3
        );
    }

    #[test]
    fn enum_declaration_is_validated() {
        assert!(FieldSchema::enumeration(Vec::<String>::new()).is_err());
        assert!(FieldSchema::enumeration(["a", "a"]).is_err());
        assert!(FieldSchema::enumeration(["a", ""]).is_err());
        assert!(FieldSchema::int_bits(0).is_err());
        assert!(FieldSchema::int_bits(17).is_err());
    }

    #[test]
    fn int_overflow_checks_unshifted_value() {
        let field = FieldSchema::int(5);
        assert_eq!(field.encode("n", &FlagValue::Int(5)).unwrap(), 5);
        let err = field.encode("n", &FlagValue::Int(6)).unwrap_err();
        assert!(matches!(err, RowGraphError::FlagOverflow { max: 5, .. }));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let field = FieldSchema::bool(false);
        let err = field.encode("b", &FlagValue::Int(1)).unwrap_err();
        assert!(matches!(err, RowGraphError::FlagKindMismatch { .. }));
    }

    #[test]
    fn defaults_are_encoded_and_validated() {
        let field = FieldSchema::enumeration(["new", "sent", "done"])
            .unwrap()
            .with_default("sent")
            .unwrap();
        assert_eq!(field.default_encoded(), 1);
        assert!(FieldSchema::int(3).with_default(4u16).is_err());
        assert_eq!(FieldSchema::bool(true).default_encoded(), 1);
    }

    #[test]
    fn enum_index_past_declared_range_fails_decode() {
        let field = FieldSchema::enumeration(["a", "b", "c"]).unwrap();
        let err = field.decode("e", 3).unwrap_err();
        assert!(matches!(err, RowGraphError::UnknownEnumIndex { index: 3, len: 3, .. }));
    }
}
