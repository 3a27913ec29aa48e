use std::time::Duration;

use thiserror::Error;

use crate::types::{Context, RowKey};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RowGraphError>;

/// Errors surfaced by the flag codec, the update protocol and traversal.
#[derive(Debug, Error)]
pub enum RowGraphError {
    /// A layout ran out of room in the 16-bit flags word.
    #[error("flag layout overflow: field `{field}` needs {width} bits at offset {offset}, word holds 16")]
    LayoutOverflow {
        /// Field that failed to fit.
        field: String,
        /// Width requested by the field.
        width: u8,
        /// Next free bit at the time of the request.
        offset: u8,
    },
    /// A frozen layout was asked to take another field.
    #[error("flag layout is frozen; cannot add field `{0}`")]
    LayoutFrozen(String),
    /// The layout has no field with this name.
    #[error("unknown flag field `{0}`")]
    UnknownField(String),
    /// The value kind does not match the field kind.
    #[error("flag field `{field}` is {expected}, got {got}")]
    FlagKindMismatch {
        /// Field name.
        field: String,
        /// Declared kind of the field.
        expected: &'static str,
        /// Kind of the value supplied.
        got: &'static str,
    },
    /// An enum token that the field does not declare.
    #[error("`{value}` is not a declared value of enum field `{field}` (declared: {declared:?})")]
    UnknownEnumValue {
        /// Field name.
        field: String,
        /// Offending token.
        value: String,
        /// Tokens the field accepts.
        declared: Vec<String>,
    },
    /// Stored bits decode to an enum index past the declared values.
    #[error("enum field `{field}` holds index {index}, only {len} values declared")]
    UnknownEnumIndex {
        /// Field name.
        field: String,
        /// Decoded index.
        index: u16,
        /// Number of declared values.
        len: usize,
    },
    /// An integer flag value larger than the field's maximum.
    #[error("{value} exceeds the maximum {max} of flag field `{field}`")]
    FlagOverflow {
        /// Field name.
        field: String,
        /// Value that was rejected.
        value: u64,
        /// Maximum value of the field.
        max: u16,
    },
    /// The stored value changed since this row was read.
    #[error("stale row {key} in context {ctx}: stored value no longer matches; refetch or force the write")]
    StaleRow {
        /// Row identity.
        key: RowKey,
        /// Row context.
        ctx: Context,
    },
    /// The row no longer exists in the store.
    #[error("row {key} in context {ctx} not found")]
    RowNotFound {
        /// Row identity.
        key: RowKey,
        /// Row context.
        ctx: Context,
    },
    /// `increment` on a row whose value kind is not an integer.
    #[error("context {0} does not hold integer values; increment is reserved for int rows")]
    NotNumeric(Context),
    /// A store call outlived its deadline.
    #[error("store call `{op}` timed out after {after:?}")]
    Timeout {
        /// Store primitive that timed out.
        op: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// A lock could not be taken before its deadline.
    #[error("lock {key} in context {ctx} not acquired within {after:?}")]
    LockTimeout {
        /// Lock row identity.
        key: RowKey,
        /// Lock context.
        ctx: Context,
        /// How long acquisition was attempted.
        after: Duration,
    },
    /// An alias value already belongs to another owner.
    #[error("alias `{value}` in context {ctx} is held by another row")]
    AliasInUse {
        /// Alias context.
        ctx: Context,
        /// Alias value.
        value: String,
    },
    /// A forward type reference was never resolved.
    #[error("type `{0}` was referenced but never declared")]
    UnresolvedType(String),
    /// Two types were declared under the same name.
    #[error("type `{0}` declared twice")]
    DuplicateType(String),
    /// A caller-supplied argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The store does not offer this capability.
    #[error("unsupported by store: {0}")]
    Unsupported(&'static str),
    /// Transport or collaborator failure, propagated unchanged.
    #[error("store error: {0}")]
    Store(String),
}

impl RowGraphError {
    /// Whether the caller may recover by refetching and retrying.
    pub fn is_stale(&self) -> bool {
        matches!(self, RowGraphError::StaleRow { .. })
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RowGraphError::InvalidArgument(msg.into())
    }
}
