//! Packed bit-field flags.
//!
//! Every row carries a 16-bit flags word. A [`BitLayout`] packs typed
//! sub-fields ([`FieldSchema`]) into that word, and a [`FlagSet`] decodes and
//! mutates one row's word while tracking which bits need persisting, so saves
//! send only an add/clear delta instead of the whole word.

mod field;
mod layout;
mod set;

pub use field::{FieldKind, FieldSchema, FlagValue, MAX_FIELD_BITS};
pub use layout::{BitLayout, EnumValues, FieldSlot, FLAGS_WORD_BITS};
pub use set::{BitList, FlagDiff, FlagSet};
