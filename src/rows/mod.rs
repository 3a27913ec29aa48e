//! Row wrappers and the update protocol.
//!
//! [`Row`] carries identity, value, `old_value` and flags for every kind of
//! row; [`Node`], [`Prop`], [`Alias`], [`Name`] and [`Edge`] add the
//! identity accessors and operations specific to their kind and deref to it.

use std::sync::Arc;

use crate::error::{Result, RowGraphError};
use crate::flags::FlagSet;
use crate::schema::ContextDef;

mod edge;
mod lookup;
mod node;
mod prop;
mod row;

pub use edge::Edge;
pub use lookup::{Alias, Name};
pub use node::Node;
pub use prop::{Lock, Prop};
pub use row::{Row, RowState};

pub(crate) use lookup::{required_scope, scoped_value};

/// Raw word of `flags`, after checking it was built from `def`'s layout.
pub(crate) fn initial_flags(flags: Option<&FlagSet>, def: &ContextDef) -> Result<u16> {
    match flags {
        None => Ok(def.layout.default_word()),
        Some(flags) if Arc::ptr_eq(flags.layout(), &def.layout) => Ok(flags.raw()),
        Some(_) => Err(RowGraphError::invalid(format!(
            "flag set was not built from the layout of `{}`",
            def.name
        ))),
    }
}
