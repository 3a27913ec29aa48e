//! Cursor pagination and relationship traversal.
//!
//! Every listing is forward-only and fetches one page per store call;
//! joined relation listings add one batch fetch per page. Pages are read in
//! increasing offset order, but rows inserted or removed between two page
//! fetches may be skipped or seen twice.

pub mod cursor;
mod lookup;
mod relation;

pub use cursor::{Cursor, RowIter, RowPager};
pub use lookup::{Aliases, Names};
pub use relation::{EdgeMode, Relation, RelationIter, Traversed};
