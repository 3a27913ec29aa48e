//! Consumed row-store interface.
//!
//! The row store is an external collaborator: durability, sharding, indexing
//! and search live behind [`RowStore`]. Everything above this module talks to
//! it only through these primitives, each of which is one network round trip.

use async_trait::async_trait;

use crate::error::{Result, RowGraphError};
use crate::types::{Context, Guid, RowKey, RowKind, Value};

mod memory;

pub use memory::MemoryStore;

/// One row as the store returns it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRow {
    /// Store identity.
    pub key: RowKey,
    /// Row context.
    pub ctx: Context,
    /// Persisted payload.
    pub value: Value,
    /// Persisted flags word.
    pub flags: u16,
    /// Parent of a node row; `None` for other kinds and for root nodes.
    pub parent: Option<Guid>,
}

/// Row to insert.
#[derive(Clone, Debug)]
pub struct NewRow {
    /// Kind of row; decides which of `base` / `rel` are required.
    pub kind: RowKind,
    /// Row context.
    pub ctx: Context,
    /// Parent of a node, or owner of any other kind.
    pub base: Option<Guid>,
    /// Related side of an edge.
    pub rel: Option<Guid>,
    /// Initial payload. Alias and name rows carry their string here.
    pub value: Value,
    /// Initial flags word.
    pub flags: u16,
}

/// Result of [`RowStore::create`].
#[derive(Clone, Debug, PartialEq)]
pub enum CreateOutcome {
    /// Row inserted.
    Created(RawRow),
    /// A row with the same key already exists; nothing was written.
    Exists,
    /// A unique value is held by a different owner; nothing was written.
    Conflict,
}

/// Precondition of [`RowStore::update`].
#[derive(Clone, Debug, PartialEq)]
pub enum Expect {
    /// Write only if the stored value equals this one.
    Value(Value),
    /// Write unconditionally.
    Any,
}

/// Result of [`RowStore::update`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateOutcome {
    /// New value stored.
    Updated,
    /// Stored value differs from the expected one; nothing was written.
    Stale,
    /// Key does not exist.
    NotFound,
    /// New value collides with a unique value held elsewhere.
    Conflict,
}

/// Result of [`RowStore::increment`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Increment {
    /// Value after the increment.
    Value(i64),
    /// The increment would pass the limit; nothing was written.
    AtLimit,
    /// Key does not exist.
    NotFound,
}

/// Which of an owner's ordered lists a listing or shift addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dir {
    /// Rows the owner is the base of (children, props, lookups, outgoing edges).
    Out,
    /// Edges the owner is the related side of.
    In,
    /// Outgoing then incoming edges, each edge once.
    Both,
}

impl Dir {
    /// Direction for an edge accessor declared with `forward`.
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Dir::Out
        } else {
            Dir::In
        }
    }

    /// Short lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Dir::Out => "out",
            Dir::In => "in",
            Dir::Both => "both",
        }
    }
}

/// Selects one ordered list of an owner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ListQuery {
    /// Kind of rows in the list.
    pub kind: RowKind,
    /// Owning row.
    pub owner: Guid,
    /// Context of the listed rows.
    pub ctx: Context,
    /// Side of the owner; only edges use anything but [`Dir::Out`].
    pub dir: Dir,
}

/// One page of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    /// Items in list order.
    pub items: Vec<T>,
    /// Offset the following page starts at.
    pub next: u64,
}

/// Name search strategy; implemented by the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SearchMode {
    /// Values starting with the query.
    Prefix,
    /// Values that sound like the query.
    Phonetic,
}

/// Primitives of the sharded row store.
///
/// Implementations must be safe to share; every method is a suspension point.
#[async_trait]
pub trait RowStore: Send + Sync + 'static {
    /// Inserts a row.
    async fn create(&self, row: NewRow) -> Result<CreateOutcome>;

    /// Fetches one row.
    async fn get(&self, key: &RowKey, ctx: Context) -> Result<Option<RawRow>>;

    /// Fetches node rows in one call, aligned with `ids`.
    async fn batch_get(&self, ids: &[(Guid, Context)]) -> Result<Vec<Option<RawRow>>>;

    /// Reads up to `limit` rows of one list starting at offset `start`.
    async fn list(&self, query: ListQuery, start: u64, limit: usize) -> Result<Page<RawRow>>;

    /// Replaces a row's value, optionally only if it still equals `expect`.
    async fn update(
        &self,
        key: &RowKey,
        ctx: Context,
        value: &Value,
        expect: Expect,
    ) -> Result<UpdateOutcome>;

    /// Sets `add` bits and clears `clear` bits of a row's flags word,
    /// returning the merged word.
    async fn set_flags(
        &self,
        key: &RowKey,
        ctx: Context,
        add: &[u8],
        clear: &[u8],
    ) -> Result<Option<u16>>;

    /// Adds `by` to an integer row, refusing to pass `limit`.
    async fn increment(
        &self,
        key: &RowKey,
        ctx: Context,
        by: i64,
        limit: Option<i64>,
    ) -> Result<Increment>;

    /// Moves a row to `index` within the owner's list on side `dir`.
    async fn shift(&self, key: &RowKey, ctx: Context, dir: Dir, index: usize) -> Result<bool>;

    /// Deletes a row. Returns false if it did not exist.
    async fn remove(&self, key: &RowKey, ctx: Context) -> Result<bool>;

    /// Reparents a node.
    async fn move_node(
        &self,
        id: Guid,
        ctx: Context,
        from: Option<Guid>,
        to: Guid,
    ) -> Result<bool>;

    /// Resolves a unique alias value to its row.
    async fn lookup_alias(&self, ctx: Context, value: &str) -> Result<Option<RawRow>>;

    /// Searches name rows.
    async fn search_names(
        &self,
        _ctx: Context,
        _query: &str,
        _mode: SearchMode,
        _start: u64,
        _limit: usize,
    ) -> Result<Page<RawRow>> {
        Err(RowGraphError::Unsupported("name search"))
    }
}
