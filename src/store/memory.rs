//! In-process [`RowStore`] used by tests and embedded callers.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Result, RowGraphError};
use crate::flags::FLAGS_WORD_BITS;
use crate::types::{Context, Guid, RowKey, RowKind, Value};

use super::{
    CreateOutcome, Dir, Expect, Increment, ListQuery, NewRow, Page, RawRow, RowStore, SearchMode,
    UpdateOutcome,
};

#[derive(Clone, Debug)]
struct NodeCell {
    ctx: Context,
    value: Value,
    flags: u16,
    parent: Option<Guid>,
}

#[derive(Clone, Debug)]
struct Cell {
    value: Value,
    flags: u16,
}

#[derive(Clone, Debug)]
struct LookupCell {
    kind: RowKind,
    value: String,
    flags: u16,
}

#[derive(Default)]
struct Inner {
    next_guid: u64,
    nodes: FxHashMap<Guid, NodeCell>,
    children: FxHashMap<(Guid, Context), Vec<Guid>>,
    props: FxHashMap<(Guid, Context), Cell>,
    lookups: FxHashMap<(Guid, Context), Vec<LookupCell>>,
    aliases: FxHashMap<(Context, String), Guid>,
    edges: FxHashMap<(Context, Guid, Guid), Cell>,
    out_edges: FxHashMap<(Guid, Context), Vec<Guid>>,
    in_edges: FxHashMap<(Guid, Context), Vec<Guid>>,
    calls: FxHashMap<&'static str, u64>,
}

/// Row store kept entirely in memory behind a mutex.
///
/// Lists keep insertion order; `shift` moves entries within them. An optional
/// artificial latency is applied before every call, which lets callers
/// exercise timeouts.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency` before it touches any state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made to primitive `op` (e.g. `"list"`).
    pub fn call_count(&self, op: &str) -> u64 {
        self.inner.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Number of calls made to any primitive.
    pub fn total_calls(&self) -> u64 {
        self.inner.lock().calls.values().sum()
    }

    /// Zeroes the call counters.
    pub fn reset_calls(&self) {
        self.inner.lock().calls.clear();
    }

    async fn enter(&self, op: &'static str) {
        *self.inner.lock().calls.entry(op).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        trace!(op, "memory_store.call");
    }
}

fn require(field: Option<Guid>, what: &'static str) -> Result<Guid> {
    field.ok_or_else(|| RowGraphError::invalid(format!("new row is missing its {what}")))
}

fn require_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| RowGraphError::invalid("alias and name rows hold string values"))
}

fn check_bits(bits: &[u8]) -> Result<()> {
    match bits.iter().find(|&&bit| bit >= FLAGS_WORD_BITS) {
        Some(bit) => Err(RowGraphError::invalid(format!(
            "flag bit {bit} outside the {FLAGS_WORD_BITS}-bit word"
        ))),
        None => Ok(()),
    }
}

fn move_within<T: PartialEq>(list: &mut Vec<T>, item: &T, index: usize) -> bool {
    let Some(pos) = list.iter().position(|candidate| candidate == item) else {
        return false;
    };
    let entry = list.remove(pos);
    let index = index.min(list.len());
    list.insert(index, entry);
    true
}

fn slice_page(rows: Vec<RawRow>, start: u64, limit: usize) -> Page<RawRow> {
    let begin = (start as usize).min(rows.len());
    let items: Vec<RawRow> = rows.into_iter().skip(begin).take(limit).collect();
    let next = start + items.len() as u64;
    Page { items, next }
}

fn incremented(current: i64, by: i64, limit: Option<i64>) -> Result<Option<i64>> {
    let next = current.checked_add(by).ok_or_else(|| {
        RowGraphError::invalid(format!("incrementing {current} by {by} overflows i64"))
    })?;
    Ok(match limit {
        Some(limit) if by >= 0 && next > limit => None,
        Some(limit) if by < 0 && next < limit => None,
        _ => Some(next),
    })
}

impl Inner {
    fn node_row(&self, id: Guid, ctx: Context) -> Option<RawRow> {
        let cell = self.nodes.get(&id).filter(|cell| cell.ctx == ctx)?;
        Some(RawRow {
            key: RowKey::Node(id),
            ctx,
            value: cell.value.clone(),
            flags: cell.flags,
            parent: cell.parent,
        })
    }

    fn prop_row(&self, base: Guid, ctx: Context) -> Option<RawRow> {
        let cell = self.props.get(&(base, ctx))?;
        Some(RawRow {
            key: RowKey::Prop { base },
            ctx,
            value: cell.value.clone(),
            flags: cell.flags,
            parent: None,
        })
    }

    fn lookup_row(base: Guid, ctx: Context, cell: &LookupCell) -> RawRow {
        RawRow {
            key: RowKey::Lookup {
                base,
                value: cell.value.clone(),
            },
            ctx,
            value: Value::Str(cell.value.clone()),
            flags: cell.flags,
            parent: None,
        }
    }

    fn edge_row(&self, ctx: Context, base: Guid, rel: Guid) -> Option<RawRow> {
        let cell = self.edges.get(&(ctx, base, rel))?;
        Some(RawRow {
            key: RowKey::Edge { base, rel },
            ctx,
            value: cell.value.clone(),
            flags: cell.flags,
            parent: None,
        })
    }

    fn lookup_cell_mut(&mut self, base: Guid, ctx: Context, value: &str) -> Option<&mut LookupCell> {
        self.lookups
            .get_mut(&(base, ctx))?
            .iter_mut()
            .find(|cell| cell.value == value)
    }

    fn value_cell_mut(&mut self, key: &RowKey, ctx: Context) -> Option<(&mut Value, &mut u16)> {
        match key {
            RowKey::Node(id) => self
                .nodes
                .get_mut(id)
                .filter(|cell| cell.ctx == ctx)
                .map(|cell| (&mut cell.value, &mut cell.flags)),
            RowKey::Prop { base } => self
                .props
                .get_mut(&(*base, ctx))
                .map(|cell| (&mut cell.value, &mut cell.flags)),
            RowKey::Edge { base, rel } => self
                .edges
                .get_mut(&(ctx, *base, *rel))
                .map(|cell| (&mut cell.value, &mut cell.flags)),
            RowKey::Lookup { .. } => None,
        }
    }

    fn flags_mut(&mut self, key: &RowKey, ctx: Context) -> Option<&mut u16> {
        match key {
            RowKey::Lookup { base, value } => self
                .lookup_cell_mut(*base, ctx, value)
                .map(|cell| &mut cell.flags),
            other => self.value_cell_mut(other, ctx).map(|(_, flags)| flags),
        }
    }

    fn create(&mut self, row: NewRow) -> Result<CreateOutcome> {
        let NewRow {
            kind,
            ctx,
            base,
            rel,
            value,
            flags,
        } = row;
        match kind {
            RowKind::Node => {
                self.next_guid += 1;
                let id = Guid(self.next_guid);
                self.nodes.insert(
                    id,
                    NodeCell {
                        ctx,
                        value,
                        flags,
                        parent: base,
                    },
                );
                if let Some(parent) = base {
                    self.children.entry((parent, ctx)).or_default().push(id);
                }
                Ok(self
                    .node_row(id, ctx)
                    .map_or(CreateOutcome::Exists, CreateOutcome::Created))
            }
            RowKind::Prop => {
                let base = require(base, "owner")?;
                if self.props.contains_key(&(base, ctx)) {
                    return Ok(CreateOutcome::Exists);
                }
                self.props.insert((base, ctx), Cell { value, flags });
                Ok(self
                    .prop_row(base, ctx)
                    .map_or(CreateOutcome::Exists, CreateOutcome::Created))
            }
            RowKind::Alias | RowKind::Name => {
                let base = require(base, "owner")?;
                let text = require_str(&value)?.to_owned();
                if kind == RowKind::Alias {
                    match self.aliases.get(&(ctx, text.clone())) {
                        Some(holder) if *holder == base => return Ok(CreateOutcome::Exists),
                        Some(_) => return Ok(CreateOutcome::Conflict),
                        None => {}
                    }
                }
                if self.lookup_cell_mut(base, ctx, &text).is_some() {
                    return Ok(CreateOutcome::Exists);
                }
                if kind == RowKind::Alias {
                    self.aliases.insert((ctx, text.clone()), base);
                }
                let cell = LookupCell {
                    kind,
                    value: text,
                    flags,
                };
                let row = Self::lookup_row(base, ctx, &cell);
                self.lookups.entry((base, ctx)).or_default().push(cell);
                Ok(CreateOutcome::Created(row))
            }
            RowKind::Edge => {
                let base = require(base, "base side")?;
                let rel = require(rel, "related side")?;
                if self.edges.contains_key(&(ctx, base, rel)) {
                    return Ok(CreateOutcome::Exists);
                }
                self.edges.insert((ctx, base, rel), Cell { value, flags });
                self.out_edges.entry((base, ctx)).or_default().push(rel);
                self.in_edges.entry((rel, ctx)).or_default().push(base);
                Ok(self
                    .edge_row(ctx, base, rel)
                    .map_or(CreateOutcome::Exists, CreateOutcome::Created))
            }
        }
    }

    fn get(&self, key: &RowKey, ctx: Context) -> Option<RawRow> {
        match key {
            RowKey::Node(id) => self.node_row(*id, ctx),
            RowKey::Prop { base } => self.prop_row(*base, ctx),
            RowKey::Lookup { base, value } => self
                .lookups
                .get(&(*base, ctx))?
                .iter()
                .find(|cell| &cell.value == value)
                .map(|cell| Self::lookup_row(*base, ctx, cell)),
            RowKey::Edge { base, rel } => self.edge_row(ctx, *base, *rel),
        }
    }

    fn list(&self, query: ListQuery) -> Result<Vec<RawRow>> {
        let ListQuery {
            kind,
            owner,
            ctx,
            dir,
        } = query;
        if kind != RowKind::Edge && dir != Dir::Out {
            return Err(RowGraphError::invalid(format!(
                "{kind} rows are only listed from their owner"
            )));
        }
        let rows: Vec<RawRow> = match kind {
            RowKind::Node => self
                .children
                .get(&(owner, ctx))
                .map(|ids| ids.iter().filter_map(|id| self.node_row(*id, ctx)).collect())
                .unwrap_or_default(),
            RowKind::Prop => self.prop_row(owner, ctx).into_iter().collect(),
            RowKind::Alias | RowKind::Name => self
                .lookups
                .get(&(owner, ctx))
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| Self::lookup_row(owner, ctx, cell))
                        .collect()
                })
                .unwrap_or_default(),
            RowKind::Edge => {
                let mut rows = Vec::new();
                if matches!(dir, Dir::Out | Dir::Both) {
                    if let Some(rels) = self.out_edges.get(&(owner, ctx)) {
                        rows.extend(rels.iter().filter_map(|rel| self.edge_row(ctx, owner, *rel)));
                    }
                }
                if matches!(dir, Dir::In | Dir::Both) {
                    if let Some(bases) = self.in_edges.get(&(owner, ctx)) {
                        rows.extend(
                            bases
                                .iter()
                                // a self-loop already appeared in the outgoing half
                                .filter(|base| dir == Dir::In || **base != owner)
                                .filter_map(|base| self.edge_row(ctx, *base, owner)),
                        );
                    }
                }
                rows
            }
        };
        Ok(rows)
    }

    fn update(
        &mut self,
        key: &RowKey,
        ctx: Context,
        value: &Value,
        expect: Expect,
    ) -> Result<UpdateOutcome> {
        if let RowKey::Lookup { base, value: current } = key {
            return self.rename_lookup(*base, ctx, current, value, expect);
        }
        let Some((stored, _)) = self.value_cell_mut(key, ctx) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if let Expect::Value(expected) = &expect {
            if stored != expected {
                return Ok(UpdateOutcome::Stale);
            }
        }
        *stored = value.clone();
        Ok(UpdateOutcome::Updated)
    }

    fn rename_lookup(
        &mut self,
        base: Guid,
        ctx: Context,
        current: &str,
        value: &Value,
        expect: Expect,
    ) -> Result<UpdateOutcome> {
        let next = require_str(value)?.to_owned();
        let Some(kind) = self
            .lookup_cell_mut(base, ctx, current)
            .map(|cell| cell.kind)
        else {
            return Ok(UpdateOutcome::NotFound);
        };
        if let Expect::Value(expected) = &expect {
            if expected.as_str() != Some(current) {
                return Ok(UpdateOutcome::Stale);
            }
        }
        if next == current {
            return Ok(UpdateOutcome::Updated);
        }
        if kind == RowKind::Alias && self.aliases.contains_key(&(ctx, next.clone())) {
            return Ok(UpdateOutcome::Conflict);
        }
        if self.lookup_cell_mut(base, ctx, &next).is_some() {
            return Ok(UpdateOutcome::Conflict);
        }
        if kind == RowKind::Alias {
            self.aliases.remove(&(ctx, current.to_owned()));
            self.aliases.insert((ctx, next.clone()), base);
        }
        if let Some(cell) = self.lookup_cell_mut(base, ctx, current) {
            cell.value = next;
        }
        Ok(UpdateOutcome::Updated)
    }

    fn shift(&mut self, key: &RowKey, ctx: Context, dir: Dir, index: usize) -> Result<bool> {
        match key {
            RowKey::Node(id) => {
                let Some(parent) = self
                    .nodes
                    .get(id)
                    .filter(|cell| cell.ctx == ctx)
                    .and_then(|cell| cell.parent)
                else {
                    return Ok(false);
                };
                Ok(self
                    .children
                    .get_mut(&(parent, ctx))
                    .is_some_and(|list| move_within(list, id, index)))
            }
            RowKey::Prop { .. } => Ok(false),
            RowKey::Lookup { base, value } => {
                let Some(cells) = self.lookups.get_mut(&(*base, ctx)) else {
                    return Ok(false);
                };
                let Some(pos) = cells.iter().position(|cell| &cell.value == value) else {
                    return Ok(false);
                };
                let cell = cells.remove(pos);
                let index = index.min(cells.len());
                cells.insert(index, cell);
                Ok(true)
            }
            RowKey::Edge { base, rel } => match dir {
                Dir::Out => Ok(self
                    .out_edges
                    .get_mut(&(*base, ctx))
                    .is_some_and(|list| move_within(list, rel, index))),
                Dir::In => Ok(self
                    .in_edges
                    .get_mut(&(*rel, ctx))
                    .is_some_and(|list| move_within(list, base, index))),
                Dir::Both => Err(RowGraphError::invalid(
                    "edges are shifted within one side's list",
                )),
            },
        }
    }

    fn remove(&mut self, key: &RowKey, ctx: Context) -> bool {
        match key {
            RowKey::Node(id) => {
                let Some(cell) = self.nodes.get(id).filter(|cell| cell.ctx == ctx) else {
                    return false;
                };
                if let Some(parent) = cell.parent {
                    if let Some(list) = self.children.get_mut(&(parent, ctx)) {
                        list.retain(|child| child != id);
                    }
                }
                self.nodes.remove(id);
                true
            }
            RowKey::Prop { base } => self.props.remove(&(*base, ctx)).is_some(),
            RowKey::Lookup { base, value } => {
                let Some(cells) = self.lookups.get_mut(&(*base, ctx)) else {
                    return false;
                };
                let before = cells.len();
                cells.retain(|cell| &cell.value != value);
                let removed = cells.len() != before;
                if removed && self.aliases.get(&(ctx, value.clone())) == Some(base) {
                    self.aliases.remove(&(ctx, value.clone()));
                }
                removed
            }
            RowKey::Edge { base, rel } => {
                if self.edges.remove(&(ctx, *base, *rel)).is_none() {
                    return false;
                }
                if let Some(list) = self.out_edges.get_mut(&(*base, ctx)) {
                    list.retain(|candidate| candidate != rel);
                }
                if let Some(list) = self.in_edges.get_mut(&(*rel, ctx)) {
                    list.retain(|candidate| candidate != base);
                }
                true
            }
        }
    }

    fn move_node(&mut self, id: Guid, ctx: Context, from: Option<Guid>, to: Guid) -> bool {
        let Some(cell) = self.nodes.get_mut(&id).filter(|cell| cell.ctx == ctx) else {
            return false;
        };
        if cell.parent != from {
            return false;
        }
        cell.parent = Some(to);
        if let Some(from) = from {
            if let Some(list) = self.children.get_mut(&(from, ctx)) {
                list.retain(|child| *child != id);
            }
        }
        self.children.entry((to, ctx)).or_default().push(id);
        true
    }

    fn search_prefix(&self, ctx: Context, query: &str) -> Vec<RawRow> {
        let mut hits: Vec<(Guid, usize, RawRow)> = self
            .lookups
            .iter()
            .filter(|((_, list_ctx), _)| *list_ctx == ctx)
            .flat_map(|((base, _), cells)| {
                cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.kind == RowKind::Name && cell.value.starts_with(query))
                    .map(move |(pos, cell)| (*base, pos, Self::lookup_row(*base, ctx, cell)))
            })
            .collect();
        hits.sort_by_key(|(base, pos, _)| (*base, *pos));
        hits.into_iter().map(|(_, _, row)| row).collect()
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn create(&self, row: NewRow) -> Result<CreateOutcome> {
        self.enter("create").await;
        self.inner.lock().create(row)
    }

    async fn get(&self, key: &RowKey, ctx: Context) -> Result<Option<RawRow>> {
        self.enter("get").await;
        Ok(self.inner.lock().get(key, ctx))
    }

    async fn batch_get(&self, ids: &[(Guid, Context)]) -> Result<Vec<Option<RawRow>>> {
        self.enter("batch_get").await;
        let inner = self.inner.lock();
        Ok(ids
            .iter()
            .map(|(id, ctx)| inner.node_row(*id, *ctx))
            .collect())
    }

    async fn list(&self, query: ListQuery, start: u64, limit: usize) -> Result<Page<RawRow>> {
        self.enter("list").await;
        let rows = self.inner.lock().list(query)?;
        Ok(slice_page(rows, start, limit))
    }

    async fn update(
        &self,
        key: &RowKey,
        ctx: Context,
        value: &Value,
        expect: Expect,
    ) -> Result<UpdateOutcome> {
        self.enter("update").await;
        self.inner.lock().update(key, ctx, value, expect)
    }

    async fn set_flags(
        &self,
        key: &RowKey,
        ctx: Context,
        add: &[u8],
        clear: &[u8],
    ) -> Result<Option<u16>> {
        self.enter("set_flags").await;
        check_bits(add)?;
        check_bits(clear)?;
        let mut inner = self.inner.lock();
        let Some(word) = inner.flags_mut(key, ctx) else {
            return Ok(None);
        };
        for bit in add {
            *word |= 1 << bit;
        }
        for bit in clear {
            *word &= !(1 << bit);
        }
        Ok(Some(*word))
    }

    async fn increment(
        &self,
        key: &RowKey,
        ctx: Context,
        by: i64,
        limit: Option<i64>,
    ) -> Result<Increment> {
        self.enter("increment").await;
        let mut inner = self.inner.lock();
        if matches!(key, RowKey::Lookup { .. }) {
            return Err(RowGraphError::NotNumeric(ctx));
        }
        let Some((value, _)) = inner.value_cell_mut(key, ctx) else {
            return Ok(Increment::NotFound);
        };
        let current = value.as_int().ok_or(RowGraphError::NotNumeric(ctx))?;
        match incremented(current, by, limit)? {
            Some(next) => {
                *value = Value::Int(next);
                Ok(Increment::Value(next))
            }
            None => Ok(Increment::AtLimit),
        }
    }

    async fn shift(&self, key: &RowKey, ctx: Context, dir: Dir, index: usize) -> Result<bool> {
        self.enter("shift").await;
        self.inner.lock().shift(key, ctx, dir, index)
    }

    async fn remove(&self, key: &RowKey, ctx: Context) -> Result<bool> {
        self.enter("remove").await;
        Ok(self.inner.lock().remove(key, ctx))
    }

    async fn move_node(
        &self,
        id: Guid,
        ctx: Context,
        from: Option<Guid>,
        to: Guid,
    ) -> Result<bool> {
        self.enter("move_node").await;
        Ok(self.inner.lock().move_node(id, ctx, from, to))
    }

    async fn lookup_alias(&self, ctx: Context, value: &str) -> Result<Option<RawRow>> {
        self.enter("lookup_alias").await;
        let inner = self.inner.lock();
        let Some(base) = inner.aliases.get(&(ctx, value.to_owned())).copied() else {
            return Ok(None);
        };
        Ok(inner.get(
            &RowKey::Lookup {
                base,
                value: value.to_owned(),
            },
            ctx,
        ))
    }

    async fn search_names(
        &self,
        ctx: Context,
        query: &str,
        mode: SearchMode,
        start: u64,
        limit: usize,
    ) -> Result<Page<RawRow>> {
        self.enter("search_names").await;
        match mode {
            SearchMode::Prefix => {
                let rows = self.inner.lock().search_prefix(ctx, query);
                Ok(slice_page(rows, start, limit))
            }
            SearchMode::Phonetic => Err(RowGraphError::Unsupported("phonetic name search")),
        }
    }
}
