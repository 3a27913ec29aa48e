//! Handle binding a row store to a frozen schema.
//!
//! Every store primitive the row layer issues goes through one of the
//! `store_*` wrappers here, which apply the configured per-call timeout and
//! emit the `store.*` tracing events.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, RowGraphError};
use crate::schema::{ContextDef, Schema};
use crate::store::{
    CreateOutcome, Dir, Expect, Increment, ListQuery, NewRow, Page, RawRow, RowStore, SearchMode,
    UpdateOutcome,
};
use crate::traversal::Cursor;
use crate::types::{Context, Guid, RowKey, Value};

mod metrics;
mod options;

pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, RowMetrics};
pub use options::{default_config_path, ConfigError, DbOptions, DEFAULT_PAGE_SIZE};

struct DbInner {
    store: Arc<dyn RowStore>,
    schema: Arc<Schema>,
    page_size: usize,
    metrics: Arc<dyn RowMetrics>,
}

/// Shared entry point for rows and traversals.
///
/// Cloning is cheap; clones share the store, schema and metrics.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
    timeout: Option<Duration>,
}

impl Db {
    /// Binds `store` to `schema`.
    pub fn new(store: Arc<dyn RowStore>, schema: Arc<Schema>, opts: DbOptions) -> Result<Self> {
        if opts.page_size == 0 {
            return Err(RowGraphError::invalid("page_size must be at least 1"));
        }
        Ok(Self {
            inner: Arc::new(DbInner {
                store,
                schema,
                page_size: opts.page_size,
                metrics: opts.metrics.unwrap_or_else(default_metrics),
            }),
            timeout: opts.timeout,
        })
    }

    /// Frozen schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.inner.store
    }

    /// Metrics sink.
    pub fn metrics(&self) -> &dyn RowMetrics {
        self.inner.metrics.as_ref()
    }

    /// Configured listing page size.
    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    /// Per-call store timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Clone of this handle with a different per-call timeout.
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout,
        }
    }

    /// Cursor at offset 0 with the configured page size.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(0, self.inner.page_size)
    }

    pub(crate) fn def(&self, ctx: Context) -> Result<&ContextDef> {
        self.inner
            .schema
            .def(ctx)
            .ok_or_else(|| RowGraphError::invalid(format!("context {ctx} is not in this schema")))
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            None => fut.await,
            Some(after) => match tokio::time::timeout(after, fut).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(op, after_ms = after.as_millis() as u64, "store.call.timeout");
                    Err(RowGraphError::Timeout { op, after })
                }
            },
        }
    }

    pub(crate) async fn store_create(&self, row: NewRow) -> Result<CreateOutcome> {
        let (kind, ctx) = (row.kind, row.ctx);
        let outcome = self.call("create", self.inner.store.create(row)).await?;
        if let CreateOutcome::Created(raw) = &outcome {
            debug!(ctx = %ctx, kind = %kind, key = %raw.key, "store.create");
            self.metrics().row_created();
        }
        Ok(outcome)
    }

    pub(crate) async fn store_get(&self, key: &RowKey, ctx: Context) -> Result<Option<RawRow>> {
        self.call("get", self.inner.store.get(key, ctx)).await
    }

    pub(crate) async fn store_batch_get(
        &self,
        ids: &[(Guid, Context)],
    ) -> Result<Vec<Option<RawRow>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .call("batch_get", self.inner.store.batch_get(ids))
            .await?;
        if rows.len() != ids.len() {
            return Err(RowGraphError::Store(format!(
                "batch_get returned {} rows for {} ids",
                rows.len(),
                ids.len()
            )));
        }
        self.metrics().join_fetched(ids.len());
        Ok(rows)
    }

    pub(crate) async fn store_list(
        &self,
        query: ListQuery,
        start: u64,
        limit: usize,
    ) -> Result<Page<RawRow>> {
        let page = self
            .call("list", self.inner.store.list(query, start, limit))
            .await?;
        debug!(
            ctx = %query.ctx,
            owner = %query.owner,
            dir = query.dir.as_str(),
            start,
            items = page.items.len(),
            next = page.next,
            "page.fetched"
        );
        self.metrics().page_fetched(page.items.len());
        Ok(page)
    }

    pub(crate) async fn store_search(
        &self,
        ctx: Context,
        query: &str,
        mode: SearchMode,
        start: u64,
        limit: usize,
    ) -> Result<Page<RawRow>> {
        let page = self
            .call(
                "search_names",
                self.inner.store.search_names(ctx, query, mode, start, limit),
            )
            .await?;
        debug!(ctx = %ctx, query, start, items = page.items.len(), next = page.next, "page.fetched");
        self.metrics().page_fetched(page.items.len());
        Ok(page)
    }

    pub(crate) async fn store_update(
        &self,
        key: &RowKey,
        ctx: Context,
        value: &Value,
        expect: Expect,
    ) -> Result<UpdateOutcome> {
        self.call("update", self.inner.store.update(key, ctx, value, expect))
            .await
    }

    pub(crate) async fn store_set_flags(
        &self,
        key: &RowKey,
        ctx: Context,
        add: &[u8],
        clear: &[u8],
    ) -> Result<Option<u16>> {
        self.call("set_flags", self.inner.store.set_flags(key, ctx, add, clear))
            .await
    }

    pub(crate) async fn store_increment(
        &self,
        key: &RowKey,
        ctx: Context,
        by: i64,
        limit: Option<i64>,
    ) -> Result<Increment> {
        self.call("increment", self.inner.store.increment(key, ctx, by, limit))
            .await
    }

    pub(crate) async fn store_shift(
        &self,
        key: &RowKey,
        ctx: Context,
        dir: Dir,
        index: usize,
    ) -> Result<bool> {
        let moved = self
            .call("shift", self.inner.store.shift(key, ctx, dir, index))
            .await?;
        debug!(ctx = %ctx, key = %key, dir = dir.as_str(), index, moved, "store.shift");
        Ok(moved)
    }

    pub(crate) async fn store_remove(&self, key: &RowKey, ctx: Context) -> Result<bool> {
        let removed = self.call("remove", self.inner.store.remove(key, ctx)).await?;
        debug!(ctx = %ctx, key = %key, removed, "store.remove");
        Ok(removed)
    }

    pub(crate) async fn store_move_node(
        &self,
        id: Guid,
        ctx: Context,
        from: Option<Guid>,
        to: Guid,
    ) -> Result<bool> {
        self.call("move_node", self.inner.store.move_node(id, ctx, from, to))
            .await
    }

    pub(crate) async fn store_lookup_alias(
        &self,
        ctx: Context,
        value: &str,
    ) -> Result<Option<RawRow>> {
        self.call("lookup_alias", self.inner.store.lookup_alias(ctx, value))
            .await
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("contexts", &self.inner.schema.defs().count())
            .field("page_size", &self.inner.page_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}
