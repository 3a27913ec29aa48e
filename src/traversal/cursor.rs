use std::collections::VecDeque;

use tracing::trace;

use crate::db::Db;
use crate::error::{Result, RowGraphError};
use crate::store::{ListQuery, Page, RawRow, SearchMode};
use crate::types::Context;

/// Offset and page size of a listing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Cursor {
    /// Offset of the first row to read.
    pub start: u64,
    /// Rows requested per store call; at least 1.
    pub limit: usize,
}

impl Cursor {
    /// Cursor at `start` reading `limit` rows per call.
    pub fn new(start: u64, limit: usize) -> Self {
        Self { start, limit }
    }

    /// Same page size, different offset.
    pub fn at(self, start: u64) -> Self {
        Self { start, ..self }
    }

    fn validate(self) -> Result<Self> {
        if self.limit == 0 {
            return Err(RowGraphError::invalid("cursor limit must be at least 1"));
        }
        Ok(self)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Source {
    List(ListQuery),
    Search {
        ctx: Context,
        query: String,
        mode: SearchMode,
    },
}

impl Source {
    async fn fetch(&self, db: &Db, start: u64, limit: usize) -> Result<Page<RawRow>> {
        match self {
            Source::List(query) => db.store_list(*query, start, limit).await,
            Source::Search { ctx, query, mode } => {
                db.store_search(*ctx, query, *mode, start, limit).await
            }
        }
    }
}

/// Reads one page of `query` in a single store call.
pub async fn page(db: &Db, query: ListQuery, cursor: Cursor) -> Result<Page<RawRow>> {
    let cursor = cursor.validate()?;
    db.store_list(query, cursor.start, cursor.limit).await
}

/// Reads the row at `index` of `query`, as a one-row page.
pub async fn nth(db: &Db, query: ListQuery, index: u64) -> Result<Option<RawRow>> {
    let page = db.store_list(query, index, 1).await?;
    Ok(page.items.into_iter().next())
}

/// Forward-only pager over one listing.
///
/// Each call to [`RowPager::next_page`] is one store round trip. The pager
/// advances by the offset the store returns and stops after the first page
/// holding fewer rows than the limit.
#[derive(Debug)]
pub struct RowPager {
    db: Db,
    source: Source,
    next: u64,
    limit: usize,
    done: bool,
}

impl RowPager {
    pub(crate) fn new(db: &Db, source: Source, cursor: Cursor) -> Result<Self> {
        let cursor = cursor.validate()?;
        Ok(Self {
            db: db.clone(),
            source,
            next: cursor.start,
            limit: cursor.limit,
            done: false,
        })
    }

    /// Pager over the rows of `query`.
    pub fn list(db: &Db, query: ListQuery, cursor: Cursor) -> Result<Self> {
        Self::new(db, Source::List(query), cursor)
    }

    /// Offset the next page starts at.
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Whether the listing is exhausted.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    /// Fetches the next page; `None` once the listing is exhausted.
    ///
    /// The final page may be empty when the row count is a multiple of the
    /// limit.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawRow>>> {
        if self.done {
            return Ok(None);
        }
        let page = self.source.fetch(&self.db, self.next, self.limit).await?;
        if page.items.len() < self.limit {
            self.done = true;
        } else if page.next <= self.next {
            return Err(RowGraphError::Store(format!(
                "full page at offset {} did not advance the cursor",
                self.next
            )));
        }
        trace!(start = self.next, next = page.next, done = self.done, "pager.advance");
        self.next = page.next;
        Ok(Some(page.items))
    }

    /// Drains the remaining pages into one vector.
    pub async fn try_collect(mut self) -> Result<Vec<RawRow>> {
        let mut rows = Vec::new();
        while let Some(page) = self.next_page().await? {
            rows.extend(page);
        }
        Ok(rows)
    }
}

type Hydrate<T> = Box<dyn Fn(&Db, RawRow) -> Result<T> + Send + Sync>;

/// Typed rows over a [`RowPager`], fetched a page at a time.
pub struct RowIter<T> {
    pager: RowPager,
    buffer: VecDeque<T>,
    hydrate: Hydrate<T>,
}

impl<T> RowIter<T> {
    pub(crate) fn new(
        pager: RowPager,
        hydrate: impl Fn(&Db, RawRow) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            pager,
            buffer: VecDeque::new(),
            hydrate: Box::new(hydrate),
        }
    }

    /// Next row, fetching a page when the buffer runs dry.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.pager.next_page().await? {
                None => return Ok(None),
                Some(rows) => {
                    let items = rows
                        .into_iter()
                        .map(|raw| (self.hydrate)(self.pager.db(), raw))
                        .collect::<Result<Vec<_>>>()?;
                    self.buffer.extend(items);
                }
            }
        }
    }

    /// Buffered rows, or else the next page.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        match self.pager.next_page().await? {
            None => Ok(None),
            Some(rows) => rows
                .into_iter()
                .map(|raw| (self.hydrate)(self.pager.db(), raw))
                .collect::<Result<Vec<_>>>()
                .map(Some),
        }
    }

    /// Drains the remaining rows into one vector.
    pub async fn try_collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Underlying pager position and state.
    pub fn pager(&self) -> &RowPager {
        &self.pager
    }
}
