use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hooks the row layer calls as it talks to the store.
///
/// Implementations must be cheap; every hook runs on the request path.
pub trait RowMetrics: Send + Sync {
    /// A row was inserted.
    fn row_created(&self);

    /// A value write was accepted by the store.
    fn row_updated(&self);

    /// A compare-and-set write lost against a concurrent writer.
    fn cas_conflict(&self);

    /// A flags delta was applied.
    fn flags_saved(&self);

    /// A listing page came back with `items` rows.
    ///
    /// # Parameters
    /// * `items` - Number of rows in the page; zero for an empty trailing page.
    fn page_fetched(&self, items: usize);

    /// A joined page fetched `items` related nodes in one batch.
    fn join_fetched(&self, items: usize);
}

/// Discards every event.
#[derive(Default)]
pub struct NoopMetrics;

impl RowMetrics for NoopMetrics {
    fn row_created(&self) {}
    fn row_updated(&self) {}
    fn cas_conflict(&self) {}
    fn flags_saved(&self) {}
    fn page_fetched(&self, _items: usize) {}
    fn join_fetched(&self, _items: usize) {}
}

/// Atomic counters for every [`RowMetrics`] hook.
#[derive(Default)]
pub struct CounterMetrics {
    /// Rows inserted.
    pub rows_created: AtomicU64,

    /// Value writes accepted.
    pub rows_updated: AtomicU64,

    /// Compare-and-set writes rejected as stale.
    pub cas_conflicts: AtomicU64,

    /// Flags deltas applied.
    pub flags_saved: AtomicU64,

    /// Listing pages fetched.
    pub pages_fetched: AtomicU64,

    /// Rows returned across all listing pages.
    pub rows_listed: AtomicU64,

    /// Batch fetches issued by joined listings.
    pub joins_fetched: AtomicU64,

    /// Nodes requested across all batch fetches.
    pub rows_joined: AtomicU64,
}

impl RowMetrics for CounterMetrics {
    fn row_created(&self) {
        self.rows_created.fetch_add(1, Ordering::Relaxed);
    }

    fn row_updated(&self) {
        self.rows_updated.fetch_add(1, Ordering::Relaxed);
    }

    fn cas_conflict(&self) {
        self.cas_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    fn flags_saved(&self) {
        self.flags_saved.fetch_add(1, Ordering::Relaxed);
    }

    fn page_fetched(&self, items: usize) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.rows_listed.fetch_add(items as u64, Ordering::Relaxed);
    }

    fn join_fetched(&self, items: usize) {
        self.joins_fetched.fetch_add(1, Ordering::Relaxed);
        self.rows_joined.fetch_add(items as u64, Ordering::Relaxed);
    }
}

/// Metrics used when none are configured: a shared [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn RowMetrics> {
    Arc::new(NoopMetrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = CounterMetrics::default();
        metrics.page_fetched(3);
        metrics.page_fetched(0);
        metrics.join_fetched(2);
        metrics.cas_conflict();
        assert_eq!(metrics.pages_fetched.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rows_listed.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.rows_joined.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.cas_conflicts.load(Ordering::Relaxed), 1);
    }
}
