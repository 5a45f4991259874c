//! Paginated record sources.
//!
//! A [`RecordStore`] opens a forward-only [`PageCursor`] over a table; the
//! [`PagedSource`] flattens that cursor into a lazy sequence of records,
//! holding at most one fetched page at a time.

mod dynamo;
mod memory;

pub use dynamo::{attribute_to_json, item_from_attributes, DynamoStore, RetryPolicy};
pub use memory::MemoryStore;

use crate::metrics::ScanMetrics;
use crate::Result;
use tracing::debug;

/// Raw record shape produced by the DynamoDB store.
pub type Item = serde_json::Map<String, serde_json::Value>;

/// Forward-only cursor over the pages of one scan.
pub trait PageCursor {
    /// Record type yielded by this cursor.
    type Record;

    /// Fetch the next page. Each call issues one read request.
    ///
    /// Returns `Ok(None)` once the scan is exhausted. A page may be empty
    /// without the scan being exhausted.
    fn next_page(&mut self) -> Result<Option<Vec<Self::Record>>>;
}

/// A store that can be scanned page by page.
pub trait RecordStore {
    /// Record type stored in tables.
    type Record;

    /// Open a scan over `table` requesting `page_size` records per page.
    ///
    /// Fails with a not-found error if the table does not exist and with a
    /// configuration error if the table has no hash key. No page is fetched.
    fn open_scan(
        &self,
        table: &str,
        page_size: usize,
    ) -> Result<Box<dyn PageCursor<Record = Self::Record> + '_>>;
}

/// Lazy, finite, non-restartable sequence of records.
pub struct PagedSource<'a, R> {
    cursor: Box<dyn PageCursor<Record = R> + 'a>,
    page: std::vec::IntoIter<R>,
    metrics: &'a ScanMetrics,
    done: bool,
}

impl<'a, R> PagedSource<'a, R> {
    /// Open a source over `table` in `store`.
    pub fn open<S>(
        store: &'a S,
        table: &str,
        page_size: usize,
        metrics: &'a ScanMetrics,
    ) -> Result<Self>
    where
        S: RecordStore<Record = R> + ?Sized,
    {
        let cursor = store.open_scan(table, page_size)?;
        Ok(Self {
            cursor,
            page: Vec::new().into_iter(),
            metrics,
            done: false,
        })
    }

    /// True once the underlying cursor reported exhaustion or failed.
    pub fn is_exhausted(&self) -> bool {
        self.done && self.page.len() == 0
    }
}

impl<R> Iterator for PagedSource<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.page.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }

            match self.cursor.next_page() {
                Ok(Some(records)) => {
                    self.metrics.record_page();
                    debug!(
                        page = self.metrics.pages_fetched(),
                        records = records.len(),
                        "Fetched page"
                    );
                    self.page = records.into_iter();
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    // A failed cursor is not resumed
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
