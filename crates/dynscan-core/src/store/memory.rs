//! In-memory record store.
//!
//! Serves pages from a snapshot taken at each page request, so writes made
//! between pages may be observed, as with a real store scan.

use super::{PageCursor, RecordStore};
use crate::{Error, Result, StoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct MemoryTable<R> {
    hash_key: Option<String>,
    records: Vec<R>,
}

/// Thread-safe in-memory store with request accounting.
pub struct MemoryStore<R> {
    tables: RwLock<HashMap<String, MemoryTable<R>>>,
    open_calls: AtomicU64,
    page_requests: AtomicU64,
    /// Fail the page request with this 1-based number
    fail_on_request: RwLock<Option<u64>>,
}

impl<R: Clone> MemoryStore<R> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            open_calls: AtomicU64::new(0),
            page_requests: AtomicU64::new(0),
            fail_on_request: RwLock::new(None),
        }
    }

    /// Builder-style variant of [`create_table`](Self::create_table).
    pub fn with_table(
        self,
        name: &str,
        hash_key: &str,
        records: impl IntoIterator<Item = R>,
    ) -> Self {
        self.create_table(name, Some(hash_key), records);
        self
    }

    /// Create (or replace) a table.
    ///
    /// A table created without a hash key cannot be scanned.
    pub fn create_table(
        &self,
        name: &str,
        hash_key: Option<&str>,
        records: impl IntoIterator<Item = R>,
    ) {
        self.tables.write().insert(
            name.to_string(),
            MemoryTable {
                hash_key: hash_key.map(str::to_string),
                records: records.into_iter().collect(),
            },
        );
    }

    /// Append a record to an existing table.
    pub fn put(&self, table: &str, record: R) -> Result<()> {
        let mut tables = self.tables.write();
        let entry = tables.get_mut(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        entry.records.push(record);
        Ok(())
    }

    /// Number of records currently stored in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map(|t| t.records.len())
            .unwrap_or(0)
    }

    /// Make the given page request (1-based, counted across all scans) fail
    /// with a transport error.
    pub fn fail_on_request(&self, request: u64) {
        *self.fail_on_request.write() = Some(request);
    }

    /// Number of scans opened against this store.
    pub fn open_calls(&self) -> u64 {
        self.open_calls.load(Ordering::Relaxed)
    }

    /// Number of page requests served.
    pub fn page_requests(&self) -> u64 {
        self.page_requests.load(Ordering::Relaxed)
    }

    fn read_page(&self, table: &str, offset: usize, page_size: usize) -> Result<Vec<R>> {
        let request = self.page_requests.fetch_add(1, Ordering::Relaxed) + 1;
        if *self.fail_on_request.read() == Some(request) {
            return Err(StoreError::Transport(format!(
                "injected failure on request {request}"
            ))
            .into());
        }

        let tables = self.tables.read();
        let entry = tables.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        let end = (offset + page_size).min(entry.records.len());
        let start = offset.min(end);
        Ok(entry.records[start..end].to_vec())
    }
}

impl<R: Clone> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone> RecordStore for MemoryStore<R> {
    type Record = R;

    fn open_scan(
        &self,
        table: &str,
        page_size: usize,
    ) -> Result<Box<dyn PageCursor<Record = R> + '_>> {
        self.open_calls.fetch_add(1, Ordering::Relaxed);

        let tables = self.tables.read();
        let entry = tables.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        if entry.hash_key.is_none() {
            return Err(Error::Config(format!(
                "Table '{table}' has no mapping for HASH key"
            )));
        }
        if page_size == 0 {
            return Err(Error::Config("page size must be at least 1".into()));
        }

        Ok(Box::new(MemoryCursor {
            store: self,
            table: table.to_string(),
            page_size,
            offset: 0,
            exhausted: false,
        }))
    }
}

struct MemoryCursor<'a, R> {
    store: &'a MemoryStore<R>,
    table: String,
    page_size: usize,
    offset: usize,
    exhausted: bool,
}

impl<R: Clone> PageCursor for MemoryCursor<'_, R> {
    type Record = R;

    fn next_page(&mut self) -> Result<Option<Vec<R>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self.store.read_page(&self.table, self.offset, self.page_size)?;
        self.offset += page.len();
        // A short page is the last one, like a scan without LastEvaluatedKey
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(cursor: &mut dyn PageCursor<Record = u32>) -> Vec<Vec<u32>> {
        let mut pages = Vec::new();
        while let Some(page) = cursor.next_page().unwrap() {
            pages.push(page);
        }
        pages
    }

    #[test]
    fn test_pages_are_bounded() {
        let store = MemoryStore::new().with_table("numbers", "id", 1..=5u32);
        let mut cursor = store.open_scan("numbers", 2).unwrap();

        assert_eq!(drain(cursor.as_mut()), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(store.page_requests(), 3);
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_page() {
        let store = MemoryStore::new().with_table("numbers", "id", 1..=4u32);
        let mut cursor = store.open_scan("numbers", 2).unwrap();

        assert_eq!(drain(cursor.as_mut()), vec![vec![1, 2], vec![3, 4], vec![]]);
    }

    #[test]
    fn test_open_does_not_fetch() {
        let store = MemoryStore::new().with_table("numbers", "id", 1..=5u32);
        let _cursor = store.open_scan("numbers", 2).unwrap();

        assert_eq!(store.open_calls(), 1);
        assert_eq!(store.page_requests(), 0);
    }

    #[test]
    fn test_missing_table() {
        let store: MemoryStore<u32> = MemoryStore::new();
        let err = store.open_scan("missing", 10).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_table_without_hash_key() {
        let store: MemoryStore<u32> = MemoryStore::new();
        store.create_table("keyless", None, vec![1]);

        let err = store.open_scan("keyless", 10).err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("HASH key"));
    }

    #[test]
    fn test_injected_failure() {
        let store = MemoryStore::new().with_table("numbers", "id", 1..=5u32);
        store.fail_on_request(2);
        let mut cursor = store.open_scan("numbers", 2).unwrap();

        assert_eq!(cursor.next_page().unwrap(), Some(vec![1, 2]));
        assert!(matches!(
            cursor.next_page(),
            Err(Error::Store(StoreError::Transport(_)))
        ));
    }

    #[test]
    fn test_writes_between_pages_are_visible() {
        let store = MemoryStore::new().with_table("numbers", "id", vec![1u32, 2]);
        let mut cursor = store.open_scan("numbers", 2).unwrap();

        assert_eq!(cursor.next_page().unwrap(), Some(vec![1, 2]));
        store.put("numbers", 3).unwrap();
        assert_eq!(cursor.next_page().unwrap(), Some(vec![3]));
        assert_eq!(cursor.next_page().unwrap(), None);
        assert_eq!(store.len("numbers"), 3);
    }
}
