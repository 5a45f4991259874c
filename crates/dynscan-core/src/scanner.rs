//! Fluent scan configuration.
//!
//! ```
//! use dynscan_core::{MemoryStore, NoopPacer, TableScanner};
//!
//! let store = MemoryStore::new().with_table("Orders", "id", vec!["a", "b", "c"]);
//! let scanner = TableScanner::new(store);
//!
//! let upper = scanner
//!     .scan()
//!     .table("Orders")
//!     .items_per_page(2)
//!     .pacer(NoopPacer)
//!     .transform(|s| Ok(s.to_uppercase()))
//!     .collect()
//!     .unwrap();
//!
//! assert_eq!(upper, vec!["A", "B", "C"]);
//! ```

use crate::config::{ScanSettings, DEFAULT_ITEMS_PER_PAGE, DEFAULT_PAUSE_BETWEEN_PAGES};
use crate::engine::{ScanEngine, ScanOutput, ScanReport};
use crate::metrics::ScanMetrics;
use crate::schema::{from_item, TableIdentity, TableModel};
use crate::store::{Item, RecordStore};
use crate::strategy::{BatchConsumer, ConsumptionStrategy, ItemConsumer, StrategyKind};
use crate::throttle::{Pacer, ThreadPacer};
use crate::transform::ItemTransformer;
use crate::{BoxError, Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Entry point for scanning tables of a store.
pub struct TableScanner<S> {
    store: S,
}

impl<S: RecordStore> TableScanner<S> {
    /// Create a scanner over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start configuring a scan. Each run opens a fresh page cursor.
    pub fn scan(&self) -> ScanBuilder<'_, S, S::Record> {
        ScanBuilder::new(&self.store)
    }
}

/// Builder for a single scan.
///
/// Nothing is validated until [`build`](Self::build) (or a terminal method
/// such as [`run`](Self::run)) is called; validation happens once, before
/// the store is touched.
pub struct ScanBuilder<'a, S: RecordStore, T> {
    store: &'a S,
    table: Option<TableIdentity>,
    items_per_page: usize,
    pause: Duration,
    transformer: ItemTransformer<'a, S::Record, T>,
    strategy: StrategyKind,
    on_item: Option<ItemConsumer<'a, T>>,
    on_batch: Option<BatchConsumer<'a, T>>,
    pacer: Option<Box<dyn Pacer + 'a>>,
    metrics: Option<Arc<ScanMetrics>>,
}

impl<'a, S> ScanBuilder<'a, S, S::Record>
where
    S: RecordStore,
    S::Record: 'a,
{
    /// Builder with defaults and an identity transform.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            table: None,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            pause: DEFAULT_PAUSE_BETWEEN_PAGES,
            transformer: ItemTransformer::identity(),
            strategy: StrategyKind::default(),
            on_item: None,
            on_batch: None,
            pacer: None,
            metrics: None,
        }
    }
}

impl<'a, S> ScanBuilder<'a, S, Item>
where
    S: RecordStore<Record = Item>,
{
    /// Scan the table declared by `M` and map each item onto it.
    ///
    /// Items that do not deserialize into `M` are dropped.
    pub fn model<M: TableModel + 'a>(self) -> ScanBuilder<'a, S, M> {
        self.table(TableIdentity::of::<M>()).transform(from_item::<M>)
    }
}

impl<'a, S: RecordStore, T> ScanBuilder<'a, S, T> {
    /// Table to scan.
    pub fn table(mut self, table: impl Into<TableIdentity>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Records per page request; also the throttling batch size.
    pub fn items_per_page(mut self, items_per_page: usize) -> Self {
        self.items_per_page = items_per_page;
        self
    }

    /// Pause after each batch.
    pub fn pause_between_pages(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Apply page size and pause from file configuration.
    pub fn settings(self, settings: &ScanSettings) -> Self {
        self.items_per_page(settings.items_per_page)
            .pause_between_pages(settings.pause_between_pages())
    }

    /// Map each raw record before delivery.
    ///
    /// Changes the result type, so consumers bound earlier are discarded;
    /// bind them after calling this.
    pub fn transform<U, F>(self, f: F) -> ScanBuilder<'a, S, U>
    where
        F: Fn(S::Record) -> std::result::Result<U, BoxError> + 'a,
    {
        ScanBuilder {
            store: self.store,
            table: self.table,
            items_per_page: self.items_per_page,
            pause: self.pause,
            transformer: ItemTransformer::new(f),
            strategy: self.strategy,
            on_item: None,
            on_batch: None,
            pacer: self.pacer,
            metrics: self.metrics,
        }
    }

    /// Select the consumption strategy.
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bind the per-item consumer without selecting a strategy.
    pub fn on_item<F>(mut self, consumer: F) -> Self
    where
        F: FnMut(T) -> std::result::Result<(), BoxError> + 'a,
    {
        self.on_item = Some(Box::new(consumer));
        self
    }

    /// Bind the per-batch consumer without selecting a strategy.
    pub fn on_batch<F>(mut self, consumer: F) -> Self
    where
        F: FnMut(Vec<T>) -> std::result::Result<(), BoxError> + 'a,
    {
        self.on_batch = Some(Box::new(consumer));
        self
    }

    /// Deliver items one by one to `consumer`.
    pub fn consume_each<F>(self, consumer: F) -> Self
    where
        F: FnMut(T) -> std::result::Result<(), BoxError> + 'a,
    {
        self.strategy(StrategyKind::ConsumeEach).on_item(consumer)
    }

    /// Deliver items in batches of `items_per_page` to `consumer`.
    pub fn consume_batch<F>(self, consumer: F) -> Self
    where
        F: FnMut(Vec<T>) -> std::result::Result<(), BoxError> + 'a,
    {
        self.strategy(StrategyKind::ConsumeBatch).on_batch(consumer)
    }

    /// Substitute the pause implementation.
    pub fn pacer<P: Pacer + 'a>(mut self, pacer: P) -> Self {
        self.pacer = Some(Box::new(pacer));
        self
    }

    /// Record counters into shared metrics instead of a private set.
    pub fn metrics(mut self, metrics: Arc<ScanMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the builder into an immutable configuration.
    pub fn build(self) -> Result<ScanConfiguration<'a, S::Record, T>> {
        let identity = self
            .table
            .ok_or_else(|| Error::Config("Table name is required".into()))?;
        let table = identity.resolve()?;

        if self.items_per_page == 0 {
            return Err(Error::Config("items_per_page must be at least 1".into()));
        }

        let strategy = match self.strategy {
            StrategyKind::CollectAll => {
                if self.on_item.is_some() || self.on_batch.is_some() {
                    return Err(Error::Config(
                        "A consumer is bound but the strategy is collect_all".into(),
                    ));
                }
                ConsumptionStrategy::collect_all()
            }
            StrategyKind::ConsumeEach => {
                if self.on_batch.is_some() {
                    return Err(Error::Config(
                        "A batch consumer is bound but the strategy is consume_each".into(),
                    ));
                }
                let consumer = self.on_item.ok_or_else(|| {
                    Error::Config("consume_each strategy requires an item consumer".into())
                })?;
                ConsumptionStrategy::consume_each(consumer)
            }
            StrategyKind::ConsumeBatch => {
                if self.on_item.is_some() {
                    return Err(Error::Config(
                        "An item consumer is bound but the strategy is consume_batch".into(),
                    ));
                }
                let consumer = self.on_batch.ok_or_else(|| {
                    Error::Config("consume_batch strategy requires a batch consumer".into())
                })?;
                ConsumptionStrategy::consume_batch(consumer, self.items_per_page)
            }
        };

        Ok(ScanConfiguration {
            identity,
            table,
            items_per_page: self.items_per_page,
            pause: self.pause,
            transformer: self.transformer,
            strategy,
            pacer: self
                .pacer
                .unwrap_or_else(|| Box::new(ThreadPacer::new())),
            metrics: self.metrics.unwrap_or_default(),
        })
    }

    /// Validate and run the scan.
    pub fn run(self) -> Result<ScanOutput<T>> {
        ScanEngine::new(self.store).run(self)
    }

    /// Run with the collect-all strategy and return the items in source order.
    pub fn collect(self) -> Result<Vec<T>> {
        let output = self.strategy(StrategyKind::CollectAll).run()?;
        Ok(output.into_items().unwrap_or_default())
    }

    /// Run delivering each item to `consumer`.
    pub fn for_each<F>(self, consumer: F) -> Result<ScanReport>
    where
        F: FnMut(T) -> std::result::Result<(), BoxError> + 'a,
    {
        Ok(self.consume_each(consumer).run()?.report)
    }

    /// Run delivering batches to `consumer`.
    pub fn for_each_batch<F>(self, consumer: F) -> Result<ScanReport>
    where
        F: FnMut(Vec<T>) -> std::result::Result<(), BoxError> + 'a,
    {
        Ok(self.consume_batch(consumer).run()?.report)
    }
}

/// Validated, immutable configuration of one scan.
pub struct ScanConfiguration<'a, R, T> {
    pub(crate) identity: TableIdentity,
    pub(crate) table: String,
    pub(crate) items_per_page: usize,
    pub(crate) pause: Duration,
    pub(crate) transformer: ItemTransformer<'a, R, T>,
    pub(crate) strategy: ConsumptionStrategy<'a, T>,
    pub(crate) pacer: Box<dyn Pacer + 'a>,
    pub(crate) metrics: Arc<ScanMetrics>,
}

impl<R, T> ScanConfiguration<'_, R, T> {
    /// Identity the table name was resolved from.
    pub fn identity(&self) -> &TableIdentity {
        &self.identity
    }

    /// Resolved table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Records per page and per batch.
    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    /// Pause after each batch.
    pub fn pause_between_pages(&self) -> Duration {
        self.pause
    }

    /// Selected strategy.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::throttle::NoopPacer;

    fn store() -> MemoryStore<u32> {
        MemoryStore::new().with_table("numbers", "id", 1..=3u32)
    }

    #[test]
    fn test_defaults() {
        let store = store();
        let config = ScanBuilder::new(&store).table("numbers").build().unwrap();

        assert_eq!(config.table(), "numbers");
        assert_eq!(config.items_per_page(), 200);
        assert_eq!(config.pause_between_pages(), Duration::from_millis(50));
        assert_eq!(config.strategy(), StrategyKind::CollectAll);
    }

    #[test]
    fn test_settings_apply() {
        let store = store();
        let settings = ScanSettings {
            items_per_page: 10,
            pause_between_pages_ms: 5,
            ..ScanSettings::default()
        };
        let config = ScanBuilder::new(&store)
            .table("numbers")
            .settings(&settings)
            .build()
            .unwrap();

        assert_eq!(config.items_per_page(), 10);
        assert_eq!(config.pause_between_pages(), Duration::from_millis(5));
    }

    #[test]
    fn test_missing_table() {
        let store = store();
        let err = ScanBuilder::new(&store).build().err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("Table name is required"));
    }

    #[test]
    fn test_zero_items_per_page() {
        let store = store();
        let err = ScanBuilder::new(&store)
            .table("numbers")
            .items_per_page(0)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("items_per_page"));
    }

    #[test]
    fn test_consume_each_without_consumer() {
        let store = store();
        let err = ScanBuilder::new(&store)
            .table("numbers")
            .strategy(StrategyKind::ConsumeEach)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("requires an item consumer"));
    }

    #[test]
    fn test_consume_batch_without_consumer() {
        let store = store();
        let err = ScanBuilder::new(&store)
            .table("numbers")
            .strategy(StrategyKind::ConsumeBatch)
            .on_item(|_| Ok(()))
            .build()
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_collect_with_bound_consumer() {
        let store = store();
        let err = ScanBuilder::new(&store)
            .table("numbers")
            .on_batch(|_| Ok(()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("strategy is collect_all"));
    }

    #[test]
    fn test_transform_discards_earlier_consumers() {
        let store = store();
        let err = ScanBuilder::new(&store)
            .table("numbers")
            .consume_each(|_| Ok(()))
            .transform(|n| Ok(n.to_string()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("requires an item consumer"));
    }

    #[test]
    fn test_build_does_not_touch_store() {
        let store = store();
        let _config = ScanBuilder::new(&store)
            .table("numbers")
            .pacer(NoopPacer)
            .build()
            .unwrap();
        assert_eq!(store.open_calls(), 0);
    }
}
