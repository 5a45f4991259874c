//! Scan execution.
//!
//! The engine drives one scan through its lifecycle:
//!
//! ```text
//! Idle -> Validating -> Scanning -> Draining -> Done
//!             |            |           |
//!             +------------+-----------+--> Failed
//! ```
//!
//! Configuration errors and errors opening the source fail the scan while it
//! is still validating. Transport, consumer and interrupt errors fail it
//! mid-scan. Per-item transform errors never do.
//!
//! Records are pulled lazily from a [`PagedSource`], transformed one at a
//! time, and handed to the consumption strategy. Every `items_per_page`
//! accepted items the batch is flushed and the scan pauses. Transform
//! failures drop the record and the scan continues; store and consumer
//! failures end the scan.

use crate::metrics::{MetricsSnapshot, ScanMetrics};
use crate::scanner::{ScanBuilder, ScanConfiguration};
use crate::store::{PagedSource, RecordStore};
use crate::strategy::{ConsumptionStrategy, StrategyKind};
use crate::throttle::{Decision, ThrottleScheduler};
use crate::Result;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Validating,
    Scanning,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanState::Idle => "idle",
            ScanState::Validating => "validating",
            ScanState::Scanning => "scanning",
            ScanState::Draining => "draining",
            ScanState::Done => "done",
            ScanState::Failed => "failed",
        })
    }
}

/// Summary of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub table: String,
    pub strategy: StrategyKind,
    pub metrics: MetricsSnapshot,
    pub elapsed: Duration,
}

/// Result of a completed scan.
#[derive(Debug)]
pub struct ScanOutput<T> {
    /// Items in source order for collect-all scans, `None` otherwise
    pub items: Option<Vec<T>>,
    pub report: ScanReport,
}

impl<T> ScanOutput<T> {
    /// Collected items, if the scan used the collect-all strategy.
    pub fn into_items(self) -> Option<Vec<T>> {
        self.items
    }
}

/// Runs scans against a store.
pub struct ScanEngine<'s, S: ?Sized> {
    store: &'s S,
    state: ScanState,
}

impl<'s, S: RecordStore + ?Sized> ScanEngine<'s, S> {
    /// Create an idle engine.
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            state: ScanState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    fn transition(&mut self, next: ScanState) {
        debug!(from = %self.state, to = %next, "Scan state transition");
        self.state = next;
    }

    /// Execute an already validated scan.
    ///
    /// The configuration was validated when it was built, so the engine
    /// passes straight through [`ScanState::Validating`].
    pub fn execute<T>(
        &mut self,
        config: ScanConfiguration<'_, S::Record, T>,
    ) -> Result<ScanOutput<T>> {
        self.transition(ScanState::Validating);
        self.scan(config)
    }

    /// Drive the scan from `Validating`; any error ends in `Failed`.
    fn scan<T>(&mut self, config: ScanConfiguration<'_, S::Record, T>) -> Result<ScanOutput<T>> {
        let result = self.drive(config);
        if let Err(ref e) = result {
            warn!(state = %self.state, error = %e, "Scan aborted");
            self.transition(ScanState::Failed);
        }
        result
    }

    fn drive<T>(&mut self, config: ScanConfiguration<'_, S::Record, T>) -> Result<ScanOutput<T>> {
        let ScanConfiguration {
            table,
            items_per_page,
            pause,
            transformer,
            mut strategy,
            pacer,
            metrics,
            ..
        } = config;

        let kind = strategy.kind();
        let started = Instant::now();
        info!(
            table = %table,
            strategy = %kind,
            items_per_page,
            pause_ms = pause.as_millis() as u64,
            "Starting scan"
        );

        let source = PagedSource::open(self.store, &table, items_per_page, &metrics)?;
        self.transition(ScanState::Scanning);
        let mut scheduler = ThrottleScheduler::new(items_per_page, pause, pacer);

        for (position, next) in (0u64..).zip(source) {
            let record = next?;
            metrics.record_read();

            match transformer.apply(position, record) {
                Ok(item) => {
                    strategy.intake(item)?;
                    metrics.record_accepted();
                    if scheduler.record_item() == Decision::Flush {
                        flush(&mut strategy, &mut scheduler, &metrics)?;
                    }
                }
                Err(e) => {
                    metrics.record_dropped();
                    error!(
                        table = %table,
                        position = e.position,
                        error = %e.message,
                        "Couldn't process item, dropping it"
                    );
                }
            }
        }

        self.transition(ScanState::Draining);
        if scheduler.on_exhausted() == Decision::Flush {
            flush(&mut strategy, &mut scheduler, &metrics)?;
        }

        self.transition(ScanState::Done);
        let report = ScanReport {
            table,
            strategy: kind,
            metrics: metrics.snapshot(),
            elapsed: started.elapsed(),
        };
        info!(
            table = %report.table,
            records_read = report.metrics.records_read,
            items_accepted = report.metrics.items_accepted,
            items_dropped = report.metrics.items_dropped,
            pages = report.metrics.pages_fetched,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Scan complete"
        );

        Ok(ScanOutput {
            items: strategy.finish(),
            report,
        })
    }
}

impl<S: RecordStore> ScanEngine<'_, S> {
    /// Validate `builder` and execute the resulting scan.
    ///
    /// Validation failures leave the engine in [`ScanState::Failed`] without
    /// any store access.
    pub fn run<T>(&mut self, builder: ScanBuilder<'_, S, T>) -> Result<ScanOutput<T>> {
        self.transition(ScanState::Validating);
        let config = match builder.build() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Scan configuration rejected");
                self.transition(ScanState::Failed);
                return Err(e);
            }
        };
        self.scan(config)
    }
}

fn flush<T>(
    strategy: &mut ConsumptionStrategy<'_, T>,
    scheduler: &mut ThrottleScheduler<'_>,
    metrics: &ScanMetrics,
) -> Result<()> {
    let delivered = strategy.flush()?;
    metrics.record_flush();
    debug!(delivered, pending = scheduler.pending(), "Flushed batch");
    scheduler.complete_flush(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::TableScanner;
    use crate::store::MemoryStore;
    use crate::error::{Error, StoreError};
    use crate::throttle::{RecordingPacer, ThreadPacer};

    #[test]
    fn test_engine_reaches_done() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=5u32));
        let pacer = RecordingPacer::new();
        let config = scanner
            .scan()
            .table("t")
            .items_per_page(2)
            .pacer(&pacer)
            .build()
            .unwrap();

        let mut engine = ScanEngine::new(scanner.store());
        assert_eq!(engine.state(), ScanState::Idle);

        let output = engine.execute(config).unwrap();
        assert_eq!(engine.state(), ScanState::Done);
        assert_eq!(output.items, Some(vec![1, 2, 3, 4, 5]));
        assert_eq!(output.report.metrics.batches_flushed, 3);
        assert_eq!(pacer.count(), 3);
    }

    #[test]
    fn test_engine_fails_validation() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=5u32));
        let mut engine = ScanEngine::new(scanner.store());

        let err = engine.run(scanner.scan()).unwrap_err();
        assert!(err.is_config());
        assert_eq!(engine.state(), ScanState::Failed);
        assert_eq!(scanner.store().open_calls(), 0);
    }

    #[test]
    fn test_engine_dropped_items_do_not_count_towards_batch() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=6u32));
        let pacer = RecordingPacer::new();
        let mut batches = Vec::new();

        let report = scanner
            .scan()
            .table("t")
            .items_per_page(2)
            .pacer(&pacer)
            .transform(|n| {
                if n % 3 == 0 {
                    Err("multiple of three".into())
                } else {
                    Ok(n)
                }
            })
            .for_each_batch(|batch| {
                batches.push(batch);
                Ok(())
            })
            .unwrap();

        assert_eq!(batches, vec![vec![1, 2], vec![4, 5], vec![]]);
        assert_eq!(report.metrics.items_dropped, 2);
        assert_eq!(report.metrics.records_read, 6);
        assert_eq!(pacer.count(), 3);
    }

    #[test]
    fn test_execute_passes_through_validating() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=2u32));
        let config = scanner.scan().table("missing").build().unwrap();

        let mut engine = ScanEngine::new(scanner.store());
        let err = engine.execute(config).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(engine.state(), ScanState::Failed);
    }

    #[test]
    fn test_missing_table_fails_engine() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=2u32));
        let pacer = RecordingPacer::new();
        let mut engine = ScanEngine::new(scanner.store());

        let err = engine
            .run(scanner.scan().table("missing").pacer(&pacer))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(engine.state(), ScanState::Failed);
        assert_eq!(pacer.count(), 0);
    }

    #[test]
    fn test_transport_failure_fails_engine() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=6u32));
        scanner.store().fail_on_request(2);
        let pacer = RecordingPacer::new();
        let mut engine = ScanEngine::new(scanner.store());

        let err = engine
            .run(scanner.scan().table("t").items_per_page(2).pacer(&pacer))
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Transport(_))));
        assert_eq!(engine.state(), ScanState::Failed);
    }

    #[test]
    fn test_consumer_error_fails_engine() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=4u32));
        let pacer = RecordingPacer::new();
        let mut engine = ScanEngine::new(scanner.store());

        let builder = scanner
            .scan()
            .table("t")
            .items_per_page(2)
            .pacer(&pacer)
            .consume_each(|n| if n == 3 { Err("full".into()) } else { Ok(()) });
        let err = engine.run(builder).unwrap_err();

        assert!(matches!(err, Error::Consumer(_)));
        assert_eq!(engine.state(), ScanState::Failed);
        assert_eq!(pacer.count(), 1);
    }

    #[test]
    fn test_interrupted_pause_fails_engine() {
        let scanner = TableScanner::new(MemoryStore::new().with_table("t", "id", 1..=3u32));
        let pacer = ThreadPacer::new();
        pacer.interrupter().interrupt();
        let mut engine = ScanEngine::new(scanner.store());

        let err = engine
            .run(scanner.scan().table("t").items_per_page(1).pacer(pacer))
            .unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(engine.state(), ScanState::Failed);
    }
}
