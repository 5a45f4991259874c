//! Consumption strategies: how transformed items reach the caller.

use crate::{BoxError, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Callback receiving one item at a time.
pub type ItemConsumer<'a, T> = Box<dyn FnMut(T) -> std::result::Result<(), BoxError> + 'a>;

/// Callback receiving one batch at a time.
pub type BatchConsumer<'a, T> =
    Box<dyn FnMut(Vec<T>) -> std::result::Result<(), BoxError> + 'a>;

/// Delivery mode selected for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Accumulate every item and return them
    #[default]
    CollectAll,
    /// Invoke a callback per item
    ConsumeEach,
    /// Invoke a callback per batch
    ConsumeBatch,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::CollectAll => "collect_all",
            StrategyKind::ConsumeEach => "consume_each",
            StrategyKind::ConsumeBatch => "consume_batch",
        })
    }
}

/// Active strategy for one scan run.
pub enum ConsumptionStrategy<'a, T> {
    /// Accumulation is the result; flushing delivers nothing
    CollectAll { results: Vec<T> },
    /// Items go to the consumer as soon as they are accepted
    ConsumeEach { consumer: ItemConsumer<'a, T> },
    /// Items accumulate until the scheduler flushes
    ConsumeBatch {
        batch: Vec<T>,
        consumer: BatchConsumer<'a, T>,
    },
}

impl<'a, T> ConsumptionStrategy<'a, T> {
    /// Collect-all strategy.
    pub fn collect_all() -> Self {
        ConsumptionStrategy::CollectAll {
            results: Vec::new(),
        }
    }

    /// Per-item strategy.
    pub fn consume_each(consumer: ItemConsumer<'a, T>) -> Self {
        ConsumptionStrategy::ConsumeEach { consumer }
    }

    /// Per-batch strategy with room for `batch_size` items.
    pub fn consume_batch(consumer: BatchConsumer<'a, T>, batch_size: usize) -> Self {
        ConsumptionStrategy::ConsumeBatch {
            batch: Vec::with_capacity(batch_size),
            consumer,
        }
    }

    /// Which variant this is.
    pub fn kind(&self) -> StrategyKind {
        match self {
            ConsumptionStrategy::CollectAll { .. } => StrategyKind::CollectAll,
            ConsumptionStrategy::ConsumeEach { .. } => StrategyKind::ConsumeEach,
            ConsumptionStrategy::ConsumeBatch { .. } => StrategyKind::ConsumeBatch,
        }
    }

    /// Accept one transformed item.
    pub fn intake(&mut self, item: T) -> Result<()> {
        match self {
            ConsumptionStrategy::CollectAll { results } => results.push(item),
            ConsumptionStrategy::ConsumeEach { consumer } => {
                consumer(item).map_err(|e| Error::Consumer(e.to_string()))?
            }
            ConsumptionStrategy::ConsumeBatch { batch, .. } => batch.push(item),
        }
        Ok(())
    }

    /// Deliver what has accumulated since the last flush.
    ///
    /// Returns the number of items handed to the batch consumer.
    pub fn flush(&mut self) -> Result<usize> {
        match self {
            ConsumptionStrategy::CollectAll { .. } | ConsumptionStrategy::ConsumeEach { .. } => {
                Ok(0)
            }
            ConsumptionStrategy::ConsumeBatch { batch, consumer } => {
                let capacity = batch.capacity();
                let delivered = std::mem::replace(batch, Vec::with_capacity(capacity));
                let count = delivered.len();
                consumer(delivered).map_err(|e| Error::Consumer(e.to_string()))?;
                Ok(count)
            }
        }
    }

    /// Consume the strategy, returning collected items for CollectAll.
    pub fn finish(self) -> Option<Vec<T>> {
        match self {
            ConsumptionStrategy::CollectAll { results } => Some(results),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for ConsumptionStrategy<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumptionStrategy")
            .field("kind", &self.kind())
            .finish()
    }
}
