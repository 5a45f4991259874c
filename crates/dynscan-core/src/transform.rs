//! Per-item transformation with fault isolation.
//!
//! A transform that returns an error aborts only the item it was applied to;
//! the engine logs and drops it and moves on. A panic is a bug in the
//! transform, not a bad record, and unwinds out of the scan.

use crate::{BoxError, ItemError};

type TransformFn<'a, R, T> = dyn Fn(R) -> Result<T, BoxError> + 'a;

/// Maps a raw record to a result item.
pub struct ItemTransformer<'a, R, T> {
    f: Box<TransformFn<'a, R, T>>,
}

impl<'a, R, T> ItemTransformer<'a, R, T> {
    /// Wrap a fallible mapping function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(R) -> Result<T, BoxError> + 'a,
    {
        Self { f: Box::new(f) }
    }

    /// Apply the transform to the record at `position`.
    pub fn apply(&self, position: u64, record: R) -> Result<T, ItemError> {
        (self.f)(record).map_err(|e| ItemError {
            position,
            message: e.to_string(),
        })
    }
}

impl<'a, R: 'a> ItemTransformer<'a, R, R> {
    /// Pass records through unchanged.
    pub fn identity() -> Self {
        Self::new(Ok)
    }
}
