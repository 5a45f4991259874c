//! Batch boundaries and inter-batch pauses.
//!
//! The [`ThrottleScheduler`] decides when a batch is complete; the pause
//! itself goes through a [`Pacer`] so tests can substitute a clock that does
//! not sleep.

use crate::metrics::ScanMetrics;
use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Performs the inter-batch pause.
pub trait Pacer {
    /// Block for `duration`, or fail with [`Error::Interrupted`].
    fn pause(&self, duration: Duration) -> Result<()>;
}

impl<P: Pacer + ?Sized> Pacer for &P {
    fn pause(&self, duration: Duration) -> Result<()> {
        (**self).pause(duration)
    }
}

impl<P: Pacer + ?Sized> Pacer for Arc<P> {
    fn pause(&self, duration: Duration) -> Result<()> {
        (**self).pause(duration)
    }
}

#[derive(Default)]
struct InterruptSignal {
    interrupted: Mutex<bool>,
    wakeup: Condvar,
}

/// Handle that interrupts a [`ThreadPacer`] from another thread.
#[derive(Clone, Default)]
pub struct Interrupter {
    signal: Arc<InterruptSignal>,
}

impl Interrupter {
    /// Wake the paused scan thread; this and every later pause fails.
    pub fn interrupt(&self) {
        *self.signal.interrupted.lock() = true;
        self.signal.wakeup.notify_all();
    }

    /// True once [`interrupt`](Self::interrupt) was called.
    pub fn is_interrupted(&self) -> bool {
        *self.signal.interrupted.lock()
    }
}

/// Blocking pacer that sleeps on the scan thread.
#[derive(Clone, Default)]
pub struct ThreadPacer {
    interrupter: Interrupter,
}

impl ThreadPacer {
    /// Create a pacer with its own interrupt handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for interrupting pauses of this pacer.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }
}

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) -> Result<()> {
        let signal = &self.interrupter.signal;
        let deadline = Instant::now() + duration;
        let mut interrupted = signal.interrupted.lock();

        while !*interrupted {
            if duration.is_zero() || signal.wakeup.wait_until(&mut interrupted, deadline).timed_out()
            {
                return Ok(());
            }
        }
        Err(Error::Interrupted)
    }
}

/// Pacer that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPacer;

impl Pacer for NoopPacer {
    fn pause(&self, _duration: Duration) -> Result<()> {
        Ok(())
    }
}

/// Pacer that records requested pauses without sleeping.
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses requested so far.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().clone()
    }

    /// Number of pauses requested so far.
    pub fn count(&self) -> usize {
        self.pauses.lock().len()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) -> Result<()> {
        self.pauses.lock().push(duration);
        Ok(())
    }
}

/// Outcome of a scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep accumulating
    Continue,
    /// Deliver the batch, then pause
    Flush,
}

/// Tracks items since the last flush and gates pacing.
pub struct ThrottleScheduler<'a> {
    batch_size: usize,
    pause: Duration,
    pacer: Box<dyn Pacer + 'a>,
    pending: usize,
    flushes: u64,
}

impl<'a> ThrottleScheduler<'a> {
    /// Create a scheduler flushing every `batch_size` items.
    pub fn new(batch_size: usize, pause: Duration, pacer: Box<dyn Pacer + 'a>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
            pacer,
            pending: 0,
            flushes: 0,
        }
    }

    /// Decide whether to flush given the current state.
    ///
    /// A full batch always flushes. Exhaustion always forces one final flush
    /// of whatever remains, even an empty batch.
    pub fn decide(&self, exhausted: bool) -> Decision {
        if exhausted || self.pending >= self.batch_size {
            Decision::Flush
        } else {
            Decision::Continue
        }
    }

    /// Count one accepted item.
    pub fn record_item(&mut self) -> Decision {
        self.pending += 1;
        self.decide(false)
    }

    /// Decision once the source is exhausted.
    pub fn on_exhausted(&self) -> Decision {
        self.decide(true)
    }

    /// Reset the batch counter and pause.
    pub fn complete_flush(&mut self, metrics: &ScanMetrics) -> Result<()> {
        debug!(
            items = self.pending,
            pause_ms = self.pause.as_millis() as u64,
            "Reached batch threshold, pausing"
        );
        self.pending = 0;
        self.flushes += 1;

        self.pacer.pause(self.pause)?;
        metrics.record_pause(self.pause);
        Ok(())
    }

    /// Items counted since the last flush.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Flushes completed so far.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}
