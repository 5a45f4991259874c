//! Scan metrics with Prometheus text export.
//!
//! Counters are atomics so a scan running on one thread can be observed
//! from another (progress reporting) through a shared `Arc<ScanMetrics>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for a single scan.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    /// Raw records pulled from the source
    records_read: AtomicU64,

    /// Transformed items handed to the consumption strategy
    items_accepted: AtomicU64,

    /// Records dropped because their transform failed
    items_dropped: AtomicU64,

    /// Page requests issued against the store
    pages_fetched: AtomicU64,

    /// Scheduler flushes (including the final one)
    batches_flushed: AtomicU64,

    /// Pauses performed
    pauses_total: AtomicU64,

    /// Time spent paused, in milliseconds
    pause_time_ms: AtomicU64,
}

impl ScanMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    // === COUNTER RECORDING ===

    /// Record a raw record read from the source.
    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item accepted by the strategy.
    pub fn record_accepted(&self) {
        self.items_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item dropped by the transformer.
    pub fn record_dropped(&self) {
        self.items_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a page request.
    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduler flush.
    pub fn record_flush(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed pause.
    pub fn record_pause(&self, duration: Duration) {
        self.pauses_total.fetch_add(1, Ordering::Relaxed);
        self.pause_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    // === GETTERS ===

    /// Get records read.
    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    /// Get items accepted.
    pub fn items_accepted(&self) -> u64 {
        self.items_accepted.load(Ordering::Relaxed)
    }

    /// Get items dropped.
    pub fn items_dropped(&self) -> u64 {
        self.items_dropped.load(Ordering::Relaxed)
    }

    /// Get pages fetched.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    /// Get batches flushed.
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    /// Get pauses performed.
    pub fn pauses_total(&self) -> u64 {
        self.pauses_total.load(Ordering::Relaxed)
    }

    /// Get time spent paused.
    pub fn pause_time(&self) -> Duration {
        Duration::from_millis(self.pause_time_ms.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.records_read(),
            items_accepted: self.items_accepted(),
            items_dropped: self.items_dropped(),
            pages_fetched: self.pages_fetched(),
            batches_flushed: self.batches_flushed(),
            pauses_total: self.pauses_total(),
            pause_time: self.pause_time(),
        }
    }

    /// Export all metrics in Prometheus text format.
    ///
    /// # Example
    /// ```
    /// use dynscan_core::metrics::ScanMetrics;
    ///
    /// let metrics = ScanMetrics::new();
    /// metrics.record_read();
    /// let text = metrics.export_prometheus_text();
    /// assert!(text.contains("dynscan_records_read_total 1"));
    /// ```
    pub fn export_prometheus_text(&self) -> String {
        self.export_prometheus_text_with_prefix("dynscan")
    }

    /// Export metrics in Prometheus text format with a custom name prefix.
    pub fn export_prometheus_text_with_prefix(&self, prefix: &str) -> String {
        let snapshot = self.snapshot();
        let mut output = String::with_capacity(1024);

        let counters = [
            ("records_read_total", "Raw records read from the store", snapshot.records_read),
            ("items_accepted_total", "Transformed items accepted", snapshot.items_accepted),
            ("items_dropped_total", "Items dropped after a failed transform", snapshot.items_dropped),
            ("pages_fetched_total", "Page requests issued", snapshot.pages_fetched),
            ("batches_flushed_total", "Throttling batches flushed", snapshot.batches_flushed),
            ("pauses_total", "Throttling pauses performed", snapshot.pauses_total),
        ];

        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {prefix}_{name} {help}\n"));
            output.push_str(&format!("# TYPE {prefix}_{name} counter\n"));
            output.push_str(&format!("{prefix}_{name} {value}\n"));
            output.push('\n');
        }

        output.push_str(&format!(
            "# HELP {prefix}_pause_seconds_total Time spent in throttling pauses\n"
        ));
        output.push_str(&format!("# TYPE {prefix}_pause_seconds_total counter\n"));
        output.push_str(&format!(
            "{prefix}_pause_seconds_total {}\n",
            snapshot.pause_time.as_secs_f64()
        ));

        output
    }
}

/// Copy of the scan counters taken at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub items_accepted: u64,
    pub items_dropped: u64,
    pub pages_fetched: u64,
    pub batches_flushed: u64,
    pub pauses_total: u64,
    pub pause_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ScanMetrics::new();
        metrics.record_read();
        metrics.record_read();
        metrics.record_accepted();
        metrics.record_dropped();
        metrics.record_page();
        metrics.record_flush();

        assert_eq!(metrics.records_read(), 2);
        assert_eq!(metrics.items_accepted(), 1);
        assert_eq!(metrics.items_dropped(), 1);
        assert_eq!(metrics.pages_fetched(), 1);
        assert_eq!(metrics.batches_flushed(), 1);
    }

    #[test]
    fn test_pause_time() {
        let metrics = ScanMetrics::new();
        metrics.record_pause(Duration::from_millis(50));
        metrics.record_pause(Duration::from_millis(25));

        assert_eq!(metrics.pauses_total(), 2);
        assert_eq!(metrics.pause_time(), Duration::from_millis(75));
    }

    #[test]
    fn test_snapshot() {
        let metrics = ScanMetrics::new();
        metrics.record_read();
        metrics.record_accepted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_read, 1);
        assert_eq!(snapshot.items_accepted, 1);
        assert_eq!(snapshot.items_dropped, 0);

        // Snapshot is detached from later updates
        metrics.record_read();
        assert_eq!(snapshot.records_read, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = ScanMetrics::new();
        metrics.record_page();
        metrics.record_pause(Duration::from_millis(1500));

        let output = metrics.export_prometheus_text();
        assert!(output.contains("# TYPE dynscan_pages_fetched_total counter"));
        assert!(output.contains("dynscan_pages_fetched_total 1"));
        assert!(output.contains("dynscan_pauses_total 1"));
        assert!(output.contains("dynscan_pause_seconds_total 1.5"));
    }

    #[test]
    fn test_prometheus_export_with_prefix() {
        let metrics = ScanMetrics::new();
        let output = metrics.export_prometheus_text_with_prefix("orders_export");
        assert!(output.contains("orders_export_records_read_total 0"));
        assert!(!output.contains("dynscan_"));
    }
}
