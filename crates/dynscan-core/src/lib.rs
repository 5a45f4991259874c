//! dynscan core - rate-limited full-table scans
//!
//! This library reads every record of a DynamoDB-style table page by page
//! and delivers it to the caller while keeping the read rate bounded:
//!
//! - Lazy paginated source holding at most one page in memory
//! - Per-item transformation with failure isolation
//! - Collect-all, per-item and per-batch consumption strategies
//! - A pause after every `items_per_page` accepted items

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod scanner;
pub mod schema;
pub mod store;
pub mod strategy;
pub mod throttle;
pub mod transform;

// Re-export commonly used types
pub use config::Config;
pub use engine::{ScanEngine, ScanOutput, ScanReport, ScanState};
pub use error::{BoxError, ItemError, StoreError};
pub use error::{Error, Result};
pub use metrics::{MetricsSnapshot, ScanMetrics};
pub use scanner::{ScanBuilder, ScanConfiguration, TableScanner};
pub use schema::{TableIdentity, TableModel};
pub use store::{DynamoStore, Item, MemoryStore, RecordStore};
pub use strategy::StrategyKind;
pub use throttle::{Interrupter, NoopPacer, Pacer, RecordingPacer, ThreadPacer};
