//! CLI command implementations.

pub mod count;
pub mod scan;

use anyhow::Result;
use clap::Args;
use dynscan_core::store::Item;
use dynscan_core::{
    Config, DynamoStore, Error, ScanBuilder, ScanMetrics, TableScanner, ThreadPacer,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line overrides of the `[store]` and `[scan]` sections.
#[derive(Debug, Default, Args)]
pub struct ScanOverrides {
    /// Table to scan (overrides store.table_name)
    #[arg(long)]
    pub table: Option<String>,

    /// Items per page and per throttling batch
    #[arg(long)]
    pub items_per_page: Option<usize>,

    /// Pause after each batch in milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,
}

impl ScanOverrides {
    /// Apply the overrides and validate the result.
    pub fn apply(self, mut config: Config) -> Result<Config> {
        if let Some(table) = self.table {
            config.store.table_name = Some(table);
        }
        if let Some(items_per_page) = self.items_per_page {
            config.scan.items_per_page = items_per_page;
        }
        if let Some(pause_ms) = self.pause_ms {
            config.scan.pause_between_pages_ms = pause_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

/// A connected scanner plus the per-run pieces shared by all commands.
pub struct Session {
    scanner: TableScanner<DynamoStore>,
    config: Config,
    table: String,
    pacer: ThreadPacer,
    metrics: Arc<ScanMetrics>,
}

impl Session {
    /// Connect to DynamoDB and arm the Ctrl+C handler.
    pub fn connect(config: Config) -> Result<Self> {
        let table = config.store.table_name.clone().ok_or_else(|| {
            Error::Config("No table given; pass --table or set store.table_name".into())
        })?;

        let store = DynamoStore::connect(&config.store, &config.scan)?;
        let pacer = ThreadPacer::new();

        let interrupter = pacer.interrupter();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Received SIGINT, stopping at the next pause");
            interrupter.interrupt();
        }) {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }

        Ok(Self {
            scanner: TableScanner::new(store),
            config,
            table,
            pacer,
            metrics: Arc::new(ScanMetrics::new()),
        })
    }

    /// Scan builder preconfigured with the table, pacing and metrics.
    pub fn scan(&self) -> ScanBuilder<'_, DynamoStore, Item> {
        self.scanner
            .scan()
            .table(self.table.as_str())
            .settings(&self.config.scan)
            .pacer(self.pacer.clone())
            .metrics(Arc::clone(&self.metrics))
    }

    /// Counters shared by every scan of this session.
    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }
}
