//! Count command implementation.

use super::Session;
use anyhow::Result;
use dynscan_core::Config;
use tracing::info;

/// Scan the table item by item and print how many items it holds.
pub fn run(config: Config) -> Result<()> {
    let session = Session::connect(config)?;

    let mut count: u64 = 0;
    let report = session.scan().for_each(|_| {
        count += 1;
        Ok(())
    })?;

    info!(
        table = %report.table,
        count,
        pages = report.metrics.pages_fetched,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Count complete"
    );
    println!("{count}");
    Ok(())
}
